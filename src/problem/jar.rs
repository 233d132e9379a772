/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::errors::{CollocationError, StructuralSnafu};
use snafu::ensure;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

type Factory<T> = Box<dyn Fn() -> Result<T, CollocationError> + Send + Sync>;

struct Contents<T> {
    available: Vec<T>,
    constructed: usize,
}

/// A pool of objects which cannot be shared between threads, such as a stateful dynamics model.
///
/// Each call to [`ThreadsafeJar::take`] grants exclusive access to one instance until the returned
/// guard is dropped. Instances are either provided upfront with [`ThreadsafeJar::leave`] or built
/// lazily by a factory, up to a maximum number of instances.
pub struct ThreadsafeJar<T> {
    contents: Mutex<Contents<T>>,
    returned: Condvar,
    factory: Option<Factory<T>>,
    max_size: usize,
}

impl<T> ThreadsafeJar<T> {
    /// An empty jar without a factory: instances must be provided with `leave`.
    pub fn new() -> Self {
        Self {
            contents: Mutex::new(Contents {
                available: Vec::new(),
                constructed: 0,
            }),
            returned: Condvar::new(),
            factory: None,
            max_size: usize::MAX,
        }
    }

    /// A jar which builds up to `max_size` instances (at least one) on demand.
    pub fn with_factory<F>(max_size: usize, factory: F) -> Self
    where
        F: Fn() -> Result<T, CollocationError> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            max_size: max_size.max(1),
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Contents<T>> {
        // Instances are never modified while the lock is held, so a poisoned lock is still usable
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes an instance from the jar, blocking until one is available. The instance goes back
    /// in the jar when the guard is dropped.
    ///
    /// Fails immediately if the jar has no factory and was never given an instance, since no
    /// instance could ever become available.
    pub fn take(&self) -> Result<JarGuard<'_, T>, CollocationError> {
        let mut contents = self.lock();
        ensure!(
            self.factory.is_some() || contents.constructed > 0,
            StructuralSnafu {
                msg: "jar is empty and has no factory to construct instances"
            }
        );
        loop {
            if let Some(item) = contents.available.pop() {
                return Ok(JarGuard::new(self, item));
            }
            if let Some(factory) = &self.factory {
                if contents.constructed < self.max_size {
                    contents.constructed += 1;
                    drop(contents);
                    trace!("constructing a new jar instance");
                    return match factory() {
                        Ok(item) => Ok(JarGuard::new(self, item)),
                        Err(e) => {
                            self.lock().constructed -= 1;
                            self.returned.notify_one();
                            Err(e)
                        }
                    };
                }
            }
            contents = self
                .returned
                .wait(contents)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Puts an instance in the jar, waking up a thread waiting in `take`. Use this to provide
    /// instances upfront or to return an instance detached from its guard.
    pub fn leave(&self, item: T) {
        let mut contents = self.lock();
        contents.available.push(item);
        contents.constructed = contents.constructed.max(contents.available.len());
        drop(contents);
        self.returned.notify_one();
    }

    fn give_back(&self, item: T) {
        self.lock().available.push(item);
        self.returned.notify_one();
    }

    /// Number of instances constructed or provided so far, whether in the jar or taken.
    pub fn size(&self) -> usize {
        self.lock().constructed
    }

    /// Number of instances currently in the jar.
    pub fn num_available(&self) -> usize {
        self.lock().available.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Default for ThreadsafeJar<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to an instance taken from a [`ThreadsafeJar`].
pub struct JarGuard<'a, T> {
    jar: &'a ThreadsafeJar<T>,
    item: ManuallyDrop<T>,
}

impl<'a, T> JarGuard<'a, T> {
    fn new(jar: &'a ThreadsafeJar<T>, item: T) -> Self {
        Self {
            jar,
            item: ManuallyDrop::new(item),
        }
    }

    /// Takes the instance out of the guard: it will not be returned to the jar on drop.
    pub fn detach(self) -> T {
        let mut guard = ManuallyDrop::new(self);
        // SAFETY: the guard is never dropped, so the item is moved out exactly once.
        unsafe { ManuallyDrop::take(&mut guard.item) }
    }
}

impl<T> Deref for JarGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> DerefMut for JarGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<T> Drop for JarGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the item is not accessed after this point.
        let item = unsafe { ManuallyDrop::take(&mut self.item) };
        self.jar.give_back(item);
    }
}
