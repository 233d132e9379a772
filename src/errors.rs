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

use snafu::prelude::*;

use crate::iterate::Var;
use crate::io::ConfigError;

/// Errors returned by the transcription engine.
///
/// Configuration errors are raised as soon as an invalid setting is provided, structural errors
/// indicate an internal inconsistency of a transcription scheme (and are therefore bugs), and
/// callback errors are raised by user-provided problems and abort the current solve.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollocationError {
    #[snafu(display("invalid configuration of {setting}: {msg}"))]
    Config { setting: &'static str, msg: String },
    #[snafu(display("internal error: {msg}"))]
    Structural { msg: String },
    #[snafu(display("problem callback `{callback}` failed: {msg}"))]
    Callback { callback: &'static str, msg: String },
    #[snafu(display("invalid problem description: {msg}"))]
    Description { msg: String },
    #[snafu(display("variable {var:?} expected shape {expected:?} but got {actual:?}"))]
    Shape {
        var: Var,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[snafu(display("invalid trajectory: {msg}"))]
    Trajectory { msg: String },
    #[snafu(display("NLP solver failed: {msg}"))]
    Nlp { msg: String },
    #[snafu(display("solve aborted at iteration {iteration}: {source}"))]
    Aborted {
        iteration: usize,
        #[snafu(source(from(CollocationError, Box::new)))]
        source: Box<CollocationError>,
    },
    #[snafu(display("while {action}, encountered an IO error: {source}"))]
    Io {
        action: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("while {action}, encountered a CSV error: {source}"))]
    Csv {
        action: &'static str,
        source: csv::Error,
    },
    #[snafu(display("configuration error: {source}"))]
    Configuration { source: ConfigError },
    #[snafu(display("could not build a pool of {num_threads} threads: {source}"))]
    ThreadPool {
        num_threads: usize,
        source: rayon::ThreadPoolBuildError,
    },
}

impl CollocationError {
    /// Builds a callback error, for use in implementations of [`crate::problem::Problem`].
    pub fn callback<S: Into<String>>(callback: &'static str, msg: S) -> Self {
        Self::Callback {
            callback,
            msg: msg.into(),
        }
    }

    /// Returns true if this error is due to an invalid configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Configuration { .. })
    }
}
