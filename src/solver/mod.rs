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

use crate::errors::{CollocationError, ConfigSnafu, ConfigurationSnafu, ThreadPoolSnafu};
use crate::io::ConfigRepr;
use crate::iterate::{Iterate, Solution, Variables};
use crate::problem::{Problem, ProblemInitialization};
use crate::transcription::{Scheme, Transcription};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use snafu::{ensure, ResultExt};
use std::path::Path;

mod config;

pub use config::{Parallelism, SolverConfig, SparsityDetection};

/// Solves an optimal control [`Problem`] by direct collocation.
///
/// The setters validate their input immediately and return a configuration error for invalid
/// settings, so that a solve never starts with an inconsistent configuration.
pub struct Solver<'a> {
    problem: &'a dyn Problem,
    config: SolverConfig,
}

impl<'a> Solver<'a> {
    /// A solver with the default configuration.
    pub fn new(problem: &'a dyn Problem) -> Self {
        Self {
            problem,
            config: SolverConfig::default(),
        }
    }

    pub fn from_config(problem: &'a dyn Problem, config: SolverConfig) -> Result<Self, CollocationError> {
        config.validate()?;
        Ok(Self { problem, config })
    }

    /// Loads the configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(problem: &'a dyn Problem, path: P) -> Result<Self, CollocationError> {
        let config = SolverConfig::load(path).context(ConfigurationSnafu)?;
        Self::from_config(problem, config)
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn problem(&self) -> &'a dyn Problem {
        self.problem
    }

    pub fn set_transcription_scheme(&mut self, scheme: &str) -> Result<(), CollocationError> {
        self.config.transcription_scheme = scheme.parse::<Scheme>()?;
        Ok(())
    }

    /// Sets the mesh fractions, which take precedence over the number of mesh intervals.
    pub fn set_mesh(&mut self, mesh: Vec<f64>) -> Result<(), CollocationError> {
        config::check_mesh(&mesh)?;
        self.config.mesh = Some(mesh);
        Ok(())
    }

    /// Sets a uniform mesh with the provided number of intervals, discarding any custom mesh.
    pub fn set_num_mesh_intervals(&mut self, num: usize) -> Result<(), CollocationError> {
        ensure!(
            num > 0,
            ConfigSnafu {
                setting: "num_mesh_intervals",
                msg: "need at least one mesh interval"
            }
        );
        self.config.num_mesh_intervals = num;
        self.config.mesh = None;
        Ok(())
    }

    pub fn set_sparsity_detection(&mut self, detection: &str) -> Result<(), CollocationError> {
        self.config.sparsity_detection = detection.parse()?;
        Ok(())
    }

    pub fn set_sparsity_detection_random_count(&mut self, count: usize) -> Result<(), CollocationError> {
        ensure!(
            count > 0,
            ConfigSnafu {
                setting: "sparsity_detection_random_count",
                msg: "need at least one random sample"
            }
        );
        self.config.sparsity_detection_random_count = count;
        Ok(())
    }

    pub fn set_sparsity_detection_seed(&mut self, seed: u64) {
        self.config.sparsity_detection_seed = seed;
    }

    pub fn set_parallelism(&mut self, mode: &str, num_threads: usize) -> Result<(), CollocationError> {
        let parallelism = mode.parse::<Parallelism>()?;
        ensure!(
            num_threads > 0,
            ConfigSnafu {
                setting: "num_threads",
                msg: "need at least one thread"
            }
        );
        self.config.parallelism = parallelism;
        self.config.num_threads = num_threads;
        Ok(())
    }

    pub fn set_finite_difference_scheme(&mut self, scheme: &str) -> Result<(), CollocationError> {
        self.config.finite_difference_scheme = scheme.parse()?;
        Ok(())
    }

    pub fn set_optim_hessian_approximation(&mut self, hessian: &str) -> Result<(), CollocationError> {
        self.config.optim_hessian_approximation = hessian.parse()?;
        Ok(())
    }

    pub fn set_optim_max_iterations(&mut self, max_iterations: usize) {
        self.config.optim_max_iterations = max_iterations;
    }

    pub fn set_optim_convergence_tolerance(&mut self, tol: f64) -> Result<(), CollocationError> {
        ensure!(
            tol > 0.0 && tol.is_finite(),
            ConfigSnafu {
                setting: "optim_convergence_tolerance",
                msg: format!("{tol} is not a positive tolerance")
            }
        );
        self.config.optim_convergence_tolerance = tol;
        Ok(())
    }

    pub fn set_optim_constraint_tolerance(&mut self, tol: f64) -> Result<(), CollocationError> {
        ensure!(
            tol > 0.0 && tol.is_finite(),
            ConfigSnafu {
                setting: "optim_constraint_tolerance",
                msg: format!("{tol} is not a positive tolerance")
            }
        );
        self.config.optim_constraint_tolerance = tol;
        Ok(())
    }

    pub fn set_scale_variables_using_bounds(&mut self, enabled: bool) {
        self.config.scale_variables_using_bounds = enabled;
    }

    pub fn set_enforce_path_constraint_mesh_interior_points(&mut self, enabled: bool) {
        self.config.enforce_path_constraint_mesh_interior_points = enabled;
    }

    pub fn set_interpolate_control_mesh_interior_points(&mut self, enabled: bool) {
        self.config.interpolate_control_mesh_interior_points = enabled;
    }

    pub fn set_minimize_lagrange_multipliers(&mut self, enabled: bool, weight: f64) -> Result<(), CollocationError> {
        ensure!(
            weight.is_finite() && weight >= 0.0,
            ConfigSnafu {
                setting: "lagrange_multiplier_weight",
                msg: format!("{weight} is not a non-negative weight")
            }
        );
        self.config.minimize_lagrange_multipliers = enabled;
        self.config.lagrange_multiplier_weight = weight;
        Ok(())
    }

    pub fn set_output_interval(&mut self, interval: usize) {
        self.config.output_interval = interval;
    }

    pub fn create_transcription(&self) -> Result<Transcription<'a>, CollocationError> {
        Transcription::new(self.problem, &self.config)
    }

    pub fn create_initial_guess_from_bounds(&self) -> Result<Iterate, CollocationError> {
        self.create_transcription()?
            .create_initial_guess_from_bounds()
    }

    pub fn create_random_iterate_within_bounds(&self, seed: u64) -> Result<Iterate, CollocationError> {
        self.create_transcription()?
            .create_random_iterate_within_bounds(seed)
    }

    fn create_sparsity_samples(
        &self,
        transcription: &Transcription,
        guess: &Iterate,
    ) -> Result<Vec<Variables>, CollocationError> {
        match self.config.sparsity_detection {
            SparsityDetection::None => Ok(Vec::new()),
            SparsityDetection::InitialGuess => Ok(vec![transcription.variables_from_iterate(guess)?]),
            SparsityDetection::Random => {
                let mut rng = Pcg64Mcg::seed_from_u64(self.config.sparsity_detection_seed);
                (0..self.config.sparsity_detection_random_count)
                    .map(|_| transcription.random_variables(&mut rng))
                    .collect()
            }
        }
    }

    /// Solves the problem from the provided initial guess, on a pool of `num_threads` workers when
    /// the parallelism is `thread` and on a single worker otherwise.
    pub fn solve(&self, guess: &Iterate) -> Result<Solution, CollocationError> {
        let num_threads = match self.config.parallelism {
            Parallelism::Thread => self.config.num_threads,
            Parallelism::Serial => 1,
        };
        info!(
            "solving with {} on {} mesh intervals, {} parallelism ({num_threads} threads), {} sparsity detection",
            self.config.transcription_scheme,
            self.config
                .mesh
                .as_ref()
                .map_or(self.config.num_mesh_intervals, |mesh| mesh.len() - 1),
            self.config.parallelism,
            self.config.sparsity_detection
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .context(ThreadPoolSnafu { num_threads })?;

        pool.install(|| {
            let transcription = self.create_transcription()?;
            let samples = self.create_sparsity_samples(&transcription, guess)?;
            self.problem.initialize(&ProblemInitialization {
                finite_difference_scheme: self.config.finite_difference_scheme,
                sparsity_samples: &samples,
            })?;
            transcription.solve(guess, &samples)
        })
    }
}
