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

use crate::errors::{CollocationError, ConfigSnafu};
use crate::io::ConfigRepr;
use crate::nlp::{FiniteDifferenceScheme, HessianApproximation};
use crate::transcription::Scheme;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;

/// Samples at which the sparsity pattern of the constraint Jacobian is detected.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SparsityDetection {
    /// No detection: the Jacobian is treated as dense
    #[default]
    None,
    /// Random iterates within the variable bounds
    Random,
    /// The initial guess, resampled onto the transcription grid
    InitialGuess,
}

impl FromStr for SparsityDetection {
    type Err = CollocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(Self::None),
            "random" => Ok(Self::Random),
            "initial-guess" => Ok(Self::InitialGuess),
            _ => Err(CollocationError::Config {
                setting: "sparsity_detection",
                msg: format!("`{s}` is not one of none, random or initial-guess"),
            }),
        }
    }
}

impl fmt::Display for SparsityDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Random => write!(f, "random"),
            Self::InitialGuess => write!(f, "initial-guess"),
        }
    }
}

/// Whether the grid points are evaluated on a thread pool.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallelism {
    Serial,
    #[default]
    Thread,
}

impl FromStr for Parallelism {
    type Err = CollocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "serial" => Ok(Self::Serial),
            "thread" => Ok(Self::Thread),
            _ => Err(CollocationError::Config {
                setting: "parallelism",
                msg: format!("`{s}` is not one of serial or thread"),
            }),
        }
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Options of a [`super::Solver`]. Every field has a default, so a YAML configuration only needs
/// to list the settings it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
#[serde(default)]
pub struct SolverConfig {
    #[builder(default)]
    pub transcription_scheme: Scheme,
    /// Mesh fractions, from 0 to 1; when unset, the mesh is uniform with `num_mesh_intervals`
    #[builder(default, setter(strip_option))]
    pub mesh: Option<Vec<f64>>,
    #[builder(default = 100)]
    pub num_mesh_intervals: usize,
    #[builder(default)]
    pub sparsity_detection: SparsityDetection,
    /// Number of random samples when the sparsity is detected from random iterates
    #[builder(default = 3)]
    pub sparsity_detection_random_count: usize,
    #[builder(default)]
    pub sparsity_detection_seed: u64,
    #[builder(default)]
    pub parallelism: Parallelism,
    #[builder(default = default_num_threads())]
    pub num_threads: usize,
    #[builder(default)]
    pub finite_difference_scheme: FiniteDifferenceScheme,
    /// Scale each variable so that its bounds map onto [-0.5, 0.5]
    #[builder(default)]
    pub scale_variables_using_bounds: bool,
    /// Enforce the path constraints at every grid point rather than only at the mesh points
    #[builder(default)]
    pub enforce_path_constraint_mesh_interior_points: bool,
    /// Constrain the controls at mesh interior points to be linear between the mesh points
    #[builder(default = true)]
    pub interpolate_control_mesh_interior_points: bool,
    /// Add the integral of the squared Lagrange multipliers to the objective
    #[builder(default)]
    pub minimize_lagrange_multipliers: bool,
    #[builder(default = 1.0)]
    pub lagrange_multiplier_weight: f64,
    #[builder(default = 100)]
    pub optim_max_iterations: usize,
    #[builder(default = 1e-6)]
    pub optim_convergence_tolerance: f64,
    #[builder(default = 1e-6)]
    pub optim_constraint_tolerance: f64,
    #[builder(default)]
    pub optim_hessian_approximation: HessianApproximation,
    /// Pass the current iterate to the intermediate callback every so many iterations (0 never)
    #[builder(default)]
    pub output_interval: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigRepr for SolverConfig {}

/// Validates a mesh: at least two strictly increasing fractions from 0 to 1.
pub(crate) fn check_mesh(mesh: &[f64]) -> Result<(), CollocationError> {
    ensure!(
        mesh.len() >= 2,
        ConfigSnafu {
            setting: "mesh",
            msg: format!("need at least 2 mesh points, got {}", mesh.len())
        }
    );
    ensure!(
        mesh[0] == 0.0 && mesh[mesh.len() - 1] == 1.0,
        ConfigSnafu {
            setting: "mesh",
            msg: "the mesh must start at 0 and end at 1"
        }
    );
    ensure!(
        mesh.windows(2).all(|w| w[1] > w[0]),
        ConfigSnafu {
            setting: "mesh",
            msg: "mesh points must be strictly increasing"
        }
    );
    Ok(())
}

impl SolverConfig {
    /// Checks every setting, returning the first configuration error.
    pub fn validate(&self) -> Result<(), CollocationError> {
        // Checks the degree of pseudospectral schemes
        self.transcription_scheme.collocation()?;
        match &self.mesh {
            Some(mesh) => check_mesh(mesh)?,
            None => ensure!(
                self.num_mesh_intervals > 0,
                ConfigSnafu {
                    setting: "num_mesh_intervals",
                    msg: "need at least one mesh interval"
                }
            ),
        }
        ensure!(
            self.sparsity_detection_random_count > 0,
            ConfigSnafu {
                setting: "sparsity_detection_random_count",
                msg: "need at least one random sample"
            }
        );
        ensure!(
            self.num_threads > 0,
            ConfigSnafu {
                setting: "num_threads",
                msg: "need at least one thread"
            }
        );
        ensure!(
            self.lagrange_multiplier_weight.is_finite() && self.lagrange_multiplier_weight >= 0.0,
            ConfigSnafu {
                setting: "lagrange_multiplier_weight",
                msg: format!("{} is not a non-negative weight", self.lagrange_multiplier_weight)
            }
        );
        for (setting, tol) in [
            ("optim_convergence_tolerance", self.optim_convergence_tolerance),
            ("optim_constraint_tolerance", self.optim_constraint_tolerance),
        ] {
            ensure!(
                tol > 0.0 && tol.is_finite(),
                ConfigSnafu {
                    setting,
                    msg: format!("{tol} is not a positive tolerance")
                }
            );
        }
        Ok(())
    }

    /// Mesh fractions of this configuration.
    pub fn mesh_fractions(&self) -> Vec<f64> {
        match &self.mesh {
            Some(mesh) => mesh.clone(),
            None => (0..=self.num_mesh_intervals)
                .map(|i| i as f64 / self.num_mesh_intervals as f64)
                .collect(),
        }
    }
}

#[cfg(test)]
mod ut_config {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SolverConfig::default();
        assert_eq!(cfg.transcription_scheme, Scheme::Trapezoidal);
        assert_eq!(cfg.num_mesh_intervals, 100);
        assert_eq!(cfg.sparsity_detection, SparsityDetection::None);
        assert!(cfg.interpolate_control_mesh_interior_points);
        assert!(cfg.num_threads >= 1);
        cfg.validate().unwrap();
        assert_eq!(cfg.mesh_fractions().len(), 101);
    }

    #[test]
    fn from_yaml() {
        let cfg = SolverConfig::loads(
            r#"
transcription_scheme: legendre-gauss-radau-3
num_mesh_intervals: 12
sparsity_detection: initial-guess
parallelism: serial
finite_difference_scheme: forward
optim_hessian_approximation: bfgs
"#,
        )
        .unwrap();
        assert_eq!(cfg.transcription_scheme, Scheme::LegendreGaussRadau(3));
        assert_eq!(cfg.num_mesh_intervals, 12);
        assert_eq!(cfg.sparsity_detection, SparsityDetection::InitialGuess);
        assert_eq!(cfg.parallelism, Parallelism::Serial);
        assert_eq!(cfg.finite_difference_scheme, FiniteDifferenceScheme::Forward);
        assert_eq!(cfg.optim_hessian_approximation, HessianApproximation::Bfgs);
        // Unlisted fields keep their defaults
        assert_eq!(cfg.optim_max_iterations, 100);

        assert!(SolverConfig::loads("transcription_scheme: legendre-gauss-12").is_err());

        let dumped = cfg.dumps().unwrap();
        assert_eq!(SolverConfig::loads(&dumped).unwrap(), cfg);
    }

    #[test]
    fn invalid_meshes() {
        for mesh in [vec![0.0], vec![0.0, 0.5], vec![0.1, 1.0], vec![0.0, 0.6, 0.4, 1.0]] {
            let err = check_mesh(&mesh).unwrap_err();
            assert!(err.is_config());
        }
        check_mesh(&[0.0, 0.3, 1.0]).unwrap();
    }

    #[test]
    fn option_names() {
        assert_eq!(
            "initial-guess".parse::<SparsityDetection>().unwrap(),
            SparsityDetection::InitialGuess
        );
        assert!("guess".parse::<SparsityDetection>().unwrap_err().is_config());
        assert_eq!("thread".parse::<Parallelism>().unwrap(), Parallelism::Thread);
        assert!("threads".parse::<Parallelism>().is_err());
    }
}
