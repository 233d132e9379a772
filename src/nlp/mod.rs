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

use crate::errors::CollocationError;
use crate::linalg::DVector;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod finite_diff;
mod sparsity;
mod sqp;

pub use finite_diff::FiniteDifferenceScheme;
pub use sparsity::{NlpSparsity, SparsityPattern};
pub use sqp::SqpSolver;

/// Bounds of the decision variables and of the constraints of an NLP.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpBounds {
    pub x_lower: DVector<f64>,
    pub x_upper: DVector<f64>,
    pub g_lower: DVector<f64>,
    pub g_upper: DVector<f64>,
}

/// A nonlinear program: minimize f(x) subject to g_lower <= g(x) <= g_upper and
/// x_lower <= x <= x_upper. Evaluations may be requested concurrently and in any order.
pub trait NlpProblem: Sync {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn bounds(&self) -> &NlpBounds;

    fn objective(&self, x: &DVector<f64>) -> Result<f64, CollocationError>;

    fn constraints(&self, x: &DVector<f64>) -> Result<DVector<f64>, CollocationError>;
}

/// Progress of an NLP solver at the end of an iteration.
#[derive(Clone, Debug)]
pub struct IterationInfo<'a> {
    pub iteration: usize,
    pub x: &'a DVector<f64>,
    pub objective: f64,
    /// Largest constraint violation
    pub infeasibility: f64,
    /// Largest component of the gradient of the Lagrangian
    pub optimality: f64,
}

/// Called by NLP solvers once per iteration. Returning an error aborts the solve.
pub trait IterationCallback {
    fn on_iteration(&mut self, info: &IterationInfo) -> Result<(), CollocationError>;
}

impl<F> IterationCallback for F
where
    F: FnMut(&IterationInfo) -> Result<(), CollocationError>,
{
    fn on_iteration(&mut self, info: &IterationInfo) -> Result<(), CollocationError> {
        self(info)
    }
}

/// Primal and dual solution returned by an NLP solver, whether or not it converged.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpOutcome {
    pub x: DVector<f64>,
    pub objective: f64,
    pub constraints: DVector<f64>,
    pub constraint_multipliers: DVector<f64>,
    pub bound_multipliers: DVector<f64>,
    pub iterations: usize,
    pub success: bool,
    pub message: String,
}

/// A solver of nonlinear programs. The sparsity patterns of the constraint Jacobian and of the
/// Hessian of the Lagrangian are detected once before the solve and used unchanged throughout it.
pub trait NlpSolver {
    fn solve(
        &self,
        nlp: &dyn NlpProblem,
        x0: &DVector<f64>,
        sparsity: &NlpSparsity,
        callback: &mut dyn IterationCallback,
    ) -> Result<NlpOutcome, CollocationError>;
}

/// Approximation of the Hessian of the Lagrangian used by the SQP solver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HessianApproximation {
    /// Finite differences of the gradient of the Lagrangian, one gradient per color of the
    /// Hessian pattern. Each gradient costs one objective evaluation per variable, so with a dense
    /// pattern (no sparsity detection) an iteration costs O(n^2) objective evaluations.
    #[default]
    Exact,
    /// Damped BFGS updates
    Bfgs,
}

impl FromStr for HessianApproximation {
    type Err = CollocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "exact" => Ok(Self::Exact),
            "bfgs" => Ok(Self::Bfgs),
            _ => Err(CollocationError::Config {
                setting: "optim_hessian_approximation",
                msg: format!("`{s}` is not one of exact or bfgs"),
            }),
        }
    }
}

impl fmt::Display for HessianApproximation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Bfgs => write!(f, "bfgs"),
        }
    }
}
