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

/*! # nyx-collocation

Direct collocation of optimal control problems: a continuous-time problem made of states,
controls, multipliers, parameters, path and kinematic constraints, integral and endpoint costs is
transcribed on a time grid into a sparse nonlinear program, solved, and the solution is returned as
a trajectory.

```ignore
let mut solver = Solver::new(&problem);
solver.set_transcription_scheme("hermite-simpson")?;
solver.set_num_mesh_intervals(50)?;
let guess = solver.create_initial_guess_from_bounds()?;
let solution = solver.solve(&guess)?;
```
*/

/// Provides the description of optimal control problems and the callbacks which evaluate them.
pub mod problem;

/// Trajectories of decision variables, used as initial guesses and solutions.
pub mod iterate;

/// All the input/output needs for this library: YAML configurations and trajectory files.
pub mod io;

/// Provides the transcription of a problem into a nonlinear program, for each collocation scheme.
pub mod transcription;

/// Nonlinear programming: the solver interface, finite differences, sparsity detection, and a reference SQP solver.
pub mod nlp;

/// Solver configuration and orchestration.
pub mod solver;

mod errors;
/// Functions which may fail return this error rather than panicking.
pub use self::errors::CollocationError;

#[macro_use]
extern crate log;
extern crate nalgebra as na;

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

/// Re-export some useful things
pub use self::iterate::{Iterate, Solution, Var, Variables};
pub use self::problem::{Bounds, Problem, ProblemDescription};
pub use self::solver::{Solver, SolverConfig};
pub use self::transcription::{Scheme, Transcription};
