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

use self::schemes::CollocationScheme;
use crate::errors::{
    CallbackSnafu, CollocationError, ConfigSnafu, IoSnafu, ShapeSnafu, StructuralSnafu,
};
use crate::iterate::{interpolate_rows, linspace, Iterate, Solution, Var, Variables};
use crate::linalg::{DMatrix, DVector};
use crate::nlp::{
    IterationInfo, NlpBounds, NlpProblem, NlpSolver, NlpSparsity, SqpSolver,
};
use crate::problem::{Bounds, KinematicConstraintMethod, Problem, ProblemDescription};
use crate::solver::{Parallelism, SolverConfig};
use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;
use snafu::{ensure, ResultExt};
use std::io::Write;

pub mod constraints;
mod evaluation;
pub mod schemes;

pub use constraints::{Block, ConstraintLayout, Constraints};
pub use schemes::{Collocation, Scheme};

/// Bounds of a block with one row per entry of `rows`, each entry holding the bounds of the row
/// and the bounds of its first and last columns, used when set.
fn bounds_block(rows: &[(Bounds, Bounds, Bounds)], cols: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let pick = |r: usize, c: usize| {
        let (bounds, initial, final_) = rows[r];
        if c == 0 && initial.is_set() {
            initial
        } else if c + 1 == cols && final_.is_set() {
            final_
        } else {
            bounds
        }
    };
    (
        DMatrix::from_fn(rows.len(), cols, |r, c| pick(r, c).lower),
        DMatrix::from_fn(rows.len(), cols, |r, c| pick(r, c).upper),
    )
}

/// Scale and shift of a variable with the provided bounds, such that
/// `unscaled = scaled * scale + shift`.
pub(crate) fn scaling(lower: f64, upper: f64, enabled: bool) -> (f64, f64) {
    if !enabled {
        return (1.0, 0.0);
    }
    let span = upper - lower;
    if !span.is_finite() {
        (1.0, 0.0)
    } else if span == 0.0 {
        (1.0, upper)
    } else {
        (span, 0.5 * (upper + lower))
    }
}

/// Checks that the kinematic constraint method of the problem can be used with the scheme.
fn check_kinematic_constraints(
    desc: &ProblemDescription,
    scheme: Scheme,
) -> Result<(), CollocationError> {
    if let Some(kc) = desc.kinematic_constraints() {
        ensure!(
            scheme != Scheme::Trapezoidal,
            ConfigSnafu {
                setting: "transcription_scheme",
                msg: "kinematic constraints are not supported by the trapezoidal scheme"
            }
        );
        ensure!(
            kc.method != KinematicConstraintMethod::Posa2016 || scheme == Scheme::HermiteSimpson,
            ConfigSnafu {
                setting: "transcription_scheme",
                msg: format!(
                    "the Posa2016 kinematic constraint method requires hermite-simpson, not {scheme}"
                )
            }
        );
    }
    Ok(())
}

/// The direct collocation transcription of a [`Problem`] into a nonlinear program.
///
/// The time of every grid point is `t0 + (tf - t0) * fraction`, where the fractions are the mesh
/// points and the interior points the scheme adds to each mesh interval. The decision variables
/// are the blocks of [`Var`] in order, each stored column by column, scaled by the scale and shift
/// derived from their bounds. The constraints are flattened by the [`ConstraintLayout`].
pub struct Transcription<'a> {
    problem: &'a dyn Problem,
    config: SolverConfig,
    collocation: Collocation,
    mesh: Vec<f64>,
    /// Fraction of the time span of each grid point
    grid: DVector<f64>,
    mesh_points: Vec<usize>,
    mesh_interior_points: Vec<usize>,
    path_points: Vec<usize>,
    projection_points: Vec<usize>,
    slack_points: Vec<usize>,
    interp_control_points: Vec<usize>,
    /// Quadrature weights of each grid point over the normalized time span
    quadrature: DVector<f64>,
    lower: Variables,
    upper: Variables,
    scale: DVector<f64>,
    shift: DVector<f64>,
    layout: ConstraintLayout,
    constraint_lower: Constraints,
    constraint_upper: Constraints,
    bounds: NlpBounds,
}

impl<'a> Transcription<'a> {
    pub fn new(problem: &'a dyn Problem, config: &SolverConfig) -> Result<Self, CollocationError> {
        config.validate()?;
        let desc = problem.description();
        desc.validate()?;
        check_kinematic_constraints(desc, config.transcription_scheme)?;

        let collocation = config.transcription_scheme.collocation()?;
        let mesh = config.mesh_fractions();
        let fractions = collocation.interval_fractions();
        let n = fractions.len();
        let num_mesh_intervals = mesh.len() - 1;

        let mut grid = Vec::with_capacity(num_mesh_intervals * n + 1);
        for interval in mesh.windows(2) {
            for tau in fractions {
                grid.push(interval[0] + (interval[1] - interval[0]) * tau);
            }
        }
        grid.push(1.0);
        let grid = DVector::from_vec(grid);
        let num_grid_points = grid.len();

        let mesh_points: Vec<usize> = (0..=num_mesh_intervals).map(|k| k * n).collect();
        let mesh_interior_points: Vec<usize> =
            (0..num_grid_points).filter(|i| i % n != 0).collect();
        let path_points = if config.enforce_path_constraint_mesh_interior_points {
            (0..num_grid_points).collect()
        } else {
            mesh_points.clone()
        };
        let projection_points: Vec<usize> = mesh_points[1..].to_vec();

        let bordalba = desc.is_kinematic_constraint_method_bordalba2023();
        let slack_points = if desc.is_kinematic_constraint_method_posa2016() {
            mesh_interior_points.clone()
        } else if bordalba {
            projection_points.clone()
        } else {
            Vec::new()
        };

        let interpolate_controls = config.interpolate_control_mesh_interior_points && n > 1;
        ensure!(
            !interpolate_controls || collocation.supports_interpolating_controls(),
            StructuralSnafu {
                msg: format!(
                    "{} has mesh interior points but no interpolating control constraints",
                    config.transcription_scheme
                )
            }
        );
        let interp_control_points = if interpolate_controls {
            mesh_interior_points.clone()
        } else {
            Vec::new()
        };

        let (lower, upper) = Self::create_variable_bounds(
            desc,
            num_grid_points,
            num_mesh_intervals,
            slack_points.len(),
        );

        let layout = ConstraintLayout {
            num_mesh_intervals,
            num_points_per_interval: n,
            num_defects_per_interval: desc.num_states() * collocation.num_defects_per_state(),
            num_multibody_residuals: desc.num_multibody_residuals(),
            num_auxiliary_residuals: desc.num_auxiliary_residual_equations(),
            num_kinematic: if bordalba {
                desc.num_qerr() + desc.num_uerr()
            } else {
                desc.num_kinematic_constraint_equations()
            },
            num_udoterr: if bordalba { desc.num_udoterr() } else { 0 },
            projecting: bordalba,
            endpoint_sizes: desc
                .endpoint_constraints()
                .iter()
                .map(|info| info.num_outputs())
                .collect(),
            path_sizes: desc.path_constraints().iter().map(|info| info.size()).collect(),
            path_at_interior_points: config.enforce_path_constraint_mesh_interior_points,
            num_controls: desc.num_controls(),
            interpolate_controls,
            num_projection: desc.num_projection_constraint_equations(),
        };

        let (constraint_lower, constraint_upper) = Self::create_constraint_bounds(desc, &layout);

        let mut me = Self {
            problem,
            config: config.clone(),
            collocation,
            mesh,
            grid,
            mesh_points,
            mesh_interior_points,
            path_points,
            projection_points,
            slack_points,
            interp_control_points,
            quadrature: DVector::zeros(0),
            lower,
            upper,
            scale: DVector::zeros(0),
            shift: DVector::zeros(0),
            layout,
            constraint_lower,
            constraint_upper,
            bounds: NlpBounds {
                x_lower: DVector::zeros(0),
                x_upper: DVector::zeros(0),
                g_lower: DVector::zeros(0),
                g_upper: DVector::zeros(0),
            },
        };

        me.create_mesh_indices()?;
        me.quadrature = me.create_quadrature_coefficients();

        let flat_lower = me.flatten_variables(&me.lower)?;
        let flat_upper = me.flatten_variables(&me.upper)?;
        let enabled = config.scale_variables_using_bounds;
        let (scale, shift): (Vec<f64>, Vec<f64>) = flat_lower
            .iter()
            .zip(flat_upper.iter())
            .map(|(l, u)| scaling(*l, *u, enabled))
            .unzip();
        me.scale = DVector::from_vec(scale);
        me.shift = DVector::from_vec(shift);
        me.bounds = NlpBounds {
            x_lower: me.scale_flat(&flat_lower),
            x_upper: me.scale_flat(&flat_upper),
            g_lower: me.layout.flatten(&me.constraint_lower)?,
            g_upper: me.layout.flatten(&me.constraint_upper)?,
        };

        info!(
            "{} transcription: {} mesh intervals, {} grid points, {} variables, {} constraints",
            config.transcription_scheme,
            num_mesh_intervals,
            num_grid_points,
            me.bounds.x_lower.len(),
            me.layout.len()
        );

        Ok(me)
    }

    fn create_variable_bounds(
        desc: &ProblemDescription,
        num_grid_points: usize,
        num_mesh_intervals: usize,
        num_slack_points: usize,
    ) -> (Variables, Variables) {
        let unset = Bounds::unset();
        let plain = |bounds: Bounds| (bounds, unset, unset);

        let states: Vec<_> = desc
            .states()
            .iter()
            .map(|s| (s.bounds, s.initial_bounds, s.final_bounds))
            .collect();
        let controls: Vec<_> = desc
            .controls()
            .iter()
            .map(|c| (c.bounds, c.initial_bounds, c.final_bounds))
            .collect();
        let projection: Vec<_> = desc
            .states()
            .iter()
            .take(desc.num_projection_states())
            .map(|s| plain(s.bounds))
            .collect();
        let infos = |infos: &[crate::problem::VariableInfo]| -> Vec<_> {
            infos.iter().map(|v| plain(v.bounds)).collect()
        };

        let blocks = [
            (Var::InitialTime, vec![plain(desc.initial_time_bounds)], 1),
            (Var::FinalTime, vec![plain(desc.final_time_bounds)], 1),
            (Var::States, states, num_grid_points),
            (Var::Controls, controls, num_grid_points),
            (Var::Multipliers, infos(desc.multipliers()), num_grid_points),
            (Var::Derivatives, infos(desc.derivatives()), num_grid_points),
            (Var::Parameters, infos(desc.parameters()), 1),
            (Var::Slacks, infos(desc.slacks()), num_slack_points),
            (Var::ProjectionStates, projection, num_mesh_intervals),
        ];

        let mut lower = Variables::new();
        let mut upper = Variables::new();
        for (var, rows, cols) in blocks {
            let (lo, hi) = bounds_block(&rows, cols);
            lower.insert(var, lo);
            upper.insert(var, hi);
        }
        (lower, upper)
    }

    fn create_constraint_bounds(
        desc: &ProblemDescription,
        layout: &ConstraintLayout,
    ) -> (Constraints, Constraints) {
        let mut lower = layout.filled(0.0);
        let mut upper = layout.filled(0.0);
        let kc = desc.kinematic_constraint_bounds();
        lower.kinematic.fill(kc.lower);
        upper.kinematic.fill(kc.upper);
        lower.kinematic_udoterr.fill(kc.lower);
        upper.kinematic_udoterr.fill(kc.upper);
        for (i, info) in desc.endpoint_constraints().iter().enumerate() {
            for (r, bounds) in info.bounds.iter().enumerate() {
                lower.endpoint[i][(r, 0)] = bounds.lower;
                upper.endpoint[i][(r, 0)] = bounds.upper;
            }
        }
        for (i, info) in desc.path_constraints().iter().enumerate() {
            for (r, bounds) in info.bounds.iter().enumerate() {
                lower.path[i].row_mut(r).fill(bounds.lower);
                upper.path[i].row_mut(r).fill(bounds.upper);
            }
        }
        (lower, upper)
    }

    pub fn problem(&self) -> &'a dyn Problem {
        self.problem
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn collocation(&self) -> &Collocation {
        &self.collocation
    }

    pub fn layout(&self) -> &ConstraintLayout {
        &self.layout
    }

    pub fn mesh(&self) -> &[f64] {
        &self.mesh
    }

    /// Fractions of the time span of every grid point.
    pub fn grid(&self) -> &DVector<f64> {
        &self.grid
    }

    pub fn num_mesh_intervals(&self) -> usize {
        self.mesh.len() - 1
    }

    pub fn num_grid_points(&self) -> usize {
        self.grid.len()
    }

    /// Number of grid points per mesh interval, excluding the start of the next interval.
    pub fn num_points_per_interval(&self) -> usize {
        self.layout.num_points_per_interval
    }

    pub fn mesh_points(&self) -> &[usize] {
        &self.mesh_points
    }

    pub fn mesh_interior_points(&self) -> &[usize] {
        &self.mesh_interior_points
    }

    pub fn path_points(&self) -> &[usize] {
        &self.path_points
    }

    pub fn projection_points(&self) -> &[usize] {
        &self.projection_points
    }

    /// Grid points at which the slack variables apply, one per slack column.
    pub fn slack_points(&self) -> &[usize] {
        &self.slack_points
    }

    pub fn interp_control_points(&self) -> &[usize] {
        &self.interp_control_points
    }

    /// Lower and upper bounds of the unscaled variables.
    pub fn variable_bounds(&self) -> (&Variables, &Variables) {
        (&self.lower, &self.upper)
    }

    pub fn constraint_bounds(&self) -> (&Constraints, &Constraints) {
        (&self.constraint_lower, &self.constraint_upper)
    }

    /// Scale and shift of every flattened variable.
    pub fn scaling(&self) -> (&DVector<f64>, &DVector<f64>) {
        (&self.scale, &self.shift)
    }

    /// One for the grid points which are mesh points, zero elsewhere.
    pub fn create_mesh_indices(&self) -> Result<DVector<f64>, CollocationError> {
        let mut indices = DVector::zeros(self.grid.len());
        for i in &self.mesh_points {
            ensure!(
                *i < indices.len(),
                StructuralSnafu {
                    msg: format!("mesh point {i} beyond the {} grid points", indices.len())
                }
            );
            indices[*i] = 1.0;
        }
        let num_mesh_points = indices.sum() as usize;
        ensure!(
            num_mesh_points == self.mesh.len(),
            StructuralSnafu {
                msg: format!(
                    "{num_mesh_points} grid points are mesh points but the mesh has {} points",
                    self.mesh.len()
                )
            }
        );
        Ok(indices)
    }

    pub fn create_times(&self, initial_time: f64, final_time: f64) -> DVector<f64> {
        self.grid
            .map(|fraction| initial_time + (final_time - initial_time) * fraction)
    }

    /// Quadrature weights of every grid point, such that the integral of a function sampled on
    /// the grid is the duration times the dot product of these weights with the samples.
    pub fn create_quadrature_coefficients(&self) -> DVector<f64> {
        let n = self.num_points_per_interval();
        let weights = self.collocation.quadrature_weights();
        let mut quadrature = DVector::zeros(self.grid.len());
        for (k, interval) in self.mesh.windows(2).enumerate() {
            let width = interval[1] - interval[0];
            for (j, weight) in weights.iter().enumerate() {
                quadrature[k * n + j] += weight * width;
            }
        }
        quadrature
    }

    pub fn quadrature(&self) -> &DVector<f64> {
        &self.quadrature
    }

    /// Concatenates the blocks of the variables, each column by column.
    pub fn flatten_variables(&self, variables: &Variables) -> Result<DVector<f64>, CollocationError> {
        let mut flat = Vec::with_capacity(self.scale.len());
        for (var, expected) in self.lower.iter() {
            let expected = expected.shape();
            if expected.0 * expected.1 == 0 {
                continue;
            }
            let block = variables.fetch(*var)?;
            ensure!(
                block.shape() == expected,
                ShapeSnafu {
                    var: *var,
                    expected,
                    actual: block.shape()
                }
            );
            flat.extend_from_slice(block.as_slice());
        }
        Ok(DVector::from_vec(flat))
    }

    /// Inverse of [`Transcription::flatten_variables`].
    pub fn expand_variables(&self, flat: &DVector<f64>) -> Result<Variables, CollocationError> {
        let expected: usize = self.lower.iter().map(|(_, block)| block.len()).sum();
        ensure!(
            flat.len() == expected,
            StructuralSnafu {
                msg: format!("cannot expand {} values into {expected} variables", flat.len())
            }
        );
        let mut variables = Variables::new();
        let mut offset = 0;
        for (var, block) in self.lower.iter() {
            let (rows, cols) = block.shape();
            let len = rows * cols;
            variables.insert(
                *var,
                DMatrix::from_column_slice(rows, cols, &flat.as_slice()[offset..offset + len]),
            );
            offset += len;
        }
        Ok(variables)
    }

    fn scale_flat(&self, unscaled: &DVector<f64>) -> DVector<f64> {
        (unscaled - &self.shift).component_div(&self.scale)
    }

    fn unscale_flat(&self, scaled: &DVector<f64>) -> Result<DVector<f64>, CollocationError> {
        ensure!(
            scaled.len() == self.scale.len(),
            StructuralSnafu {
                msg: format!(
                    "got {} scaled variables instead of {}",
                    scaled.len(),
                    self.scale.len()
                )
            }
        );
        Ok(scaled.component_mul(&self.scale) + &self.shift)
    }

    /// Flattened and scaled variables, as seen by the NLP solver.
    pub fn scale_variables(&self, variables: &Variables) -> Result<DVector<f64>, CollocationError> {
        Ok(self.scale_flat(&self.flatten_variables(variables)?))
    }

    /// Inverse of [`Transcription::scale_variables`].
    pub fn unscale_variables(&self, scaled: &DVector<f64>) -> Result<Variables, CollocationError> {
        self.expand_variables(&self.unscale_flat(scaled)?)
    }

    fn iterate_from_variables(
        &self,
        variables: Variables,
        iteration: Option<usize>,
    ) -> Result<Iterate, CollocationError> {
        let scalar = |var: Var| -> Result<f64, CollocationError> {
            variables.fetch(var)?.get(0).copied().ok_or_else(|| {
                CollocationError::Shape {
                    var,
                    expected: (1, 1),
                    actual: (0, 0),
                }
            })
        };
        let times = self.create_times(scalar(Var::InitialTime)?, scalar(Var::FinalTime)?);
        let desc = self.problem.description();
        Ok(Iterate {
            variables,
            times,
            state_names: desc.state_names(),
            control_names: desc.control_names(),
            multiplier_names: desc.multiplier_names(),
            derivative_names: desc.derivative_names(),
            parameter_names: desc.parameter_names(),
            slack_names: desc.slack_names(),
            projection_state_names: desc.projection_state_names(),
            iteration,
        })
    }

    /// Iterate at the provided scaled variables, as passed to the NLP solver.
    pub fn iterate_from_scaled(
        &self,
        scaled: &DVector<f64>,
        iteration: Option<usize>,
    ) -> Result<Iterate, CollocationError> {
        self.iterate_from_variables(self.unscale_variables(scaled)?, iteration)
    }

    /// Each variable at its lower bound if finite, else at its upper bound if finite, else zero.
    pub fn create_initial_guess_from_bounds(&self) -> Result<Iterate, CollocationError> {
        let variables = self.lower.zip_map(&self.upper, |lower, upper| {
            if lower.is_finite() {
                lower
            } else if upper.is_finite() {
                upper
            } else {
                0.0
            }
        })?;
        self.iterate_from_variables(variables, None)
    }

    /// Random variables drawn uniformly within the bounds. Unbounded variables are drawn in
    /// [-1, 1] and clamped to whichever bound they have.
    pub(crate) fn random_variables<R: Rng>(&self, rng: &mut R) -> Result<Variables, CollocationError> {
        let dist = Uniform::new_inclusive(-1.0, 1.0);
        let mut variables = Variables::new();
        for (var, lower) in self.lower.iter() {
            let upper = self.upper.fetch(*var)?;
            let block = DMatrix::from_fn(lower.nrows(), lower.ncols(), |r, c| {
                let (l, u) = (lower[(r, c)], upper[(r, c)]);
                let x: f64 = dist.sample(&mut *rng);
                let value = 0.5 * (x + 1.0) * (u - l) + l;
                if value.is_finite() {
                    value
                } else {
                    x.max(l).min(u)
                }
            });
            variables.insert(*var, block);
        }
        Ok(variables)
    }

    pub fn create_random_iterate_within_bounds(&self, seed: u64) -> Result<Iterate, CollocationError> {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let variables = self.random_variables(&mut rng)?;
        self.iterate_from_variables(variables, None)
    }

    /// Variables on this transcription's grid from an initial guess. The guess is resampled if
    /// its number of times differs from the grid; slacks sampled on their own uniform grid are
    /// interpolated onto the slack points, and missing projection states are taken from the
    /// multibody states.
    pub fn variables_from_iterate(&self, guess: &Iterate) -> Result<Variables, CollocationError> {
        let desc = self.problem.description();
        let time_or = |var: Var, default: Option<&f64>| -> Option<f64> {
            guess
                .variables
                .get(var)
                .and_then(|block| block.get(0).copied())
                .or(default.copied())
        };
        let initial_time = time_or(Var::InitialTime, guess.times.iter().next());
        let final_time = time_or(Var::FinalTime, guess.times.iter().last());
        let (initial_time, final_time) = match (initial_time, final_time) {
            (Some(t0), Some(tf)) => (t0, tf),
            _ => {
                return ShapeSnafu {
                    var: Var::InitialTime,
                    expected: (1, 1),
                    actual: (0, 0),
                }
                .fail()
            }
        };
        let times = self.create_times(initial_time, final_time);

        let mut guess = if guess.num_times() != self.grid.len() {
            debug!(
                "resampling the guess from {} to {} times",
                guess.num_times(),
                self.grid.len()
            );
            guess.resample(&times)?
        } else {
            guess.clone()
        };
        if desc.num_projection_states() > 0 {
            guess = guess
                .with_projection_states(desc.num_multibody_states(), &self.projection_points)?;
        }

        let mut variables = Variables::new();
        for (var, lower) in self.lower.iter() {
            let expected = lower.shape();
            let block = match (var, guess.variables.get(*var)) {
                (Var::InitialTime, _) => DMatrix::from_element(1, 1, initial_time),
                (Var::FinalTime, _) => DMatrix::from_element(1, 1, final_time),
                (_, Some(block)) if block.shape() == expected => block.clone(),
                _ if expected.0 * expected.1 == 0 => DMatrix::zeros(expected.0, expected.1),
                (Var::Slacks, Some(block)) if block.nrows() == expected.0 && block.ncols() > 0 => {
                    let own_times = linspace(initial_time, final_time, block.ncols());
                    let at: Vec<f64> = self.slack_points.iter().map(|i| times[*i]).collect();
                    interpolate_rows(own_times.as_slice(), block, &at)
                }
                (Var::Slacks, _) => lower.zip_map(&self.upper[Var::Slacks], |l, u| {
                    0.0_f64.max(l).min(u)
                }),
                (_, block) => {
                    return ShapeSnafu {
                        var: *var,
                        expected,
                        actual: block.map_or((0, 0), |b| b.shape()),
                    }
                    .fail()
                }
            };
            variables.insert(*var, block);
        }
        Ok(variables)
    }

    /// Scaled variables of the guess, clamped into their bounds.
    fn initial_point(&self, guess: &Iterate) -> Result<DVector<f64>, CollocationError> {
        let scaled = self.scale_variables(&self.variables_from_iterate(guess)?)?;
        Ok(DVector::from_fn(scaled.len(), |j, _| {
            scaled[j]
                .max(self.bounds.x_lower[j])
                .min(self.bounds.x_upper[j])
        }))
    }

    /// Maps the function over `0..count`, on the thread pool if parallelism is enabled. The
    /// results are in index order either way.
    pub(crate) fn map_indexed<T, F>(&self, count: usize, f: F) -> Result<Vec<T>, CollocationError>
    where
        T: Send,
        F: Fn(usize) -> Result<T, CollocationError> + Sync + Send,
    {
        match self.config.parallelism {
            Parallelism::Thread => (0..count).into_par_iter().map(f).collect(),
            Parallelism::Serial => (0..count).map(f).collect(),
        }
    }

    /// Solves the transcription with the reference SQP solver configured by the solver options.
    pub fn solve(
        &self,
        guess: &Iterate,
        sparsity_samples: &[Variables],
    ) -> Result<Solution, CollocationError> {
        let solver = SqpSolver::builder()
            .max_iterations(self.config.optim_max_iterations)
            .convergence_tolerance(self.config.optim_convergence_tolerance)
            .constraint_tolerance(self.config.optim_constraint_tolerance)
            .hessian(self.config.optim_hessian_approximation)
            .finite_differences(self.config.finite_difference_scheme)
            .build();
        self.solve_with(guess, sparsity_samples, &solver)
    }

    /// Solves the transcription with the provided NLP solver.
    pub fn solve_with(
        &self,
        guess: &Iterate,
        sparsity_samples: &[Variables],
        solver: &dyn NlpSolver,
    ) -> Result<Solution, CollocationError> {
        let x0 = self.initial_point(guess)?;
        let samples = sparsity_samples
            .iter()
            .map(|sample| self.scale_variables(sample))
            .collect::<Result<Vec<_>, _>>()?;
        let sparsity = NlpSparsity::detect(self, &samples, self.config.finite_difference_scheme)?;
        info!(
            "constraint Jacobian has {} non-zeros ({} samples), {} colors",
            sparsity.jacobian.nnz(),
            samples.len(),
            sparsity.jacobian.num_colors()
        );

        let output_interval = self.config.output_interval;
        let mut callback = |info: &IterationInfo| -> Result<(), CollocationError> {
            if output_interval > 0 && info.iteration % output_interval == 0 {
                let iterate = self.iterate_from_scaled(info.x, Some(info.iteration))?;
                self.problem.intermediate_callback(Some(&iterate))
            } else {
                self.problem.intermediate_callback(None)
            }
        };

        let outcome = solver.solve(self, &x0, &sparsity, &mut callback)?;

        let variables = self.unscale_variables(&outcome.x)?;
        let constraints = self.layout.expand(&outcome.constraints)?;
        let objective_breakdown = self.objective_terms(&variables)?;
        let iterate = self.iterate_from_variables(variables, Some(outcome.iterations))?;

        if outcome.success {
            info!(
                "solved in {} iterations, objective = {:.6e}",
                outcome.iterations, outcome.objective
            );
        } else {
            warn!("solve failed: {}", outcome.message);
        }

        Ok(Solution {
            iterate,
            success: outcome.success,
            status: outcome.message,
            objective: outcome.objective,
            objective_breakdown,
            num_iterations: outcome.iterations,
            constraints,
        })
    }

    /// Labels of the rows of a constraint block.
    fn row_labels(&self, block: Block) -> Vec<String> {
        let desc = self.problem.description();
        let rows = self.constraint_lower.block(block).nrows();
        let indexed = |name: &str| -> Vec<String> {
            (0..rows).map(|r| format!("{name}[{r}]")).collect()
        };
        match block {
            Block::Endpoint(i) => indexed(&desc.endpoint_constraints()[i].name),
            Block::Path(i) => indexed(&desc.path_constraints()[i].name),
            Block::Defects => {
                let names = desc.state_names();
                (0..rows)
                    .map(|r| names[r % names.len()].clone())
                    .collect()
            }
            Block::InterpControls => desc.control_names(),
            Block::Projection => desc.projection_state_names(),
            _ => indexed(&block.to_string()),
        }
    }

    /// Grid index of each column of a constraint block, none for endpoint constraints.
    fn column_points(&self, block: Block) -> Vec<Option<usize>> {
        let all = |points: &[usize]| -> Vec<Option<usize>> { points.iter().map(|i| Some(*i)).collect() };
        match block {
            Block::Endpoint(_) => vec![None],
            Block::Path(_) => all(&self.path_points),
            Block::Kinematic => all(&self.mesh_points),
            Block::Defects => all(&self.mesh_points[..self.num_mesh_intervals()]),
            Block::InterpControls => all(&self.interp_control_points),
            Block::Projection => all(&self.projection_points),
            Block::KinematicUdoterr | Block::MultibodyResiduals | Block::AuxiliaryResiduals => {
                (0..self.grid.len()).map(Some).collect()
            }
        }
    }

    /// Writes the largest violation of the bounds of each row of each constraint block, with the
    /// time at which it occurs.
    pub fn write_constraint_values<W: Write>(
        &self,
        solution: &Solution,
        out: &mut W,
    ) -> Result<(), CollocationError> {
        let times = &solution.iterate.times;
        writeln!(out, "Constraint violations (largest per row):").context(IoSnafu {
            action: "writing constraint values",
        })?;
        for (block, values) in solution.constraints.blocks() {
            if values.is_empty() {
                continue;
            }
            let lower = self.constraint_lower.block(block);
            let upper = self.constraint_upper.block(block);
            let labels = self.row_labels(block);
            let points = self.column_points(block);
            ensure!(
                lower.shape() == values.shape() && points.len() == values.ncols(),
                StructuralSnafu {
                    msg: format!("constraint block {block} does not match the transcription")
                }
            );
            writeln!(out, "{block}").context(IoSnafu {
                action: "writing constraint values",
            })?;
            for r in 0..values.nrows() {
                let (col, violation) = (0..values.ncols())
                    .map(|c| {
                        let v = values[(r, c)];
                        (c, (lower[(r, c)] - v).max(v - upper[(r, c)]).max(0.0))
                    })
                    .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
                let label = labels.get(r).map_or("?", |s| s.as_str());
                let written = match points[col].and_then(|i| times.get(i)) {
                    Some(t) => writeln!(out, "  {label:<32} {violation:.3e} at t = {t:.6}"),
                    None => writeln!(out, "  {label:<32} {violation:.3e}"),
                };
                written.context(IoSnafu {
                    action: "writing constraint values",
                })?;
            }
        }
        Ok(())
    }
}

impl NlpProblem for Transcription<'_> {
    fn num_variables(&self) -> usize {
        self.scale.len()
    }

    fn num_constraints(&self) -> usize {
        self.layout.len()
    }

    fn bounds(&self) -> &NlpBounds {
        &self.bounds
    }

    fn objective(&self, x: &DVector<f64>) -> Result<f64, CollocationError> {
        let variables = self.unscale_variables(x)?;
        Ok(self
            .objective_terms(&variables)?
            .iter()
            .map(|(_, value)| value)
            .sum())
    }

    fn constraints(&self, x: &DVector<f64>) -> Result<DVector<f64>, CollocationError> {
        let variables = self.unscale_variables(x)?;
        self.layout.flatten(&self.evaluate_constraints(&variables)?)
    }
}

/// Checks the number of entries returned by a problem callback.
pub(crate) fn check_output(
    callback: &'static str,
    what: &str,
    actual: usize,
    expected: usize,
) -> Result<(), CollocationError> {
    ensure!(
        actual == expected,
        CallbackSnafu {
            callback,
            msg: format!("{what} has {actual} entries, expected {expected}")
        }
    );
    Ok(())
}
