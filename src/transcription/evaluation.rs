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

use super::constraints::Constraints;
use super::schemes::CollocationScheme;
use super::{check_output, Transcription};
use crate::errors::{CollocationError, ShapeSnafu, StructuralSnafu};
use crate::iterate::Variables;
use crate::linalg::{DMatrix, DVector};
use crate::problem::{ContinuousInput, DynamicsMode, EndpointInput};
use snafu::ensure;

/// Borrowed blocks of unscaled variables, with the times of the grid.
pub(super) struct Unpacked<'v> {
    pub initial_time: f64,
    pub final_time: f64,
    pub times: DVector<f64>,
    pub states: &'v DMatrix<f64>,
    pub controls: &'v DMatrix<f64>,
    pub multipliers: &'v DMatrix<f64>,
    pub derivatives: &'v DMatrix<f64>,
    pub parameters: &'v DMatrix<f64>,
    pub slacks: &'v DMatrix<f64>,
    pub projection_states: &'v DMatrix<f64>,
}

impl<'v> Unpacked<'v> {
    pub fn duration(&self) -> f64 {
        self.final_time - self.initial_time
    }

    pub fn input(&self, i: usize) -> ContinuousInput<'v> {
        ContinuousInput {
            time: self.times[i],
            states: self.states.column(i),
            controls: self.controls.column(i),
            multipliers: self.multipliers.column(i),
            derivatives: self.derivatives.column(i),
            parameters: self.parameters.column(0),
        }
    }

    pub fn endpoint_input(&self, integral: f64) -> EndpointInput<'v> {
        let last = self.times.len() - 1;
        let initial = self.input(0);
        let final_ = self.input(last);
        EndpointInput {
            initial_time: self.initial_time,
            initial_states: initial.states,
            initial_controls: initial.controls,
            initial_multipliers: initial.multipliers,
            initial_derivatives: initial.derivatives,
            final_time: self.final_time,
            final_states: final_.states,
            final_controls: final_.controls,
            final_multipliers: final_.multipliers,
            final_derivatives: final_.derivatives,
            parameters: initial.parameters,
            integral,
        }
    }
}

/// Dynamics evaluated at one grid point.
pub(super) struct PointDynamics {
    /// Time derivative of every state
    pub xdot: DVector<f64>,
    pub multibody_residuals: DVector<f64>,
    pub auxiliary_residuals: DVector<f64>,
    /// Zeros unless the kinematic constraint errors were requested
    pub kinematic: DVector<f64>,
}

impl Transcription<'_> {
    pub(super) fn unpack<'v>(&self, variables: &'v Variables) -> Result<Unpacked<'v>, CollocationError> {
        let mut blocks = Vec::with_capacity(self.lower.len());
        for (var, expected) in self.lower.iter() {
            let block = variables.fetch(*var)?;
            ensure!(
                block.shape() == expected.shape(),
                ShapeSnafu {
                    var: *var,
                    expected: expected.shape(),
                    actual: block.shape()
                }
            );
            blocks.push(block);
        }
        let [initial_time, final_time, states, controls, multipliers, derivatives, parameters, slacks, projection_states]: [&'v DMatrix<f64>; 9] =
            blocks.try_into().map_err(|_| CollocationError::Structural {
                msg: "unexpected number of variable blocks".to_string(),
            })?;
        let initial_time = initial_time[(0, 0)];
        let final_time = final_time[(0, 0)];
        Ok(Unpacked {
            initial_time,
            final_time,
            times: self.create_times(initial_time, final_time),
            states,
            controls,
            multipliers,
            derivatives,
            parameters,
            slacks,
            projection_states,
        })
    }

    /// Evaluates the multibody system at one point and assembles the state derivatives: the
    /// coordinate derivatives are the speeds, followed by the accelerations (from the dynamics in
    /// explicit mode, from the derivative variables in implicit mode) and the auxiliary derivatives.
    pub(super) fn calc_dynamics(
        &self,
        input: &ContinuousInput,
        calc_kc_errors: bool,
    ) -> Result<PointDynamics, CollocationError> {
        let desc = self.problem.description();
        let nq = desc.num_coordinates();
        let nu = desc.num_speeds();
        let nz = desc.num_auxiliary_states();
        let num_kc = desc.num_kinematic_constraint_equations();

        let mut xdot = DVector::zeros(desc.num_states());
        xdot.rows_mut(0, nq).copy_from(&input.states.rows(nq, nu));

        let (multibody_residuals, auxiliary_derivatives, auxiliary_residuals, kinematic) =
            match desc.dynamics_mode {
                DynamicsMode::Explicit => {
                    let out = self
                        .problem
                        .calc_multibody_system_explicit(input, calc_kc_errors)?;
                    check_output(
                        "calc_multibody_system_explicit",
                        "multibody derivatives",
                        out.multibody_derivatives.len(),
                        nu,
                    )?;
                    xdot.rows_mut(nq, nu).copy_from(&out.multibody_derivatives);
                    (
                        DVector::zeros(0),
                        out.auxiliary_derivatives,
                        out.auxiliary_residuals,
                        out.kinematic_constraint_errors,
                    )
                }
                DynamicsMode::Implicit => {
                    let out = self
                        .problem
                        .calc_multibody_system_implicit(input, calc_kc_errors)?;
                    check_output(
                        "calc_multibody_system_implicit",
                        "multibody residuals",
                        out.multibody_residuals.len(),
                        nu,
                    )?;
                    xdot.rows_mut(nq, nu).copy_from(&input.derivatives.rows(0, nu));
                    (
                        out.multibody_residuals,
                        out.auxiliary_derivatives,
                        out.auxiliary_residuals,
                        out.kinematic_constraint_errors,
                    )
                }
            };

        check_output(
            "calc_multibody_system",
            "auxiliary derivatives",
            auxiliary_derivatives.len(),
            nz,
        )?;
        xdot.rows_mut(nq + nu, nz).copy_from(&auxiliary_derivatives);
        check_output(
            "calc_multibody_system",
            "auxiliary residuals",
            auxiliary_residuals.len(),
            desc.num_auxiliary_residual_equations(),
        )?;
        let kinematic = if calc_kc_errors {
            check_output(
                "calc_multibody_system",
                "kinematic constraint errors",
                kinematic.len(),
                num_kc,
            )?;
            kinematic
        } else {
            DVector::zeros(num_kc)
        };

        Ok(PointDynamics {
            xdot,
            multibody_residuals,
            auxiliary_residuals,
            kinematic,
        })
    }

    /// Integral over the time span of an integrand sampled at the grid points with a non-zero
    /// quadrature weight.
    pub(super) fn integrate<F>(&self, traj: &Unpacked, integrand: F) -> Result<f64, CollocationError>
    where
        F: Fn(&ContinuousInput) -> Result<f64, CollocationError> + Sync + Send,
    {
        let values = self.map_indexed(self.grid.len(), |i| {
            if self.quadrature[i] == 0.0 {
                Ok(0.0)
            } else {
                integrand(&traj.input(i))
            }
        })?;
        Ok(traj.duration() * self.quadrature.dot(&DVector::from_vec(values)))
    }

    /// Values of every constraint block at the provided unscaled variables.
    pub fn evaluate_constraints(&self, variables: &Variables) -> Result<Constraints, CollocationError> {
        let traj = self.unpack(variables)?;
        let desc = self.problem.description();
        let n = self.num_points_per_interval();
        let num_mesh_intervals = self.num_mesh_intervals();
        let num_grid_points = self.grid.len();
        let nq = desc.num_coordinates();
        let nmb = desc.num_multibody_states();
        let num_kc = desc.num_kinematic_constraint_equations();
        let num_kinematic = self.layout.num_kinematic;
        let bordalba = desc.is_kinematic_constraint_method_bordalba2023();

        let mut out = self.layout.filled(0.0);

        let mut dynamics = self.map_indexed(num_grid_points, |i| {
            let calc_kc_errors = num_kc > 0 && (bordalba || i % n == 0);
            self.calc_dynamics(&traj.input(i), calc_kc_errors)
        })?;

        // Velocity correction at the mesh interior points
        if desc.is_kinematic_constraint_method_posa2016() {
            let corrections = self.map_indexed(self.slack_points.len(), |k| {
                let i = self.slack_points[k];
                let correction = self.problem.calc_velocity_correction(
                    traj.times[i],
                    traj.states.column(i).rows(0, nmb),
                    traj.slacks.column(k),
                    traj.parameters.column(0),
                )?;
                check_output(
                    "calc_velocity_correction",
                    "velocity correction",
                    correction.len(),
                    nq,
                )?;
                Ok(correction)
            })?;
            for (k, correction) in corrections.into_iter().enumerate() {
                let mut qdot = dynamics[self.slack_points[k]].xdot.rows_mut(0, nq);
                qdot += correction;
            }
        }

        for (i, point) in dynamics.iter().enumerate() {
            out.multibody_residuals
                .set_column(i, &point.multibody_residuals);
            out.auxiliary_residuals
                .set_column(i, &point.auxiliary_residuals);
            if bordalba {
                out.kinematic_udoterr
                    .set_column(i, &point.kinematic.rows(num_kinematic, desc.num_udoterr()));
            }
        }

        // Dynamics at the projection states, which replace the multibody states at the end of
        // each mesh interval
        let projected = if bordalba {
            self.map_indexed(num_mesh_intervals, |k| {
                let i = self.projection_points[k];
                let mut states = traj.states.column(i).into_owned();
                states
                    .rows_mut(0, nmb)
                    .copy_from(&traj.projection_states.column(k));
                let input = ContinuousInput {
                    states: states.column(0),
                    ..traj.input(i)
                };
                let point = self.calc_dynamics(&input, true)?;
                let projection = self.problem.calc_state_projection(
                    traj.times[i],
                    traj.projection_states.column(k),
                    traj.slacks.column(k),
                    traj.parameters.column(0),
                )?;
                check_output(
                    "calc_state_projection",
                    "state projection",
                    projection.len(),
                    nmb,
                )?;
                let constraint = traj.states.column(i).rows(0, nmb)
                    - traj.projection_states.column(k)
                    - projection;
                Ok((states, point, constraint))
            })?
        } else {
            Vec::new()
        };

        for (k, (_, _, constraint)) in projected.iter().enumerate() {
            out.projection.set_column(k, constraint);
        }
        if num_kinematic > 0 {
            if bordalba {
                out.kinematic
                    .set_column(0, &dynamics[0].kinematic.rows(0, num_kinematic));
                for (k, (_, point, _)) in projected.iter().enumerate() {
                    out.kinematic
                        .set_column(k + 1, &point.kinematic.rows(0, num_kinematic));
                }
            } else {
                for (k, i) in self.mesh_points.iter().enumerate() {
                    out.kinematic.set_column(k, &dynamics[*i].kinematic);
                }
            }
        }

        // Defects
        let ns = desc.num_states();
        let duration = traj.duration();
        for k in 0..num_mesh_intervals {
            let start = k * n;
            let mut x = traj.states.columns(start, n + 1).into_owned();
            let mut xdot = DMatrix::from_fn(ns, n + 1, |r, c| dynamics[start + c].xdot[r]);
            if let Some((states, point, _)) = projected.get(k) {
                x.set_column(n, states);
                xdot.set_column(n, &point.xdot);
            }
            let h = duration * (self.mesh[k + 1] - self.mesh[k]);
            let defects = self.collocation.calc_defects(&x, &xdot, h);
            ensure!(
                defects.len() == self.layout.num_defects_per_interval,
                StructuralSnafu {
                    msg: format!(
                        "{} defects in interval {k}, expected {}",
                        defects.len(),
                        self.layout.num_defects_per_interval
                    )
                }
            );
            out.defects.set_column(k, &defects);
        }

        if self.layout.interpolate_controls {
            for k in 0..num_mesh_intervals {
                let controls = traj.controls.columns(k * n, n + 1).into_owned();
                let interp = self.collocation.calc_interpolating_controls(&controls);
                out.interp_controls
                    .columns_mut(k * (n - 1), n - 1)
                    .copy_from(&interp);
            }
        }

        // Path constraints
        let path_infos = desc.path_constraints();
        if !path_infos.is_empty() {
            let values = self.map_indexed(self.path_points.len(), |p| {
                let input = traj.input(self.path_points[p]);
                path_infos
                    .iter()
                    .enumerate()
                    .map(|(index, info)| {
                        let value = self.problem.calc_path_constraint(index, &input)?;
                        check_output("calc_path_constraint", &info.name, value.len(), info.size())?;
                        Ok(value)
                    })
                    .collect::<Result<Vec<_>, CollocationError>>()
            })?;
            for (p, point) in values.iter().enumerate() {
                for (index, value) in point.iter().enumerate() {
                    out.path[index].set_column(p, value);
                }
            }
        }

        // Endpoint constraints
        for (index, info) in desc.endpoint_constraints().iter().enumerate() {
            let integral = if info.requires_integral {
                self.integrate(&traj, |input| {
                    self.problem.calc_endpoint_constraint_integrand(index, input)
                })?
            } else {
                0.0
            };
            let value = self
                .problem
                .calc_endpoint_constraint(index, &traj.endpoint_input(integral))?;
            check_output(
                "calc_endpoint_constraint",
                &info.name,
                value.len(),
                info.num_outputs(),
            )?;
            out.endpoint[index].set_column(0, &value);
        }

        Ok(out)
    }

    /// Named value of each term of the objective at the provided unscaled variables.
    pub fn objective_terms(&self, variables: &Variables) -> Result<Vec<(String, f64)>, CollocationError> {
        let traj = self.unpack(variables)?;
        let desc = self.problem.description();
        let mut terms = Vec::with_capacity(desc.costs().len() + 1);
        for (index, info) in desc.costs().iter().enumerate() {
            let integral = if info.requires_integral {
                self.integrate(&traj, |input| self.problem.calc_cost_integrand(index, input))?
            } else {
                0.0
            };
            let value = self
                .problem
                .calc_cost(index, &traj.endpoint_input(integral))?;
            check_output("calc_cost", &info.name, value.len(), info.num_outputs)?;
            terms.push((info.name.clone(), value.sum()));
        }

        if self.config.minimize_lagrange_multipliers && desc.num_multipliers() > 0 {
            let squared = DVector::from_fn(self.grid.len(), |i, _| {
                traj.multipliers.column(i).norm_squared()
            });
            terms.push((
                "multipliers".to_string(),
                self.config.lagrange_multiplier_weight
                    * traj.duration()
                    * self.quadrature.dot(&squared),
            ));
        }
        trace!("objective terms: {terms:?}");
        Ok(terms)
    }
}
