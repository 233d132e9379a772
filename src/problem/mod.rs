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

use crate::errors::{CollocationError, DescriptionSnafu};
use crate::iterate::Iterate;
use crate::linalg::{DVector, DVectorView};
use crate::nlp::FiniteDifferenceScheme;
use crate::iterate::Variables;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;

pub mod jar;
pub mod model;

pub use jar::{JarGuard, ThreadsafeJar};
pub use model::{DynamicsModel, ModelProblem};

/// Lower and upper bounds of a scalar quantity. Unset bounds are infinite.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    /// Builds new bounds, ensuring that the lower bound does not exceed the upper one.
    pub fn new(lower: f64, upper: f64) -> Result<Self, CollocationError> {
        ensure!(
            !(lower > upper),
            DescriptionSnafu {
                msg: format!("lower bound {lower} exceeds upper bound {upper}")
            }
        );
        Ok(Self { lower, upper })
    }

    /// Bounds which fix the quantity to the provided value.
    pub fn fixed(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Unbounded, i.e. [-inf, +inf].
    pub fn unset() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    /// Returns true if either side of the bounds is finite.
    pub fn is_set(&self) -> bool {
        self.lower.is_finite() || self.upper.is_finite()
    }

    /// Returns true if the lower and upper bounds are equal.
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// Role of a state in the multibody system. States must be ordered as coordinates, speeds, then auxiliary states.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateType {
    Coordinate,
    Speed,
    Auxiliary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateInfo {
    pub name: String,
    pub state_type: StateType,
    pub bounds: Bounds,
    pub initial_bounds: Bounds,
    pub final_bounds: Bounds,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlInfo {
    pub name: String,
    pub bounds: Bounds,
    pub initial_bounds: Bounds,
    pub final_bounds: Bounds,
}

/// Information on a variable which has the same bounds at every point where it is defined.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub bounds: Bounds,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CostInfo {
    pub name: String,
    pub num_outputs: usize,
    pub requires_integral: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointConstraintInfo {
    pub name: String,
    pub requires_integral: bool,
    /// One set of bounds per output of this constraint
    pub bounds: Vec<Bounds>,
}

impl EndpointConstraintInfo {
    pub fn num_outputs(&self) -> usize {
        self.bounds.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathConstraintInfo {
    pub name: String,
    /// One set of bounds per equation of this constraint
    pub bounds: Vec<Bounds>,
}

impl PathConstraintInfo {
    pub fn size(&self) -> usize {
        self.bounds.len()
    }
}

/// Whether the multibody dynamics are provided as accelerations or as residuals of the equations of motion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicsMode {
    #[default]
    Explicit,
    /// The accelerations are decision variables (the first derivatives) and the problem
    /// provides the residuals of the equations of motion.
    Implicit,
}

/// Method used to enforce kinematic constraints.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KinematicConstraintMethod {
    /// Posa, Kuindersma, Tedrake (2016): position, velocity and acceleration errors at mesh points,
    /// and a velocity correction at the Hermite-Simpson midpoints.
    #[default]
    Posa2016,
    /// Bordalba, Schoels, Ros, Porta, Diehl (2023): acceleration errors at every grid point and
    /// a projection of the end state of every mesh interval onto the constraint manifold.
    Bordalba2023,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KinematicConstraints {
    pub num_qerr: usize,
    pub num_uerr: usize,
    pub num_udoterr: usize,
    pub method: KinematicConstraintMethod,
    pub bounds: Bounds,
}

/// Static description of an optimal control problem: variable counts, names, bounds and the
/// information needed to size every cost and constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct ProblemDescription {
    pub initial_time_bounds: Bounds,
    pub final_time_bounds: Bounds,
    pub dynamics_mode: DynamicsMode,
    states: Vec<StateInfo>,
    controls: Vec<ControlInfo>,
    multipliers: Vec<VariableInfo>,
    derivatives: Vec<VariableInfo>,
    parameters: Vec<VariableInfo>,
    slacks: Vec<VariableInfo>,
    costs: Vec<CostInfo>,
    endpoint_constraints: Vec<EndpointConstraintInfo>,
    path_constraints: Vec<PathConstraintInfo>,
    kinematic_constraints: Option<KinematicConstraints>,
    num_auxiliary_residual_equations: usize,
}

impl Default for ProblemDescription {
    fn default() -> Self {
        Self {
            initial_time_bounds: Bounds::unset(),
            final_time_bounds: Bounds::unset(),
            dynamics_mode: DynamicsMode::Explicit,
            states: Vec::new(),
            controls: Vec::new(),
            multipliers: Vec::new(),
            derivatives: Vec::new(),
            parameters: Vec::new(),
            slacks: Vec::new(),
            costs: Vec::new(),
            endpoint_constraints: Vec::new(),
            path_constraints: Vec::new(),
            kinematic_constraints: None,
            num_auxiliary_residual_equations: 0,
        }
    }
}

impl ProblemDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time_bounds(&mut self, initial: Bounds, final_: Bounds) {
        self.initial_time_bounds = initial;
        self.final_time_bounds = final_;
    }

    pub fn set_dynamics_mode(&mut self, mode: DynamicsMode) {
        self.dynamics_mode = mode;
    }

    /// Adds a state. Coordinates must be added before speeds, and speeds before auxiliary states.
    pub fn add_state<S: Into<String>>(
        &mut self,
        name: S,
        state_type: StateType,
        bounds: Bounds,
        initial_bounds: Bounds,
        final_bounds: Bounds,
    ) -> Result<(), CollocationError> {
        let name = name.into();
        if let Some(last) = self.states.last() {
            ensure!(
                last.state_type <= state_type,
                DescriptionSnafu {
                    msg: format!(
                        "state `{name}` of type {state_type:?} cannot follow a state of type {:?}",
                        last.state_type
                    )
                }
            );
        }
        self.states.push(StateInfo {
            name,
            state_type,
            bounds,
            initial_bounds,
            final_bounds,
        });
        Ok(())
    }

    pub fn add_control<S: Into<String>>(
        &mut self,
        name: S,
        bounds: Bounds,
        initial_bounds: Bounds,
        final_bounds: Bounds,
    ) {
        self.controls.push(ControlInfo {
            name: name.into(),
            bounds,
            initial_bounds,
            final_bounds,
        });
    }

    pub fn add_multiplier<S: Into<String>>(&mut self, name: S, bounds: Bounds) {
        self.multipliers.push(VariableInfo {
            name: name.into(),
            bounds,
        });
    }

    pub fn add_derivative<S: Into<String>>(&mut self, name: S, bounds: Bounds) {
        self.derivatives.push(VariableInfo {
            name: name.into(),
            bounds,
        });
    }

    pub fn add_parameter<S: Into<String>>(&mut self, name: S, bounds: Bounds) {
        self.parameters.push(VariableInfo {
            name: name.into(),
            bounds,
        });
    }

    pub fn add_slack<S: Into<String>>(&mut self, name: S, bounds: Bounds) {
        self.slacks.push(VariableInfo {
            name: name.into(),
            bounds,
        });
    }

    pub fn add_cost<S: Into<String>>(&mut self, name: S, num_outputs: usize, requires_integral: bool) {
        self.costs.push(CostInfo {
            name: name.into(),
            num_outputs,
            requires_integral,
        });
    }

    pub fn add_endpoint_constraint<S: Into<String>>(
        &mut self,
        name: S,
        requires_integral: bool,
        bounds: Vec<Bounds>,
    ) {
        self.endpoint_constraints.push(EndpointConstraintInfo {
            name: name.into(),
            requires_integral,
            bounds,
        });
    }

    pub fn add_path_constraint<S: Into<String>>(&mut self, name: S, bounds: Vec<Bounds>) {
        self.path_constraints.push(PathConstraintInfo {
            name: name.into(),
            bounds,
        });
    }

    pub fn set_num_auxiliary_residual_equations(&mut self, num: usize) {
        self.num_auxiliary_residual_equations = num;
    }

    pub fn set_kinematic_constraints(&mut self, kinematic_constraints: KinematicConstraints) {
        if kinematic_constraints.num_qerr
            + kinematic_constraints.num_uerr
            + kinematic_constraints.num_udoterr
            == 0
        {
            self.kinematic_constraints = None;
        } else {
            self.kinematic_constraints = Some(kinematic_constraints);
        }
    }

    /// Checks the consistency of this description, called when building a transcription.
    pub fn validate(&self) -> Result<(), CollocationError> {
        for (name, bounds) in self.all_bounds() {
            ensure!(
                !(bounds.lower > bounds.upper),
                DescriptionSnafu {
                    msg: format!("bounds {bounds} of {name} are inverted")
                }
            );
        }
        ensure!(
            self.num_coordinates() == self.num_speeds(),
            DescriptionSnafu {
                msg: format!(
                    "{} coordinates but {} speeds: every coordinate requires exactly one speed",
                    self.num_coordinates(),
                    self.num_speeds()
                )
            }
        );
        if self.dynamics_mode == DynamicsMode::Implicit {
            ensure!(
                self.num_derivatives() >= self.num_speeds(),
                DescriptionSnafu {
                    msg: format!(
                        "implicit dynamics require at least {} derivatives (one per speed), got {}",
                        self.num_speeds(),
                        self.num_derivatives()
                    )
                }
            );
        }
        if let Some(kc) = &self.kinematic_constraints {
            ensure!(
                self.num_multibody_states() > 0,
                DescriptionSnafu {
                    msg: "kinematic constraints require multibody states"
                }
            );
            if kc.method == KinematicConstraintMethod::Bordalba2023 {
                ensure!(
                    self.num_slacks() >= kc.num_qerr + kc.num_uerr,
                    DescriptionSnafu {
                        msg: format!(
                            "projection method requires {} slacks, got {}",
                            kc.num_qerr + kc.num_uerr,
                            self.num_slacks()
                        )
                    }
                );
            }
        }
        for info in &self.endpoint_constraints {
            ensure!(
                info.num_outputs() > 0,
                DescriptionSnafu {
                    msg: format!("endpoint constraint `{}` has no outputs", info.name)
                }
            );
        }
        Ok(())
    }

    /// Every set of bounds of the description, labeled by what it applies to.
    fn all_bounds(&self) -> Vec<(String, Bounds)> {
        let mut all = vec![
            ("the initial time".to_string(), self.initial_time_bounds),
            ("the final time".to_string(), self.final_time_bounds),
        ];
        for info in &self.states {
            all.push((format!("state `{}`", info.name), info.bounds));
            all.push((format!("the initial `{}`", info.name), info.initial_bounds));
            all.push((format!("the final `{}`", info.name), info.final_bounds));
        }
        for info in &self.controls {
            all.push((format!("control `{}`", info.name), info.bounds));
            all.push((format!("the initial `{}`", info.name), info.initial_bounds));
            all.push((format!("the final `{}`", info.name), info.final_bounds));
        }
        for (kind, infos) in [
            ("multiplier", &self.multipliers),
            ("derivative", &self.derivatives),
            ("parameter", &self.parameters),
            ("slack", &self.slacks),
        ] {
            for info in infos {
                all.push((format!("{kind} `{}`", info.name), info.bounds));
            }
        }
        for info in &self.endpoint_constraints {
            for bounds in &info.bounds {
                all.push((format!("endpoint constraint `{}`", info.name), *bounds));
            }
        }
        for info in &self.path_constraints {
            for bounds in &info.bounds {
                all.push((format!("path constraint `{}`", info.name), *bounds));
            }
        }
        if let Some(kc) = &self.kinematic_constraints {
            all.push(("the kinematic constraints".to_string(), kc.bounds));
        }
        all
    }

    pub fn states(&self) -> &[StateInfo] {
        &self.states
    }

    pub fn controls(&self) -> &[ControlInfo] {
        &self.controls
    }

    pub fn multipliers(&self) -> &[VariableInfo] {
        &self.multipliers
    }

    pub fn derivatives(&self) -> &[VariableInfo] {
        &self.derivatives
    }

    pub fn parameters(&self) -> &[VariableInfo] {
        &self.parameters
    }

    pub fn slacks(&self) -> &[VariableInfo] {
        &self.slacks
    }

    pub fn costs(&self) -> &[CostInfo] {
        &self.costs
    }

    pub fn endpoint_constraints(&self) -> &[EndpointConstraintInfo] {
        &self.endpoint_constraints
    }

    pub fn path_constraints(&self) -> &[PathConstraintInfo] {
        &self.path_constraints
    }

    pub fn kinematic_constraints(&self) -> Option<&KinematicConstraints> {
        self.kinematic_constraints.as_ref()
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    fn count_states(&self, state_type: StateType) -> usize {
        self.states
            .iter()
            .filter(|s| s.state_type == state_type)
            .count()
    }

    pub fn num_coordinates(&self) -> usize {
        self.count_states(StateType::Coordinate)
    }

    pub fn num_speeds(&self) -> usize {
        self.count_states(StateType::Speed)
    }

    pub fn num_auxiliary_states(&self) -> usize {
        self.count_states(StateType::Auxiliary)
    }

    /// Coordinates and speeds.
    pub fn num_multibody_states(&self) -> usize {
        self.num_coordinates() + self.num_speeds()
    }

    pub fn num_controls(&self) -> usize {
        self.controls.len()
    }

    pub fn num_multipliers(&self) -> usize {
        self.multipliers.len()
    }

    pub fn num_derivatives(&self) -> usize {
        self.derivatives.len()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_slacks(&self) -> usize {
        self.slacks.len()
    }

    /// Number of accelerations which are decision variables, i.e. the number of speeds in implicit mode.
    pub fn num_accelerations(&self) -> usize {
        match self.dynamics_mode {
            DynamicsMode::Explicit => 0,
            DynamicsMode::Implicit => self.num_speeds(),
        }
    }

    pub fn num_multibody_residuals(&self) -> usize {
        self.num_accelerations()
    }

    pub fn num_auxiliary_residual_equations(&self) -> usize {
        self.num_auxiliary_residual_equations
    }

    pub fn num_qerr(&self) -> usize {
        self.kinematic_constraints.map_or(0, |kc| kc.num_qerr)
    }

    pub fn num_uerr(&self) -> usize {
        self.kinematic_constraints.map_or(0, |kc| kc.num_uerr)
    }

    pub fn num_udoterr(&self) -> usize {
        self.kinematic_constraints.map_or(0, |kc| kc.num_udoterr)
    }

    pub fn num_kinematic_constraint_equations(&self) -> usize {
        self.num_qerr() + self.num_uerr() + self.num_udoterr()
    }

    pub fn kinematic_constraint_bounds(&self) -> Bounds {
        self.kinematic_constraints
            .map_or(Bounds::fixed(0.0), |kc| kc.bounds)
    }

    pub fn is_kinematic_constraint_method_bordalba2023(&self) -> bool {
        matches!(
            self.kinematic_constraints,
            Some(KinematicConstraints {
                method: KinematicConstraintMethod::Bordalba2023,
                ..
            })
        )
    }

    pub fn is_kinematic_constraint_method_posa2016(&self) -> bool {
        matches!(
            self.kinematic_constraints,
            Some(KinematicConstraints {
                method: KinematicConstraintMethod::Posa2016,
                ..
            })
        )
    }

    /// Number of projection states and projection constraint equations per mesh interval.
    pub fn num_projection_states(&self) -> usize {
        if self.is_kinematic_constraint_method_bordalba2023() {
            self.num_multibody_states()
        } else {
            0
        }
    }

    pub fn num_projection_constraint_equations(&self) -> usize {
        self.num_projection_states()
    }

    pub fn state_names(&self) -> Vec<String> {
        self.states.iter().map(|s| s.name.clone()).collect()
    }

    pub fn control_names(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.name.clone()).collect()
    }

    pub fn multiplier_names(&self) -> Vec<String> {
        self.multipliers.iter().map(|v| v.name.clone()).collect()
    }

    pub fn derivative_names(&self) -> Vec<String> {
        self.derivatives.iter().map(|v| v.name.clone()).collect()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|v| v.name.clone()).collect()
    }

    pub fn slack_names(&self) -> Vec<String> {
        self.slacks.iter().map(|v| v.name.clone()).collect()
    }

    /// Names of the projection states, derived from the multibody state names.
    pub fn projection_state_names(&self) -> Vec<String> {
        self.states
            .iter()
            .take(self.num_projection_states())
            .map(|s| format!("{}/projection", s.name))
            .collect()
    }
}

/// Values of the variables at a single point in time.
#[derive(Clone, Debug)]
pub struct ContinuousInput<'a> {
    pub time: f64,
    pub states: DVectorView<'a, f64>,
    pub controls: DVectorView<'a, f64>,
    pub multipliers: DVectorView<'a, f64>,
    pub derivatives: DVectorView<'a, f64>,
    pub parameters: DVectorView<'a, f64>,
}

/// Values of the variables at the initial and final times, and the integral of the relevant
/// integrand, used to evaluate endpoint costs and constraints.
#[derive(Clone, Debug)]
pub struct EndpointInput<'a> {
    pub initial_time: f64,
    pub initial_states: DVectorView<'a, f64>,
    pub initial_controls: DVectorView<'a, f64>,
    pub initial_multipliers: DVectorView<'a, f64>,
    pub initial_derivatives: DVectorView<'a, f64>,
    pub final_time: f64,
    pub final_states: DVectorView<'a, f64>,
    pub final_controls: DVectorView<'a, f64>,
    pub final_multipliers: DVectorView<'a, f64>,
    pub final_derivatives: DVectorView<'a, f64>,
    pub parameters: DVectorView<'a, f64>,
    pub integral: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultibodySystemExplicitOutput {
    /// Generalized accelerations, one per speed
    pub multibody_derivatives: DVector<f64>,
    /// Time derivatives of the auxiliary states
    pub auxiliary_derivatives: DVector<f64>,
    pub auxiliary_residuals: DVector<f64>,
    /// Position, velocity and acceleration level errors, in that order
    pub kinematic_constraint_errors: DVector<f64>,
}

impl MultibodySystemExplicitOutput {
    /// Allocates an output of the correct size for this problem, filled with zeros.
    pub fn zeros(desc: &ProblemDescription) -> Self {
        Self {
            multibody_derivatives: DVector::zeros(desc.num_speeds()),
            auxiliary_derivatives: DVector::zeros(desc.num_auxiliary_states()),
            auxiliary_residuals: DVector::zeros(desc.num_auxiliary_residual_equations()),
            kinematic_constraint_errors: DVector::zeros(desc.num_kinematic_constraint_equations()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultibodySystemImplicitOutput {
    /// Residuals of the equations of motion, one per speed
    pub multibody_residuals: DVector<f64>,
    pub auxiliary_derivatives: DVector<f64>,
    pub auxiliary_residuals: DVector<f64>,
    pub kinematic_constraint_errors: DVector<f64>,
}

impl MultibodySystemImplicitOutput {
    pub fn zeros(desc: &ProblemDescription) -> Self {
        Self {
            multibody_residuals: DVector::zeros(desc.num_speeds()),
            auxiliary_derivatives: DVector::zeros(desc.num_auxiliary_states()),
            auxiliary_residuals: DVector::zeros(desc.num_auxiliary_residual_equations()),
            kinematic_constraint_errors: DVector::zeros(desc.num_kinematic_constraint_equations()),
        }
    }
}

/// Information provided to a problem once, before the main solve.
#[derive(Clone, Debug)]
pub struct ProblemInitialization<'a> {
    pub finite_difference_scheme: FiniteDifferenceScheme,
    /// Points at which the sparsity pattern of the NLP will be detected (may be empty)
    pub sparsity_samples: &'a [Variables],
}

/// An optimal control problem, as consumed by the transcription.
///
/// All callbacks take `&self` and may be called concurrently from several threads: any mutable
/// evaluation context must be guarded, for example with a [`ThreadsafeJar`] (see [`ModelProblem`]).
/// A callback fails by returning an error, which aborts the current solve.
pub trait Problem: Sync {
    fn description(&self) -> &ProblemDescription;

    fn calc_multibody_system_explicit(
        &self,
        _input: &ContinuousInput,
        _calc_kc_errors: bool,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        Err(CollocationError::callback(
            "calc_multibody_system_explicit",
            "explicit dynamics not provided by this problem",
        ))
    }

    fn calc_multibody_system_implicit(
        &self,
        _input: &ContinuousInput,
        _calc_kc_errors: bool,
    ) -> Result<MultibodySystemImplicitOutput, CollocationError> {
        Err(CollocationError::callback(
            "calc_multibody_system_implicit",
            "implicit dynamics not provided by this problem",
        ))
    }

    /// Correction added to the coordinate derivatives at the Hermite-Simpson midpoints, G^T * slacks.
    fn calc_velocity_correction(
        &self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        _slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::zeros(self.description().num_coordinates()))
    }

    /// Projection of the multibody state onto the constraint manifold, P^T * slacks.
    fn calc_state_projection(
        &self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        _slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::zeros(
            self.description().num_projection_constraint_equations(),
        ))
    }

    fn calc_cost_integrand(
        &self,
        _index: usize,
        _input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(0.0)
    }

    fn calc_cost(
        &self,
        index: usize,
        _input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_cost",
            format!("cost #{index} not provided by this problem"),
        ))
    }

    fn calc_endpoint_constraint_integrand(
        &self,
        _index: usize,
        _input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(0.0)
    }

    fn calc_endpoint_constraint(
        &self,
        index: usize,
        _input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_endpoint_constraint",
            format!("endpoint constraint #{index} not provided by this problem"),
        ))
    }

    fn calc_path_constraint(
        &self,
        index: usize,
        _input: &ContinuousInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_path_constraint",
            format!("path constraint #{index} not provided by this problem"),
        ))
    }

    /// Called once before the main solve with the sparsity detection samples.
    fn initialize(&self, _init: &ProblemInitialization) -> Result<(), CollocationError> {
        Ok(())
    }

    /// Called once per iteration of the NLP solver, with the current iterate if requested by the
    /// solver's output interval. Returning an error aborts the solve.
    fn intermediate_callback(&self, _iterate: Option<&Iterate>) -> Result<(), CollocationError> {
        Ok(())
    }
}
