extern crate nyx_collocation as nyx;

mod collocation;

use nyx::linalg::{DMatrix, DVector, DVectorView};
use nyx::problem::{
    ContinuousInput, DynamicsMode, EndpointInput, KinematicConstraintMethod, KinematicConstraints,
    MultibodySystemExplicitOutput, MultibodySystemImplicitOutput, StateType,
};
use nyx::{Bounds, CollocationError, Problem, ProblemDescription};
use nyx::{Iterate, Var, Variables};
use std::sync::Mutex;

fn bounds(lower: f64, upper: f64) -> Bounds {
    Bounds::new(lower, upper).unwrap()
}

/// A guess sampled at the initial and final times only, moving linearly from the initial to the
/// final states with zero controls.
pub fn linear_guess(desc: &ProblemDescription, duration: f64, initial: &[f64], final_: &[f64]) -> Iterate {
    let mut variables = Variables::new();
    variables.insert(Var::InitialTime, DMatrix::from_element(1, 1, 0.0));
    variables.insert(Var::FinalTime, DMatrix::from_element(1, 1, duration));
    variables.insert(
        Var::States,
        DMatrix::from_fn(desc.num_states(), 2, |r, c| if c == 0 { initial[r] } else { final_[r] }),
    );
    variables.insert(Var::Controls, DMatrix::zeros(desc.num_controls(), 2));
    variables.insert(Var::Multipliers, DMatrix::zeros(desc.num_multipliers(), 2));
    variables.insert(Var::Derivatives, DMatrix::zeros(desc.num_derivatives(), 2));
    Iterate {
        variables,
        times: DVector::from_row_slice(&[0.0, duration]),
        state_names: desc.state_names(),
        control_names: desc.control_names(),
        multiplier_names: desc.multiplier_names(),
        derivative_names: desc.derivative_names(),
        ..Default::default()
    }
}

/// A problem which only provides its description, used to check the layout of transcriptions.
pub struct DescriptionOnly(pub ProblemDescription);

impl Problem for DescriptionOnly {
    fn description(&self) -> &ProblemDescription {
        &self.0
    }
}

/// Single integrator x' = u steered from x(0) = 0 to x(1) = 1 while minimizing the integral of
/// u^2. The optimal control is u = 1 and the optimal cost is 1.
pub struct MinimumEffort {
    desc: ProblemDescription,
    /// Iteration of the iterate received by each intermediate callback, if any
    pub seen: Mutex<Vec<Option<usize>>>,
    /// Aborts the solve once this many iterations have been seen
    pub abort_after: Option<usize>,
}

impl MinimumEffort {
    pub fn new() -> Self {
        let mut desc = ProblemDescription::new();
        desc.set_time_bounds(Bounds::fixed(0.0), Bounds::fixed(1.0));
        desc.add_state(
            "x",
            StateType::Auxiliary,
            bounds(-10.0, 10.0),
            Bounds::fixed(0.0),
            Bounds::fixed(1.0),
        )
        .unwrap();
        desc.add_control("u", bounds(-10.0, 10.0), Bounds::unset(), Bounds::unset());
        desc.add_cost("effort", 1, true);
        Self {
            desc,
            seen: Mutex::new(Vec::new()),
            abort_after: None,
        }
    }
}

impl Problem for MinimumEffort {
    fn description(&self) -> &ProblemDescription {
        &self.desc
    }

    fn calc_multibody_system_explicit(
        &self,
        input: &ContinuousInput,
        _calc_kc_errors: bool,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        let mut out = MultibodySystemExplicitOutput::zeros(&self.desc);
        out.auxiliary_derivatives[0] = input.controls[0];
        Ok(out)
    }

    fn calc_cost_integrand(
        &self,
        _index: usize,
        input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(input.controls[0].powi(2))
    }

    fn calc_cost(
        &self,
        _index: usize,
        input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::from_element(1, input.integral))
    }

    fn intermediate_callback(&self, iterate: Option<&Iterate>) -> Result<(), CollocationError> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(iterate.and_then(|it| it.iteration));
        match self.abort_after {
            Some(limit) if seen.len() >= limit => Err(CollocationError::callback(
                "intermediate_callback",
                "stopped by the user",
            )),
            _ => Ok(()),
        }
    }
}

/// Rest-to-rest double integrator q'' = F over one second, from q = 0 to q = 1, minimizing the
/// integral of F^2. The optimal force is F = 6 - 12 t and the optimal cost is 12.
pub struct DoubleIntegrator {
    desc: ProblemDescription,
}

impl DoubleIntegrator {
    /// The same problem with the acceleration as a decision variable and the equation of motion
    /// as a residual.
    pub fn implicit() -> Self {
        let mut problem = Self::new();
        problem.desc.set_dynamics_mode(DynamicsMode::Implicit);
        problem.desc.add_derivative("/slider/accel", bounds(-100.0, 100.0));
        problem
    }

    pub fn new() -> Self {
        let mut desc = ProblemDescription::new();
        desc.set_time_bounds(Bounds::fixed(0.0), Bounds::fixed(1.0));
        desc.add_state(
            "/slider/q",
            StateType::Coordinate,
            bounds(-5.0, 5.0),
            Bounds::fixed(0.0),
            Bounds::fixed(1.0),
        )
        .unwrap();
        desc.add_state(
            "/slider/u",
            StateType::Speed,
            bounds(-5.0, 5.0),
            Bounds::fixed(0.0),
            Bounds::fixed(0.0),
        )
        .unwrap();
        desc.add_control("/force", bounds(-50.0, 50.0), Bounds::unset(), Bounds::unset());
        desc.add_cost("effort", 1, true);
        Self { desc }
    }
}

impl Problem for DoubleIntegrator {
    fn description(&self) -> &ProblemDescription {
        &self.desc
    }

    fn calc_multibody_system_explicit(
        &self,
        input: &ContinuousInput,
        _calc_kc_errors: bool,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        let mut out = MultibodySystemExplicitOutput::zeros(&self.desc);
        out.multibody_derivatives[0] = input.controls[0];
        Ok(out)
    }

    fn calc_multibody_system_implicit(
        &self,
        input: &ContinuousInput,
        _calc_kc_errors: bool,
    ) -> Result<MultibodySystemImplicitOutput, CollocationError> {
        let mut out = MultibodySystemImplicitOutput::zeros(&self.desc);
        out.multibody_residuals[0] = input.derivatives[0] - input.controls[0];
        Ok(out)
    }

    fn calc_cost_integrand(
        &self,
        _index: usize,
        input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(input.controls[0].powi(2))
    }

    fn calc_cost(
        &self,
        _index: usize,
        input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::from_element(1, input.integral))
    }
}

/// A point mass held at the origin by a constraint force: q = 0 with the multiplier lambda
/// acting against the applied force. The position, velocity and acceleration errors are
/// q, u and u', and the constraint Jacobian is one.
pub struct ConstrainedPoint {
    desc: ProblemDescription,
}

impl ConstrainedPoint {
    pub fn new(method: KinematicConstraintMethod) -> Self {
        let mut desc = ProblemDescription::new();
        desc.set_time_bounds(Bounds::fixed(0.0), bounds(0.5, 2.0));
        for (name, kind) in [("q", StateType::Coordinate), ("u", StateType::Speed)] {
            desc.add_state(name, kind, bounds(-1.0, 1.0), Bounds::unset(), Bounds::unset())
                .unwrap();
        }
        desc.add_control("f", bounds(-2.0, 2.0), Bounds::unset(), Bounds::unset());
        desc.add_multiplier("lambda", bounds(-5.0, 5.0));
        desc.add_slack("gamma_q", bounds(-1.0, 1.0));
        desc.add_slack("gamma_u", bounds(-1.0, 1.0));
        desc.set_kinematic_constraints(KinematicConstraints {
            num_qerr: 1,
            num_uerr: 1,
            num_udoterr: 1,
            method,
            bounds: Bounds::fixed(0.0),
        });
        desc.add_path_constraint("force_limit", vec![bounds(-1.0, 1.0)]);
        Self { desc }
    }
}

impl Problem for ConstrainedPoint {
    fn description(&self) -> &ProblemDescription {
        &self.desc
    }

    fn calc_multibody_system_explicit(
        &self,
        input: &ContinuousInput,
        calc_kc_errors: bool,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        let mut out = MultibodySystemExplicitOutput::zeros(&self.desc);
        let udot = input.controls[0] - input.multipliers[0];
        out.multibody_derivatives[0] = udot;
        if calc_kc_errors {
            out.kinematic_constraint_errors[0] = input.states[0];
            out.kinematic_constraint_errors[1] = input.states[1];
            out.kinematic_constraint_errors[2] = udot;
        }
        Ok(out)
    }

    fn calc_velocity_correction(
        &self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::from_element(1, slacks[0]))
    }

    fn calc_state_projection(
        &self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::from_row_slice(&[slacks[0], slacks[1]]))
    }

    fn calc_path_constraint(
        &self,
        _index: usize,
        input: &ContinuousInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::from_element(1, input.controls[0]))
    }
}
