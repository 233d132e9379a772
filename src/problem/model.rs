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

use super::{
    ContinuousInput, EndpointInput, MultibodySystemExplicitOutput, MultibodySystemImplicitOutput,
    Problem, ProblemDescription, ProblemInitialization, ThreadsafeJar,
};
use crate::errors::{CollocationError, DescriptionSnafu};
use crate::iterate::Iterate;
use snafu::ensure;
use crate::linalg::{DVector, DVectorView};

/// A stateful evaluator of the dynamics, costs and constraints of a problem.
///
/// Implementors may keep scratch buffers or caches in `self`: a [`ModelProblem`] hands each
/// concurrent evaluation its own instance, so no synchronization is required here.
pub trait DynamicsModel: Send {
    fn calc_multibody_system_explicit(
        &mut self,
        _input: &ContinuousInput,
        _calc_kc_errors: bool,
        _desc: &ProblemDescription,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        Err(CollocationError::callback(
            "calc_multibody_system_explicit",
            "explicit dynamics not provided by this model",
        ))
    }

    fn calc_multibody_system_implicit(
        &mut self,
        _input: &ContinuousInput,
        _calc_kc_errors: bool,
        _desc: &ProblemDescription,
    ) -> Result<MultibodySystemImplicitOutput, CollocationError> {
        Err(CollocationError::callback(
            "calc_multibody_system_implicit",
            "implicit dynamics not provided by this model",
        ))
    }

    fn calc_velocity_correction(
        &mut self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        _slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
        desc: &ProblemDescription,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::zeros(desc.num_coordinates()))
    }

    fn calc_state_projection(
        &mut self,
        _time: f64,
        _multibody_states: DVectorView<f64>,
        _slacks: DVectorView<f64>,
        _parameters: DVectorView<f64>,
        desc: &ProblemDescription,
    ) -> Result<DVector<f64>, CollocationError> {
        Ok(DVector::zeros(desc.num_projection_constraint_equations()))
    }

    fn calc_cost_integrand(
        &mut self,
        _index: usize,
        _input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(0.0)
    }

    fn calc_cost(
        &mut self,
        index: usize,
        _input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_cost",
            format!("cost #{index} not provided by this model"),
        ))
    }

    fn calc_endpoint_constraint_integrand(
        &mut self,
        _index: usize,
        _input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        Ok(0.0)
    }

    fn calc_endpoint_constraint(
        &mut self,
        index: usize,
        _input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_endpoint_constraint",
            format!("endpoint constraint #{index} not provided by this model"),
        ))
    }

    fn calc_path_constraint(
        &mut self,
        index: usize,
        _input: &ContinuousInput,
    ) -> Result<DVector<f64>, CollocationError> {
        Err(CollocationError::callback(
            "calc_path_constraint",
            format!("path constraint #{index} not provided by this model"),
        ))
    }
}

type IterationHook = Box<dyn Fn(Option<&Iterate>) -> Result<(), CollocationError> + Send + Sync>;

/// A [`Problem`] backed by a pool of [`DynamicsModel`] instances: every callback checks out one
/// instance from the jar for the duration of the evaluation.
pub struct ModelProblem<M: DynamicsModel> {
    description: ProblemDescription,
    jar: ThreadsafeJar<M>,
    on_iteration: Option<IterationHook>,
}

impl<M: DynamicsModel> ModelProblem<M> {
    /// Builds a problem whose jar lazily constructs up to `max_instances` models. Use the number
    /// of threads of the solver for `max_instances`.
    pub fn new<F>(
        description: ProblemDescription,
        max_instances: usize,
        factory: F,
    ) -> Result<Self, CollocationError>
    where
        F: Fn() -> Result<M, CollocationError> + Send + Sync + 'static,
    {
        description.validate()?;
        Ok(Self {
            description,
            jar: ThreadsafeJar::with_factory(max_instances, factory),
            on_iteration: None,
        })
    }

    /// Builds a problem from already constructed models.
    pub fn from_models(
        description: ProblemDescription,
        models: Vec<M>,
    ) -> Result<Self, CollocationError> {
        description.validate()?;
        ensure!(
            !models.is_empty(),
            DescriptionSnafu {
                msg: "at least one model is required"
            }
        );
        let jar = ThreadsafeJar::new();
        for model in models {
            jar.leave(model);
        }
        Ok(Self {
            description,
            jar,
            on_iteration: None,
        })
    }

    /// Sets a hook called once per NLP iteration, which may abort the solve by returning an error.
    pub fn with_iteration_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Iterate>) -> Result<(), CollocationError> + Send + Sync + 'static,
    {
        self.on_iteration = Some(Box::new(hook));
        self
    }

    pub fn jar(&self) -> &ThreadsafeJar<M> {
        &self.jar
    }
}

impl<M: DynamicsModel> Problem for ModelProblem<M> {
    fn description(&self) -> &ProblemDescription {
        &self.description
    }

    fn calc_multibody_system_explicit(
        &self,
        input: &ContinuousInput,
        calc_kc_errors: bool,
    ) -> Result<MultibodySystemExplicitOutput, CollocationError> {
        self.jar
            .take()?
            .calc_multibody_system_explicit(input, calc_kc_errors, &self.description)
    }

    fn calc_multibody_system_implicit(
        &self,
        input: &ContinuousInput,
        calc_kc_errors: bool,
    ) -> Result<MultibodySystemImplicitOutput, CollocationError> {
        self.jar
            .take()?
            .calc_multibody_system_implicit(input, calc_kc_errors, &self.description)
    }

    fn calc_velocity_correction(
        &self,
        time: f64,
        multibody_states: DVectorView<f64>,
        slacks: DVectorView<f64>,
        parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        self.jar.take()?.calc_velocity_correction(
            time,
            multibody_states,
            slacks,
            parameters,
            &self.description,
        )
    }

    fn calc_state_projection(
        &self,
        time: f64,
        multibody_states: DVectorView<f64>,
        slacks: DVectorView<f64>,
        parameters: DVectorView<f64>,
    ) -> Result<DVector<f64>, CollocationError> {
        self.jar.take()?.calc_state_projection(
            time,
            multibody_states,
            slacks,
            parameters,
            &self.description,
        )
    }

    fn calc_cost_integrand(
        &self,
        index: usize,
        input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        self.jar.take()?.calc_cost_integrand(index, input)
    }

    fn calc_cost(
        &self,
        index: usize,
        input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        self.jar.take()?.calc_cost(index, input)
    }

    fn calc_endpoint_constraint_integrand(
        &self,
        index: usize,
        input: &ContinuousInput,
    ) -> Result<f64, CollocationError> {
        self.jar.take()?.calc_endpoint_constraint_integrand(index, input)
    }

    fn calc_endpoint_constraint(
        &self,
        index: usize,
        input: &EndpointInput,
    ) -> Result<DVector<f64>, CollocationError> {
        self.jar.take()?.calc_endpoint_constraint(index, input)
    }

    fn calc_path_constraint(
        &self,
        index: usize,
        input: &ContinuousInput,
    ) -> Result<DVector<f64>, CollocationError> {
        self.jar.take()?.calc_path_constraint(index, input)
    }

    fn initialize(&self, init: &ProblemInitialization) -> Result<(), CollocationError> {
        debug!(
            "model problem initialized with {} sparsity samples and {} finite differences",
            init.sparsity_samples.len(),
            init.finite_difference_scheme
        );
        Ok(())
    }

    fn intermediate_callback(&self, iterate: Option<&Iterate>) -> Result<(), CollocationError> {
        match &self.on_iteration {
            Some(hook) => hook(iterate),
            None => Ok(()),
        }
    }
}
