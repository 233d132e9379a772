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
    FiniteDifferenceScheme, HessianApproximation, IterationCallback, IterationInfo, NlpBounds,
    NlpOutcome, NlpProblem, NlpSolver, NlpSparsity, SparsityPattern,
};
use crate::errors::{AbortedSnafu, CollocationError, NlpSnafu};
use crate::linalg::{DMatrix, DVector};
use nalgebra::Cholesky;
use snafu::{ensure, ResultExt};
use typed_builder::TypedBuilder;

/// Multipliers smaller than this are considered zero when releasing inequalities.
const MULTIPLIER_THRESHOLD: f64 = 1e-10;
/// Armijo sufficient decrease factor of the line search.
const ARMIJO: f64 = 1e-4;

/// Clamps without panicking on infinite or NaN bounds.
pub(crate) fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

/// Sum and maximum of the violations of the bounds.
fn violation(values: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> (f64, f64) {
    values
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(v, (l, u))| (l - v).max(v - u).max(0.0))
        .fold((0.0, 0.0), |(sum, max), viol| (sum + viol, max.max(viol)))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Equality,
    Lower,
    Upper,
}

/// A constraint or variable bound of the working set.
#[derive(Copy, Clone, Debug)]
struct Active {
    index: usize,
    on_variable: bool,
    target: f64,
    side: Side,
}

/// A dense active-set sequential quadratic programming solver, with finite difference derivatives.
///
/// At each iteration, the equality constraints and the inequalities and variable bounds which
/// are active or violated form the working set of an equality constrained quadratic program,
/// solved through its KKT system. Inequalities whose multiplier has the wrong sign are released
/// and the QP is solved again. The step is then scaled by a backtracking line search on the l1
/// merit function and projected onto the variable bounds.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(doc)]
pub struct SqpSolver {
    /// Maximum number of iterations
    #[builder(default = 100)]
    pub max_iterations: usize,
    /// Convergence tolerance on the largest component of the gradient of the Lagrangian
    #[builder(default = 1e-6)]
    pub convergence_tolerance: f64,
    /// Largest acceptable constraint violation
    #[builder(default = 1e-6)]
    pub constraint_tolerance: f64,
    #[builder(default)]
    pub hessian: HessianApproximation,
    #[builder(default)]
    pub finite_differences: FiniteDifferenceScheme,
    /// Maximum number of step halvings per line search
    #[builder(default = 40)]
    pub max_line_search_steps: usize,
}

impl Default for SqpSolver {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SqpSolver {
    fn gradient(&self, nlp: &dyn NlpProblem, x: &DVector<f64>, f0: f64) -> Result<DVector<f64>, CollocationError> {
        self.finite_differences
            .gradient(|y| nlp.objective(y), x, f0)
    }

    fn jacobian(
        &self,
        nlp: &dyn NlpProblem,
        x: &DVector<f64>,
        g0: &DVector<f64>,
        sparsity: &SparsityPattern,
    ) -> Result<DMatrix<f64>, CollocationError> {
        self.finite_differences
            .jacobian(|y| nlp.constraints(y), x, g0, sparsity)
    }

    /// Gradient of f + multipliers^T g.
    fn lagrangian_gradient(
        &self,
        nlp: &dyn NlpProblem,
        x: &DVector<f64>,
        multipliers: &DVector<f64>,
        sparsity: &SparsityPattern,
    ) -> Result<DVector<f64>, CollocationError> {
        let grad = self.gradient(nlp, x, nlp.objective(x)?)?;
        let jac = self.jacobian(nlp, x, &nlp.constraints(x)?, sparsity)?;
        Ok(grad + jac.tr_mul(multipliers))
    }

    /// Columns of the same color of the Hessian pattern are perturbed together.
    fn lagrangian_hessian(
        &self,
        nlp: &dyn NlpProblem,
        x: &DVector<f64>,
        multipliers: &DVector<f64>,
        sparsity: &NlpSparsity,
    ) -> Result<DMatrix<f64>, CollocationError> {
        let grad0 = self.lagrangian_gradient(nlp, x, multipliers, &sparsity.jacobian)?;
        let hess = self.finite_differences.jacobian(
            |y| self.lagrangian_gradient(nlp, y, multipliers, &sparsity.jacobian),
            x,
            &grad0,
            &sparsity.hessian,
        )?;
        Ok((&hess + hess.transpose()) * 0.5)
    }

    /// Shifts the diagonal of the Hessian until it is positive definite.
    fn convexify(hess: DMatrix<f64>) -> DMatrix<f64> {
        if hess.is_empty() || Cholesky::new(hess.clone()).is_some() {
            return hess;
        }
        let n = hess.nrows();
        let scale = hess.amax().max(1.0);
        let mut shift = 1e-8 * scale;
        for _ in 0..20 {
            let shifted = &hess + DMatrix::identity(n, n) * shift;
            if Cholesky::new(shifted.clone()).is_some() {
                trace!("Hessian shifted by {shift:.3e}");
                return shifted;
            }
            shift *= 10.0;
        }
        warn!("could not convexify the Hessian, using a scaled identity");
        DMatrix::identity(n, n) * scale
    }

    fn working_set(
        &self,
        x: &DVector<f64>,
        g: &DVector<f64>,
        bounds: &NlpBounds,
    ) -> Vec<Active> {
        let tol = self.constraint_tolerance;
        let mut working = Vec::new();
        let mut classify = |index: usize, on_variable: bool, value: f64, lower: f64, upper: f64| {
            let active = if lower == upper {
                Some((lower, Side::Equality))
            } else if value <= lower + tol {
                Some((lower, Side::Lower))
            } else if value >= upper - tol {
                Some((upper, Side::Upper))
            } else {
                None
            };
            if let Some((target, side)) = active {
                working.push(Active {
                    index,
                    on_variable,
                    target,
                    side,
                });
            }
        };
        for i in 0..g.len() {
            classify(i, false, g[i], bounds.g_lower[i], bounds.g_upper[i]);
        }
        for j in 0..x.len() {
            classify(j, true, x[j], bounds.x_lower[j], bounds.x_upper[j]);
        }
        working
    }

    /// Solves the KKT system with LU, regularizing it if it is singular.
    fn solve_kkt(
        kkt: &DMatrix<f64>,
        rhs: &DVector<f64>,
        n: usize,
    ) -> Result<DVector<f64>, CollocationError> {
        let size = kkt.nrows();
        let mut delta = 0.0;
        for attempt in 0..6 {
            let mut system = kkt.clone();
            if attempt > 0 {
                delta = if delta == 0.0 { 1e-10 } else { delta * 100.0 };
                for i in 0..size {
                    system[(i, i)] += if i < n { delta } else { -delta };
                }
            }
            if let Some(sol) = system.lu().solve(rhs) {
                if sol.iter().all(|v| v.is_finite()) {
                    if attempt > 0 {
                        debug!("KKT system regularized with {delta:.1e}");
                    }
                    return Ok(sol);
                }
            }
        }
        NlpSnafu {
            msg: format!("singular KKT system of size {size}"),
        }
        .fail()
    }

    /// Solves the quadratic program of the current iteration, returning the step and the
    /// multipliers of the constraints and of the variable bounds.
    #[allow(clippy::type_complexity)]
    fn solve_qp(
        &self,
        hess: &DMatrix<f64>,
        grad: &DVector<f64>,
        jac: &DMatrix<f64>,
        g: &DVector<f64>,
        x: &DVector<f64>,
        bounds: &NlpBounds,
    ) -> Result<(DVector<f64>, DVector<f64>, DVector<f64>), CollocationError> {
        let n = x.len();
        let m = g.len();
        let tol = self.constraint_tolerance;
        let mut working = self.working_set(x, g, bounds);

        for _ in 0..=(n + m) {
            let k = working.len();
            let mut kkt = DMatrix::zeros(n + k, n + k);
            kkt.view_mut((0, 0), (n, n)).copy_from(hess);
            let mut rhs = DVector::zeros(n + k);
            rhs.rows_mut(0, n).copy_from(&(-grad));
            for (r, active) in working.iter().enumerate() {
                if active.on_variable {
                    kkt[(n + r, active.index)] = 1.0;
                    kkt[(active.index, n + r)] = 1.0;
                    rhs[n + r] = active.target - x[active.index];
                } else {
                    for j in 0..n {
                        let value = jac[(active.index, j)];
                        kkt[(n + r, j)] = value;
                        kkt[(j, n + r)] = value;
                    }
                    rhs[n + r] = active.target - g[active.index];
                }
            }

            let sol = Self::solve_kkt(&kkt, &rhs, n)?;

            // Release the satisfied inequalities whose multiplier pulls the step inside
            let keep: Vec<bool> = working
                .iter()
                .enumerate()
                .map(|(r, active)| {
                    let nu = sol[n + r];
                    let current = if active.on_variable {
                        x[active.index]
                    } else {
                        g[active.index]
                    };
                    match active.side {
                        Side::Equality => true,
                        Side::Lower => !(nu > MULTIPLIER_THRESHOLD && current >= active.target - tol),
                        Side::Upper => !(nu < -MULTIPLIER_THRESHOLD && current <= active.target + tol),
                    }
                })
                .collect();

            if keep.iter().all(|k| *k) {
                let step = sol.rows(0, n).into_owned();
                let mut nu_g = DVector::zeros(m);
                let mut nu_x = DVector::zeros(n);
                for (r, active) in working.iter().enumerate() {
                    if active.on_variable {
                        nu_x[active.index] = sol[n + r];
                    } else {
                        nu_g[active.index] = sol[n + r];
                    }
                }
                return Ok((step, nu_g, nu_x));
            }

            working = working
                .into_iter()
                .zip(keep)
                .filter_map(|(active, keep)| keep.then_some(active))
                .collect();
        }

        NlpSnafu {
            msg: "active set of the quadratic program did not settle",
        }
        .fail()
    }

    fn project(x: &DVector<f64>, bounds: &NlpBounds) -> DVector<f64> {
        DVector::from_fn(x.len(), |j, _| {
            clamp(x[j], bounds.x_lower[j], bounds.x_upper[j])
        })
    }
}

impl NlpSolver for SqpSolver {
    fn solve(
        &self,
        nlp: &dyn NlpProblem,
        x0: &DVector<f64>,
        sparsity: &NlpSparsity,
        callback: &mut dyn IterationCallback,
    ) -> Result<NlpOutcome, CollocationError> {
        let n = nlp.num_variables();
        let m = nlp.num_constraints();
        let bounds = nlp.bounds();
        ensure!(
            x0.len() == n,
            NlpSnafu {
                msg: format!("initial guess has {} variables instead of {n}", x0.len())
            }
        );
        ensure!(
            sparsity.jacobian.num_rows() == m && sparsity.jacobian.num_cols() == n,
            NlpSnafu {
                msg: format!(
                    "sparsity pattern is {}x{} but the Jacobian is {m}x{n}",
                    sparsity.jacobian.num_rows(),
                    sparsity.jacobian.num_cols()
                )
            }
        );
        ensure!(
            sparsity.hessian.num_rows() == n && sparsity.hessian.num_cols() == n,
            NlpSnafu {
                msg: format!(
                    "Hessian pattern is {}x{} but there are {n} variables",
                    sparsity.hessian.num_rows(),
                    sparsity.hessian.num_cols()
                )
            }
        );

        info!(
            "SQP solver: {n} variables, {m} constraints, {} Jacobian colors, {} Hessian ({} colors)",
            sparsity.jacobian.num_colors(),
            self.hessian,
            sparsity.hessian.num_colors()
        );

        let mut x = Self::project(x0, bounds);
        let mut f = nlp.objective(&x)?;
        ensure!(
            f.is_finite(),
            NlpSnafu {
                msg: "objective is not finite at the initial guess"
            }
        );
        let mut g = nlp.constraints(&x)?;
        let mut grad = self.gradient(nlp, &x, f)?;
        let mut jac = self.jacobian(nlp, &x, &g, &sparsity.jacobian)?;
        let mut nu_g = DVector::zeros(m);
        let mut nu_x = DVector::zeros(n);
        let mut bfgs = DMatrix::identity(n, n);
        let mut penalty: f64 = 1.0;

        let outcome = |x: DVector<f64>,
                       f: f64,
                       g: DVector<f64>,
                       nu_g: DVector<f64>,
                       nu_x: DVector<f64>,
                       iterations: usize,
                       success: bool,
                       message: &str| NlpOutcome {
            x,
            objective: f,
            constraints: g,
            constraint_multipliers: nu_g,
            bound_multipliers: nu_x,
            iterations,
            success,
            message: message.to_string(),
        };

        for iteration in 0..self.max_iterations {
            let (_, infeasibility) = violation(&g, &bounds.g_lower, &bounds.g_upper);
            let optimality = (&grad + jac.tr_mul(&nu_g) + &nu_x).amax();

            info!(
                "iteration {iteration:>3}: objective = {f:.6e}, infeasibility = {infeasibility:.3e}, optimality = {optimality:.3e}"
            );
            callback
                .on_iteration(&IterationInfo {
                    iteration,
                    x: &x,
                    objective: f,
                    infeasibility,
                    optimality,
                })
                .context(AbortedSnafu { iteration })?;

            if infeasibility <= self.constraint_tolerance && optimality <= self.convergence_tolerance
            {
                info!("SQP converged after {iteration} iterations");
                return Ok(outcome(x, f, g, nu_g, nu_x, iteration, true, "converged"));
            }

            let hess = match self.hessian {
                HessianApproximation::Exact => {
                    Self::convexify(self.lagrangian_hessian(nlp, &x, &nu_g, sparsity)?)
                }
                HessianApproximation::Bfgs => bfgs.clone(),
            };

            let (step, new_nu_g, new_nu_x) = self.solve_qp(&hess, &grad, &jac, &g, &x, bounds)?;

            // l1 merit line search
            penalty = penalty.max(1.1 * new_nu_g.amax() + 1e-3);
            let (l1, _) = violation(&g, &bounds.g_lower, &bounds.g_upper);
            let merit = f + penalty * l1;
            let slope = grad.dot(&step) - penalty * l1;
            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..self.max_line_search_steps {
                let trial = Self::project(&(&x + &step * alpha), bounds);
                let f_trial = nlp.objective(&trial)?;
                let g_trial = nlp.constraints(&trial)?;
                let (l1_trial, _) = violation(&g_trial, &bounds.g_lower, &bounds.g_upper);
                let merit_trial = f_trial + penalty * l1_trial;
                if merit_trial.is_finite()
                    && merit_trial <= merit + ARMIJO * alpha * slope.min(0.0)
                {
                    accepted = Some((trial, f_trial, g_trial));
                    break;
                }
                alpha *= 0.5;
            }
            let (trial, f_trial, g_trial) = match accepted {
                Some(accepted) => accepted,
                None => {
                    warn!("line search failed at iteration {iteration}, taking a short step");
                    let trial = Self::project(&(&x + &step * alpha), bounds);
                    let f_trial = nlp.objective(&trial)?;
                    let g_trial = nlp.constraints(&trial)?;
                    (trial, f_trial, g_trial)
                }
            };
            debug!("step length {alpha:.3e}, merit penalty {penalty:.3e}");

            let new_grad = self.gradient(nlp, &trial, f_trial)?;
            let new_jac = self.jacobian(nlp, &trial, &g_trial, &sparsity.jacobian)?;

            if self.hessian == HessianApproximation::Bfgs {
                let s = &trial - &x;
                let y = (&new_grad + new_jac.tr_mul(&new_nu_g)) - (&grad + jac.tr_mul(&new_nu_g));
                let bs = &bfgs * &s;
                let sbs = s.dot(&bs);
                if sbs > f64::EPSILON {
                    // Powell's damping keeps the update positive definite
                    let sy = s.dot(&y);
                    let r = if sy >= 0.2 * sbs {
                        y
                    } else {
                        let theta = 0.8 * sbs / (sbs - sy);
                        &y * theta + &bs * (1.0 - theta)
                    };
                    let sr = s.dot(&r);
                    if sr > f64::EPSILON {
                        bfgs = &bfgs - (&bs * bs.transpose()) / sbs + (&r * r.transpose()) / sr;
                    }
                }
            }

            x = trial;
            f = f_trial;
            g = g_trial;
            grad = new_grad;
            jac = new_jac;
            nu_g = new_nu_g;
            nu_x = new_nu_x;
        }

        let (_, infeasibility) = violation(&g, &bounds.g_lower, &bounds.g_upper);
        warn!(
            "SQP did not converge in {} iterations (infeasibility = {infeasibility:.3e})",
            self.max_iterations
        );
        Ok(outcome(
            x,
            f,
            g,
            nu_g,
            nu_x,
            self.max_iterations,
            false,
            "maximum number of iterations reached",
        ))
    }
}
