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

use super::SparsityPattern;
use crate::errors::CollocationError;
use crate::linalg::{DMatrix, DVector};
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Finite difference scheme used to compute the derivatives of the NLP functions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiniteDifferenceScheme {
    #[default]
    Central,
    Forward,
    Backward,
}

impl FiniteDifferenceScheme {
    /// Perturbation applied to a variable of value `x`.
    pub fn step(&self, x: f64) -> f64 {
        let base = match self {
            Self::Central => f64::EPSILON.cbrt(),
            Self::Forward | Self::Backward => f64::EPSILON.sqrt(),
        };
        base * (1.0 + x.abs())
    }

    /// Perturbed copies of x (after, before) for the provided columns and their steps. The
    /// unperturbed side is `None`.
    fn perturb(
        &self,
        x: &DVector<f64>,
        columns: &[usize],
    ) -> (Option<DVector<f64>>, Option<DVector<f64>>, Vec<f64>) {
        let steps: Vec<f64> = columns.iter().map(|j| self.step(x[*j])).collect();
        let shifted = |sign: f64| {
            let mut y = x.clone();
            for (j, h) in columns.iter().zip(&steps) {
                y[*j] += sign * h;
            }
            y
        };
        match self {
            Self::Central => (Some(shifted(1.0)), Some(shifted(-1.0)), steps),
            Self::Forward => (Some(shifted(1.0)), None, steps),
            Self::Backward => (None, Some(shifted(-1.0)), steps),
        }
    }

    fn denominator(&self, step: f64) -> f64 {
        match self {
            Self::Central => 2.0 * step,
            Self::Forward | Self::Backward => step,
        }
    }

    /// Gradient of a scalar function, each component computed in parallel. `f0` is the value at
    /// x, used by the one sided schemes.
    pub fn gradient<F>(&self, f: F, x: &DVector<f64>, f0: f64) -> Result<DVector<f64>, CollocationError>
    where
        F: Fn(&DVector<f64>) -> Result<f64, CollocationError> + Sync,
    {
        let mut components: Vec<(usize, f64)> = (0..x.len()).map(|j| (j, 0.0)).collect();
        components
            .par_iter_mut()
            .map(|(j, value)| {
                let (after, before, steps) = self.perturb(x, &[*j]);
                let f_after = match &after {
                    Some(y) => f(y)?,
                    None => f0,
                };
                let f_before = match &before {
                    Some(y) => f(y)?,
                    None => f0,
                };
                *value = (f_after - f_before) / self.denominator(steps[0]);
                Ok(())
            })
            .collect::<Result<Vec<()>, CollocationError>>()?;
        Ok(DVector::from_iterator(
            x.len(),
            components.into_iter().map(|(_, value)| value),
        ))
    }

    /// Jacobian of a vector function, evaluated by perturbing each color group of the sparsity
    /// pattern at once. Entries outside of the pattern are zero. `g0` is the value at x, used by
    /// the one sided schemes.
    pub fn jacobian<F>(
        &self,
        g: F,
        x: &DVector<f64>,
        g0: &DVector<f64>,
        pattern: &SparsityPattern,
    ) -> Result<DMatrix<f64>, CollocationError>
    where
        F: Fn(&DVector<f64>) -> Result<DVector<f64>, CollocationError> + Sync,
    {
        let entries = pattern
            .colors()
            .par_iter()
            .map(|group| {
                let (after, before, steps) = self.perturb(x, group);
                let g_after = match &after {
                    Some(y) => g(y)?,
                    None => g0.clone(),
                };
                let g_before = match &before {
                    Some(y) => g(y)?,
                    None => g0.clone(),
                };
                let mut entries = Vec::new();
                for (j, h) in group.iter().zip(steps) {
                    for &i in pattern.column(*j) {
                        entries.push((i, *j, (g_after[i] - g_before[i]) / self.denominator(h)));
                    }
                }
                Ok(entries)
            })
            .collect::<Result<Vec<_>, CollocationError>>()?;

        let mut jac = DMatrix::zeros(pattern.num_rows(), pattern.num_cols());
        for (i, j, value) in entries.into_iter().flatten() {
            jac[(i, j)] = value;
        }
        Ok(jac)
    }
}

impl FromStr for FiniteDifferenceScheme {
    type Err = CollocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "central" => Ok(Self::Central),
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            _ => Err(CollocationError::Config {
                setting: "finite_difference_scheme",
                msg: format!("`{s}` is not one of central, forward or backward"),
            }),
        }
    }
}

impl fmt::Display for FiniteDifferenceScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Central => write!(f, "central"),
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

#[cfg(test)]
mod ut_finite_diff {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(FiniteDifferenceScheme::Central, 1e-9)]
    #[case(FiniteDifferenceScheme::Forward, 1e-6)]
    #[case(FiniteDifferenceScheme::Backward, 1e-6)]
    fn gradient_of_quadratic(#[case] scheme: FiniteDifferenceScheme, #[case] tol: f64) {
        let f = |y: &DVector<f64>| -> Result<f64, CollocationError> {
            Ok(y[0] * y[0] + 3.0 * y[0] * y[1] - y[1])
        };
        let x = DVector::from_vec(vec![1.0, -2.0]);
        let grad = scheme.gradient(f, &x, f(&x).unwrap()).unwrap();
        assert_abs_diff_eq!(grad[0], 2.0 - 6.0, epsilon = tol);
        assert_abs_diff_eq!(grad[1], 3.0 - 1.0, epsilon = tol);
    }

    #[test]
    fn colored_jacobian_matches_dense() {
        // Each output depends on a disjoint pair of inputs, except the last one
        let g = |y: &DVector<f64>| -> Result<DVector<f64>, CollocationError> {
            Ok(DVector::from_vec(vec![
                y[0] * y[1],
                y[2].sin() + y[3],
                y[1] - 2.0 * y[3],
            ]))
        };
        let x = DVector::from_vec(vec![0.5, 1.5, -0.3, 2.0]);
        let g0 = g(&x).unwrap();
        let scheme = FiniteDifferenceScheme::Central;
        let dense = SparsityPattern::dense(3, 4);
        let sparse = SparsityPattern::from_columns(3, vec![vec![0], vec![0, 2], vec![1], vec![1, 2]]);
        assert!(sparse.num_colors() < dense.num_colors());
        let jd = scheme.jacobian(g, &x, &g0, &dense).unwrap();
        let js = scheme.jacobian(g, &x, &g0, &sparse).unwrap();
        for (a, b) in jd.iter().zip(js.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(js[(1, 2)], (-0.3_f64).cos(), epsilon = 1e-9);
    }

    #[test]
    fn parse() {
        assert_eq!(
            "backward".parse::<FiniteDifferenceScheme>().unwrap(),
            FiniteDifferenceScheme::Backward
        );
        assert!("centered".parse::<FiniteDifferenceScheme>().unwrap_err().is_config());
    }
}
