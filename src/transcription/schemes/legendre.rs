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

use crate::errors::{CollocationError, StructuralSnafu};
use crate::linalg::{DMatrix, DVector};
use snafu::ensure;

/// Number of sub-intervals of [-1, 1] scanned for sign changes when bracketing roots.
const NUM_BRACKETS: usize = 2000;
const MAX_BISECTIONS: usize = 200;

/// Returns (P_n(x), P_{n-1}(x)) using Bonnet's recursion. P_{-1} is taken as zero.
pub(crate) fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut prev = 0.0;
    let mut cur = 1.0;
    for k in 0..n {
        let k = k as f64;
        let next = ((2.0 * k + 1.0) * x * cur - k * prev) / (k + 1.0);
        prev = cur;
        cur = next;
    }
    (cur, prev)
}

/// Derivative of P_n at x, for |x| < 1.
pub(crate) fn legendre_derivative(n: usize, x: f64) -> f64 {
    let (pn, pnm1) = legendre(n, x);
    (n as f64) * (x * pn - pnm1) / (x * x - 1.0)
}

/// Finds the roots of f in [a, b) by scanning for sign changes and bisecting each bracket.
fn find_roots<F: Fn(f64) -> f64>(
    f: F,
    a: f64,
    b: f64,
    expected: usize,
) -> Result<Vec<f64>, CollocationError> {
    let mut roots = Vec::with_capacity(expected);
    let step = (b - a) / NUM_BRACKETS as f64;
    for i in 0..NUM_BRACKETS {
        let mut lo = a + step * i as f64;
        let mut hi = a + step * (i + 1) as f64;
        let mut f_lo = f(lo);
        let f_hi = f(hi);
        if f_lo == 0.0 {
            roots.push(lo);
            continue;
        }
        if f_lo * f_hi >= 0.0 {
            continue;
        }
        for _ in 0..MAX_BISECTIONS {
            let mid = 0.5 * (lo + hi);
            let f_mid = f(mid);
            if f_mid == 0.0 {
                lo = mid;
                hi = mid;
                break;
            }
            if f_lo * f_mid < 0.0 {
                hi = mid;
            } else {
                lo = mid;
                f_lo = f_mid;
            }
            if hi - lo <= f64::EPSILON * (1.0 + mid.abs()) {
                break;
            }
        }
        roots.push(0.5 * (lo + hi));
    }
    ensure!(
        roots.len() == expected,
        StructuralSnafu {
            msg: format!("found {} roots instead of {expected}", roots.len())
        }
    );
    Ok(roots)
}

/// Legendre-Gauss points and weights of the given degree, mapped from [-1, 1] onto [0, 1].
pub(crate) fn gauss_points(degree: usize) -> Result<(Vec<f64>, Vec<f64>), CollocationError> {
    let roots = find_roots(|x| legendre(degree, x).0, -1.0, 1.0, degree)?;
    let weights = roots
        .iter()
        .map(|x| {
            let dp = legendre_derivative(degree, *x);
            0.5 * 2.0 / ((1.0 - x * x) * dp * dp)
        })
        .collect();
    Ok((roots.iter().map(|x| 0.5 * (x + 1.0)).collect(), weights))
}

/// Flipped Legendre-Gauss-Radau points and weights of the given degree, which include the end of
/// the interval, mapped from (-1, 1] onto (0, 1].
pub(crate) fn flipped_radau_points(
    degree: usize,
) -> Result<(Vec<f64>, Vec<f64>), CollocationError> {
    let d = degree as f64;
    // Roots of P_{d-1} - P_d; x = 1 is always a root and is excluded from the scan.
    let mut roots = find_roots(
        |x| {
            let (pd, pdm1) = legendre(degree, x);
            pdm1 - pd
        },
        -1.0,
        1.0 - 1.0 / NUM_BRACKETS as f64,
        degree - 1,
    )?;
    roots.push(1.0);
    let weights = roots
        .iter()
        .map(|x| {
            if *x == 1.0 {
                0.5 * 2.0 / (d * d)
            } else {
                let pdm1 = legendre(degree - 1, *x).0;
                0.5 * (1.0 + x) / (d * d * pdm1 * pdm1)
            }
        })
        .collect();
    Ok((roots.iter().map(|x| 0.5 * (x + 1.0)).collect(), weights))
}

/// Barycentric weights of the Lagrange basis built on the provided distinct points.
pub(crate) fn barycentric_weights(points: &[f64]) -> Vec<f64> {
    points
        .iter()
        .enumerate()
        .map(|(j, pj)| {
            let prod: f64 = points
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != j)
                .map(|(_, pk)| pj - pk)
                .product();
            1.0 / prod
        })
        .collect()
}

/// Differentiation matrix of the Lagrange basis: entry (i, j) is the derivative of the j-th basis
/// polynomial at the i-th point.
pub(crate) fn differentiation_matrix(points: &[f64]) -> DMatrix<f64> {
    let n = points.len();
    let w = barycentric_weights(points);
    let mut diff = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut diag = 0.0;
        for j in 0..n {
            if i != j {
                let dij = (w[j] / w[i]) / (points[i] - points[j]);
                diff[(i, j)] = dij;
                diag -= dij;
            }
        }
        diff[(i, i)] = diag;
    }
    diff
}

/// Values of each Lagrange basis polynomial at x.
pub(crate) fn lagrange_basis_at(points: &[f64], x: f64) -> DVector<f64> {
    DVector::from_fn(points.len(), |j, _| {
        points
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != j)
            .map(|(_, pk)| (x - pk) / (points[j] - pk))
            .product()
    })
}

#[cfg(test)]
mod ut_legendre {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn known_gauss_points() {
        let (points, weights) = gauss_points(2).unwrap();
        let r = 0.5 / 3.0_f64.sqrt();
        assert_abs_diff_eq!(points[0], 0.5 - r, epsilon = 1e-13);
        assert_abs_diff_eq!(points[1], 0.5 + r, epsilon = 1e-13);
        assert_abs_diff_eq!(weights[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(weights[1], 0.5, epsilon = 1e-12);

        // The middle root of odd degrees falls on a bracket boundary
        let (points, weights) = gauss_points(3).unwrap();
        assert_abs_diff_eq!(points[1], 0.5, epsilon = 1e-13);
        assert_abs_diff_eq!(weights[1], 4.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn known_radau_points() {
        let (points, weights) = flipped_radau_points(2).unwrap();
        assert_abs_diff_eq!(points[0], 1.0 / 3.0, epsilon = 1e-13);
        assert_eq!(points[1], 1.0);
        assert_abs_diff_eq!(weights[0], 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(weights[1], 0.25, epsilon = 1e-12);

        let (points, weights) = flipped_radau_points(1).unwrap();
        assert_eq!(points, vec![1.0]);
        assert_eq!(weights, vec![1.0]);
    }

    #[test]
    fn weights_sum_to_one() {
        for degree in 1..=9 {
            let (_, w) = gauss_points(degree).unwrap();
            assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            let (_, w) = flipped_radau_points(degree).unwrap();
            assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn differentiation_is_exact_on_polynomials() {
        let points = [0.0, 0.2, 0.5, 0.9];
        let diff = differentiation_matrix(&points);
        // Derivative of x^3 - x
        let values = DVector::from_iterator(4, points.iter().map(|x| x * x * x - x));
        let derivative = &diff * values;
        for (i, x) in points.iter().enumerate() {
            assert_abs_diff_eq!(derivative[i], 3.0 * x * x - 1.0, epsilon = 1e-12);
        }
        let basis = lagrange_basis_at(&points, 1.0);
        assert_abs_diff_eq!(basis.sum(), 1.0, epsilon = 1e-12);
    }
}
