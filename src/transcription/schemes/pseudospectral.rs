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

use super::legendre::{differentiation_matrix, flipped_radau_points, gauss_points, lagrange_basis_at};
use super::CollocationScheme;
use crate::errors::CollocationError;
use crate::linalg::{DMatrix, DVector};

/// Family of orthogonal collocation points.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudospectralKind {
    /// Roots of the Legendre polynomial, strictly inside each interval
    LegendreGauss,
    /// Flipped Legendre-Gauss-Radau points, which include the end of each interval
    LegendreGaussRadau,
}

/// Pseudospectral collocation of a given degree: the states of each mesh interval are a Lagrange
/// polynomial through the interval start and the collocation points, and the dynamics are enforced
/// at the collocation points through the differentiation matrix of that polynomial.
///
/// For Legendre-Gauss, the end of the interval is not collocated and its state is tied to the
/// interpolating polynomial by an additional defect. For Legendre-Gauss-Radau, the end of the
/// interval is the last collocation point.
#[derive(Clone, Debug)]
pub struct Pseudospectral {
    kind: PseudospectralKind,
    degree: usize,
    /// Interval start followed by the interior points
    fractions: Vec<f64>,
    /// Normalized weights of every point of an interval, end point included
    weights: Vec<f64>,
    /// Rows: collocation points; columns: points of the polynomial
    differentiation: DMatrix<f64>,
    /// Basis of the polynomial evaluated at the end of the interval (Gauss only)
    end_interpolation: Option<DVector<f64>>,
}

impl Pseudospectral {
    pub fn new(kind: PseudospectralKind, degree: usize) -> Result<Self, CollocationError> {
        let (points, quadrature) = match kind {
            PseudospectralKind::LegendreGauss => gauss_points(degree)?,
            PseudospectralKind::LegendreGaussRadau => flipped_radau_points(degree)?,
        };

        // Polynomial points: the interval start and every collocation point
        let mut basis_points = vec![0.0];
        basis_points.extend(points.iter().copied());
        let full = differentiation_matrix(&basis_points);
        let differentiation = full.rows(1, degree).into_owned();

        let (fractions, weights, end_interpolation) = match kind {
            PseudospectralKind::LegendreGauss => {
                let mut weights = vec![0.0];
                weights.extend(quadrature.iter().copied());
                weights.push(0.0);
                (
                    basis_points.clone(),
                    weights,
                    Some(lagrange_basis_at(&basis_points, 1.0)),
                )
            }
            PseudospectralKind::LegendreGaussRadau => {
                let mut weights = vec![0.0];
                weights.extend(quadrature.iter().copied());
                // The last collocation point is the next mesh point
                (basis_points[..degree].to_vec(), weights, None)
            }
        };

        Ok(Self {
            kind,
            degree,
            fractions,
            weights,
            differentiation,
            end_interpolation,
        })
    }

    pub fn kind(&self) -> PseudospectralKind {
        self.kind
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl CollocationScheme for Pseudospectral {
    fn interval_fractions(&self) -> &[f64] {
        &self.fractions
    }

    fn num_defects_per_state(&self) -> usize {
        match self.kind {
            PseudospectralKind::LegendreGauss => self.degree + 1,
            PseudospectralKind::LegendreGaussRadau => self.degree,
        }
    }

    fn quadrature_weights(&self) -> &[f64] {
        &self.weights
    }

    fn calc_defects(&self, x: &DMatrix<f64>, xdot: &DMatrix<f64>, h: f64) -> DVector<f64> {
        let ns = x.nrows();
        let npoly = self.degree + 1;
        let poly_states = x.columns(0, npoly);
        let mut defects = DVector::zeros(ns * self.num_defects_per_state());

        let mut block = 0;
        if let Some(end) = &self.end_interpolation {
            defects
                .rows_mut(0, ns)
                .copy_from(&(x.column(npoly) - poly_states * end));
            block += 1;
        }
        for i in 0..self.degree {
            let slope = poly_states * self.differentiation.row(i).transpose();
            defects
                .rows_mut(block * ns, ns)
                .copy_from(&(xdot.column(i + 1) * h - slope));
            block += 1;
        }
        defects
    }
}
