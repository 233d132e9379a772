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

use super::CollocationScheme;
use crate::linalg::{DMatrix, DVector};

/// Trapezoidal rule: the grid is the mesh and the state increment over an interval is the
/// average of the derivatives at both ends times the interval duration.
#[derive(Clone, Debug, Default)]
pub struct Trapezoidal;

impl CollocationScheme for Trapezoidal {
    fn interval_fractions(&self) -> &[f64] {
        &[0.0]
    }

    fn num_defects_per_state(&self) -> usize {
        1
    }

    fn quadrature_weights(&self) -> &[f64] {
        &[0.5, 0.5]
    }

    fn calc_defects(&self, x: &DMatrix<f64>, xdot: &DMatrix<f64>, h: f64) -> DVector<f64> {
        x.column(1) - x.column(0) - (xdot.column(0) + xdot.column(1)) * (0.5 * h)
    }

    fn supports_interpolating_controls(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod ut_trapezoidal {
    use super::*;

    #[test]
    fn linear_motion_has_no_defect() {
        // x = 3t + 1 over [0, 0.5]
        let x = DMatrix::from_row_slice(1, 2, &[1.0, 2.5]);
        let xdot = DMatrix::from_row_slice(1, 2, &[3.0, 3.0]);
        let defects = Trapezoidal.calc_defects(&x, &xdot, 0.5);
        assert_eq!(defects.len(), 1);
        assert!(defects[0].abs() < 1e-15);
    }
}
