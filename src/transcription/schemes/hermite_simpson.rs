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

/// Separated Hermite-Simpson collocation: each mesh interval has a midpoint, Simpson's rule ties
/// the ends of the interval and a Hermite interpolation defines the midpoint state.
#[derive(Clone, Debug, Default)]
pub struct HermiteSimpson;

impl CollocationScheme for HermiteSimpson {
    fn interval_fractions(&self) -> &[f64] {
        &[0.0, 0.5]
    }

    fn num_defects_per_state(&self) -> usize {
        2
    }

    fn quadrature_weights(&self) -> &[f64] {
        &[1.0 / 6.0, 4.0 / 6.0, 1.0 / 6.0]
    }

    fn calc_defects(&self, x: &DMatrix<f64>, xdot: &DMatrix<f64>, h: f64) -> DVector<f64> {
        let ns = x.nrows();
        let (x_i, x_mid, x_ip1) = (x.column(0), x.column(1), x.column(2));
        let (f_i, f_mid, f_ip1) = (xdot.column(0), xdot.column(1), xdot.column(2));

        let mut defects = DVector::zeros(2 * ns);
        // Simpson
        defects
            .rows_mut(0, ns)
            .copy_from(&(x_ip1 - x_i - (f_i + f_mid * 4.0 + f_ip1) * (h / 6.0)));
        // Hermite interpolation of the midpoint
        defects
            .rows_mut(ns, ns)
            .copy_from(&(x_mid - (x_i + x_ip1) * 0.5 - (f_i - f_ip1) * (h / 8.0)));
        defects
    }
}
