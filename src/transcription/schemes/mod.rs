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

use crate::errors::{CollocationError, ConfigSnafu};
use crate::linalg::{DMatrix, DVector};
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use std::str::FromStr;

mod hermite_simpson;
mod legendre;
mod pseudospectral;
mod trapezoidal;

pub use hermite_simpson::HermiteSimpson;
pub use pseudospectral::{Pseudospectral, PseudospectralKind};
pub use trapezoidal::Trapezoidal;

/// Highest supported degree of the pseudospectral schemes.
pub const MAX_PSEUDOSPECTRAL_DEGREE: usize = 9;

/// Identifier of a transcription scheme, parsed from `trapezoidal`, `hermite-simpson`,
/// `legendre-gauss-N` or `legendre-gauss-radau-N` with N in 1..=9.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scheme {
    #[default]
    Trapezoidal,
    HermiteSimpson,
    LegendreGauss(usize),
    LegendreGaussRadau(usize),
}

impl Scheme {
    /// Builds the collocation rules of this scheme.
    pub fn collocation(&self) -> Result<Collocation, CollocationError> {
        match *self {
            Self::Trapezoidal => Ok(Collocation::Trapezoidal(Trapezoidal)),
            Self::HermiteSimpson => Ok(Collocation::HermiteSimpson(HermiteSimpson)),
            Self::LegendreGauss(degree) => Ok(Collocation::Pseudospectral(Pseudospectral::new(
                PseudospectralKind::LegendreGauss,
                check_degree(degree)?,
            )?)),
            Self::LegendreGaussRadau(degree) => {
                Ok(Collocation::Pseudospectral(Pseudospectral::new(
                    PseudospectralKind::LegendreGaussRadau,
                    check_degree(degree)?,
                )?))
            }
        }
    }

    pub fn is_pseudospectral(&self) -> bool {
        matches!(self, Self::LegendreGauss(_) | Self::LegendreGaussRadau(_))
    }
}

fn check_degree(degree: usize) -> Result<usize, CollocationError> {
    ensure!(
        (1..=MAX_PSEUDOSPECTRAL_DEGREE).contains(&degree),
        ConfigSnafu {
            setting: "transcription_scheme",
            msg: format!(
                "pseudospectral degree must be in 1..={MAX_PSEUDOSPECTRAL_DEGREE}, got {degree}"
            )
        }
    );
    Ok(degree)
}

impl FromStr for Scheme {
    type Err = CollocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "trapezoidal" => return Ok(Self::Trapezoidal),
            "hermite-simpson" => return Ok(Self::HermiteSimpson),
            _ => {}
        }
        let re = Regex::new(r"^legendre-gauss(-radau)?-(\d+)$").map_err(|e| {
            CollocationError::Structural {
                msg: format!("invalid scheme pattern: {e}"),
            }
        })?;
        let caps = re.captures(s.trim()).ok_or_else(|| CollocationError::Config {
            setting: "transcription_scheme",
            msg: format!("unknown transcription scheme `{s}`"),
        })?;
        let degree = caps[2]
            .parse::<usize>()
            .map_err(|e| CollocationError::Config {
                setting: "transcription_scheme",
                msg: format!("invalid degree in `{s}`: {e}"),
            })
            .and_then(check_degree)?;
        if caps.get(1).is_some() {
            Ok(Self::LegendreGaussRadau(degree))
        } else {
            Ok(Self::LegendreGauss(degree))
        }
    }
}

impl TryFrom<String> for Scheme {
    type Error = CollocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scheme> for String {
    fn from(scheme: Scheme) -> Self {
        scheme.to_string()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trapezoidal => write!(f, "trapezoidal"),
            Self::HermiteSimpson => write!(f, "hermite-simpson"),
            Self::LegendreGauss(degree) => write!(f, "legendre-gauss-{degree}"),
            Self::LegendreGaussRadau(degree) => write!(f, "legendre-gauss-radau-{degree}"),
        }
    }
}

/// The algebra specific to a collocation scheme, defined on a single mesh interval normalized to
/// [0, 1]. The N points of an interval are its start and its interior points; the matrices passed
/// to the scheme also hold the start of the next interval, for N + 1 columns.
pub trait CollocationScheme {
    /// Fractions of the interval of each of its points, starting with 0 and excluding 1.
    fn interval_fractions(&self) -> &[f64];

    /// Number of defect rows per state per mesh interval.
    fn num_defects_per_state(&self) -> usize;

    /// Quadrature weights of the N + 1 points of the normalized interval, summing to 1.
    fn quadrature_weights(&self) -> &[f64];

    /// Defects of one mesh interval of duration `h`, as a block of rows per state vector.
    fn calc_defects(&self, x: &DMatrix<f64>, xdot: &DMatrix<f64>, h: f64) -> DVector<f64>;

    fn supports_interpolating_controls(&self) -> bool {
        true
    }

    /// Constraints forcing the controls at the interior points of an interval to be the linear
    /// interpolation of the controls at the ends of that interval, one column per interior point.
    fn calc_interpolating_controls(&self, controls: &DMatrix<f64>) -> DMatrix<f64> {
        let fractions = self.interval_fractions();
        let n = fractions.len();
        let start = controls.column(0);
        let end = controls.column(n);
        let mut out = DMatrix::zeros(controls.nrows(), n.saturating_sub(1));
        for (col, tau) in fractions.iter().skip(1).enumerate() {
            let interpolated = start + (end - start) * *tau;
            out.set_column(col, &(controls.column(col + 1) - interpolated));
        }
        out
    }
}

/// The closed set of collocation schemes.
#[derive(Clone, Debug)]
pub enum Collocation {
    Trapezoidal(Trapezoidal),
    HermiteSimpson(HermiteSimpson),
    Pseudospectral(Pseudospectral),
}

impl Collocation {
    fn scheme(&self) -> &dyn CollocationScheme {
        match self {
            Self::Trapezoidal(s) => s,
            Self::HermiteSimpson(s) => s,
            Self::Pseudospectral(s) => s,
        }
    }

    /// Number of grid points per mesh interval, including both of its ends.
    pub fn num_points_per_mesh_interval(&self) -> usize {
        self.interval_fractions().len() + 1
    }
}

impl CollocationScheme for Collocation {
    fn interval_fractions(&self) -> &[f64] {
        self.scheme().interval_fractions()
    }

    fn num_defects_per_state(&self) -> usize {
        self.scheme().num_defects_per_state()
    }

    fn quadrature_weights(&self) -> &[f64] {
        self.scheme().quadrature_weights()
    }

    fn calc_defects(&self, x: &DMatrix<f64>, xdot: &DMatrix<f64>, h: f64) -> DVector<f64> {
        self.scheme().calc_defects(x, xdot, h)
    }

    fn supports_interpolating_controls(&self) -> bool {
        self.scheme().supports_interpolating_controls()
    }

    fn calc_interpolating_controls(&self, controls: &DMatrix<f64>) -> DMatrix<f64> {
        self.scheme().calc_interpolating_controls(controls)
    }
}
