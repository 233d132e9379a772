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

use crate::errors::{CollocationError, TrajectorySnafu};
use crate::linalg::{DMatrix, DVector};
use crate::transcription::Constraints;
use enum_iterator::Sequence;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

/// Role of a block of decision variables. The ordering of this enum is the order in which the
/// blocks are stored in the flat vector of decision variables.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Var {
    InitialTime,
    FinalTime,
    States,
    Controls,
    Multipliers,
    Derivatives,
    Parameters,
    Slacks,
    ProjectionStates,
}

impl Var {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialTime => "initial_time",
            Self::FinalTime => "final_time",
            Self::States => "states",
            Self::Controls => "controls",
            Self::Multipliers => "multipliers",
            Self::Derivatives => "derivatives",
            Self::Parameters => "parameters",
            Self::Slacks => "slacks",
            Self::ProjectionStates => "projection_states",
        }
    }

    /// Returns true for blocks which have one column per grid point.
    pub fn is_time_varying(&self) -> bool {
        matches!(
            self,
            Self::States | Self::Controls | Self::Multipliers | Self::Derivatives
        )
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Named blocks of decision variables, each stored as a matrix whose columns are the points
/// where that block is defined.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(BTreeMap<Var, DMatrix<f64>>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: Var) -> Option<&DMatrix<f64>> {
        self.0.get(&var)
    }

    pub fn get_mut(&mut self, var: Var) -> Option<&mut DMatrix<f64>> {
        self.0.get_mut(&var)
    }

    /// Returns the requested block or an error if it is missing.
    pub fn fetch(&self, var: Var) -> Result<&DMatrix<f64>, CollocationError> {
        self.0.get(&var).ok_or_else(|| CollocationError::Trajectory {
            msg: format!("missing variable block `{var}`"),
        })
    }

    pub fn insert(&mut self, var: Var, value: DMatrix<f64>) -> Option<DMatrix<f64>> {
        self.0.insert(var, value)
    }

    pub fn remove(&mut self, var: Var) -> Option<DMatrix<f64>> {
        self.0.remove(&var)
    }

    pub fn contains(&self, var: Var) -> bool {
        self.0.contains_key(&var)
    }

    /// Shape of the requested block, (0, 0) if it is missing.
    pub fn shape(&self, var: Var) -> (usize, usize) {
        self.0.get(&var).map_or((0, 0), |m| m.shape())
    }

    /// Total number of scalars across all blocks.
    pub fn len(&self) -> usize {
        self.0.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &DMatrix<f64>)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Var, &mut DMatrix<f64>)> {
        self.0.iter_mut()
    }

    /// Applies the provided function element-wise on the blocks of self and other, which must
    /// have the same shapes.
    pub fn zip_map<F>(&self, other: &Self, f: F) -> Result<Self, CollocationError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut out = Self::new();
        for (var, lhs) in self.iter() {
            let rhs = other.fetch(*var)?;
            ensure!(
                lhs.shape() == rhs.shape(),
                TrajectorySnafu {
                    msg: format!(
                        "`{var}` shapes {:?} and {:?} differ",
                        lhs.shape(),
                        rhs.shape()
                    )
                }
            );
            out.insert(*var, lhs.zip_map(rhs, &f));
        }
        Ok(out)
    }
}

impl Index<Var> for Variables {
    type Output = DMatrix<f64>;

    fn index(&self, var: Var) -> &Self::Output {
        &self.0[&var]
    }
}

/// Linear interpolation of the samples `ys` (taken at the increasing abscissas `xs`) at `xq`.
/// Values outside of the abscissas are held constant.
pub(crate) fn interpolate<F>(xs: &[f64], ys: F, xq: f64) -> f64
where
    F: Fn(usize) -> f64,
{
    match xs.len() {
        0 => f64::NAN,
        1 => ys(0),
        n => {
            if xq <= xs[0] {
                return ys(0);
            } else if xq >= xs[n - 1] {
                return ys(n - 1);
            }
            // First abscissa strictly greater than the query point
            let hi = xs.partition_point(|x| *x <= xq).clamp(1, n - 1);
            let lo = hi - 1;
            let span = xs[hi] - xs[lo];
            if span <= 0.0 {
                ys(lo)
            } else {
                let frac = (xq - xs[lo]) / span;
                ys(lo) + frac * (ys(hi) - ys(lo))
            }
        }
    }
}

/// Interpolates every row of `values` (one column per abscissa) onto the query points.
pub(crate) fn interpolate_rows(xs: &[f64], values: &DMatrix<f64>, xq: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(values.nrows(), xq.len(), |row, col| {
        interpolate(xs, |j| values[(row, j)], xq[col])
    })
}

/// `num` evenly spaced values from `start` to `end`, both included.
pub(crate) fn linspace(start: f64, end: f64, num: usize) -> DVector<f64> {
    match num {
        0 => DVector::zeros(0),
        1 => DVector::from_element(1, start),
        _ => DVector::from_fn(num, |i, _| {
            start + (end - start) * (i as f64) / ((num - 1) as f64)
        }),
    }
}

/// A trajectory of decision variables, used both as an initial guess and as the decoded solution
/// of a transcription.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Iterate {
    pub variables: Variables,
    pub times: DVector<f64>,
    pub state_names: Vec<String>,
    pub control_names: Vec<String>,
    pub multiplier_names: Vec<String>,
    pub derivative_names: Vec<String>,
    pub parameter_names: Vec<String>,
    pub slack_names: Vec<String>,
    pub projection_state_names: Vec<String>,
    /// Index of the NLP iteration which produced this iterate, if any
    pub iteration: Option<usize>,
}

impl Iterate {
    pub fn num_times(&self) -> usize {
        self.times.len()
    }

    /// Names of the rows of the requested block.
    pub fn names(&self, var: Var) -> &[String] {
        match var {
            Var::States => &self.state_names,
            Var::Controls => &self.control_names,
            Var::Multipliers => &self.multiplier_names,
            Var::Derivatives => &self.derivative_names,
            Var::Parameters => &self.parameter_names,
            Var::Slacks => &self.slack_names,
            Var::ProjectionStates => &self.projection_state_names,
            Var::InitialTime | Var::FinalTime => &[],
        }
    }

    /// Returns a copy of this iterate sampled at the provided times. The time varying blocks are
    /// linearly interpolated row by row; slacks are interpolated only if they are sampled on the
    /// same times as the other blocks, otherwise they are copied. Parameters and projection states
    /// are copied.
    pub fn resample(&self, times: &DVector<f64>) -> Result<Self, CollocationError> {
        ensure!(
            !times.is_empty(),
            TrajectorySnafu {
                msg: "cannot resample onto an empty time vector"
            }
        );
        let old_times = self.times.as_slice();
        let new_times = times.as_slice();

        let mut variables = Variables::new();
        for (var, values) in self.variables.iter() {
            let resampled = match var {
                Var::InitialTime => DMatrix::from_element(1, 1, times[0]),
                Var::FinalTime => DMatrix::from_element(1, 1, times[times.len() - 1]),
                Var::Parameters | Var::ProjectionStates => values.clone(),
                Var::Slacks if values.ncols() != old_times.len() => values.clone(),
                _ => {
                    ensure!(
                        values.ncols() == old_times.len(),
                        TrajectorySnafu {
                            msg: format!(
                                "`{var}` has {} columns but there are {} times",
                                values.ncols(),
                                old_times.len()
                            )
                        }
                    );
                    interpolate_rows(old_times, values, new_times)
                }
            };
            variables.insert(*var, resampled);
        }

        Ok(Self {
            variables,
            times: times.clone(),
            iteration: None,
            ..self.clone()
        })
    }

    /// Appends projection states sampled from the multibody states at the provided time indices,
    /// unless this iterate already has them.
    pub fn with_projection_states(
        mut self,
        num_multibody_states: usize,
        indices: &[usize],
    ) -> Result<Self, CollocationError> {
        if self.variables.shape(Var::ProjectionStates) == (num_multibody_states, indices.len()) {
            return Ok(self);
        }
        let states = self.variables.fetch(Var::States)?;
        ensure!(
            states.nrows() >= num_multibody_states,
            TrajectorySnafu {
                msg: format!(
                    "{} states cannot provide {num_multibody_states} projection states",
                    states.nrows()
                )
            }
        );
        let mut projection = DMatrix::zeros(num_multibody_states, indices.len());
        for (col, &index) in indices.iter().enumerate() {
            ensure!(
                index < states.ncols(),
                TrajectorySnafu {
                    msg: format!("projection index {index} out of {} times", states.ncols())
                }
            );
            projection
                .column_mut(col)
                .copy_from(&states.view((0, index), (num_multibody_states, 1)));
        }
        self.projection_state_names = self
            .state_names
            .iter()
            .take(num_multibody_states)
            .map(|name| format!("{name}/projection"))
            .collect();
        self.variables.insert(Var::ProjectionStates, projection);
        Ok(self)
    }
}

/// The result of a solve: the trajectory and the diagnostics of the NLP solver.
#[derive(Clone, Debug)]
pub struct Solution {
    pub iterate: Iterate,
    pub success: bool,
    pub status: String,
    pub objective: f64,
    /// Value of each named term of the objective
    pub objective_breakdown: Vec<(String, f64)>,
    pub num_iterations: usize,
    /// Constraint values at the solution
    pub constraints: Constraints,
}

impl Solution {
    /// Writes the value of each term of the objective, one per line.
    pub fn write_objective_breakdown<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "Breakdown of objective (including weights):")?;
        if self.objective_breakdown.is_empty() {
            writeln!(out, "  no terms")?;
        }
        for (name, value) in &self.objective_breakdown {
            writeln!(out, "  {name}: {value:.6e}")?;
        }
        writeln!(out, "  total: {:.6e}", self.objective)
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} after {} iterations ({}): objective = {:.6e}",
            if self.success { "Converged" } else { "Failed" },
            self.num_iterations,
            self.status,
            self.objective
        )?;
        self.write_objective_breakdown(f)
    }
}

#[cfg(test)]
mod ut_iterate {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn var_order() {
        let all: Vec<Var> = enum_iterator::all::<Var>().collect();
        assert_eq!(all.first(), Some(&Var::InitialTime));
        assert_eq!(all.last(), Some(&Var::ProjectionStates));
        assert!(all.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn interpolation_holds_ends() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [1.0, 3.0, -1.0];
        assert_eq!(interpolate(&xs, |i| ys[i], -1.0), 1.0);
        assert_eq!(interpolate(&xs, |i| ys[i], 4.0), -1.0);
        assert_abs_diff_eq!(interpolate(&xs, |i| ys[i], 0.5), 2.0);
        assert_abs_diff_eq!(interpolate(&xs, |i| ys[i], 2.0), 1.0);
        assert_abs_diff_eq!(interpolate(&xs, |i| ys[i], 1.0), 3.0);
    }

    #[test]
    fn resample_linear() {
        let times = linspace(0.0, 2.0, 3);
        let mut variables = Variables::new();
        variables.insert(Var::InitialTime, DMatrix::from_element(1, 1, 0.0));
        variables.insert(Var::FinalTime, DMatrix::from_element(1, 1, 2.0));
        variables.insert(
            Var::States,
            DMatrix::from_fn(2, 3, |r, c| (r as f64 + 1.0) * c as f64 + 0.5),
        );
        variables.insert(Var::Parameters, DMatrix::from_element(1, 1, 7.0));
        variables.insert(Var::Slacks, DMatrix::from_element(1, 2, 4.0));
        let iterate = Iterate {
            variables,
            times,
            state_names: vec!["a".into(), "b".into()],
            ..Default::default()
        };

        let new_times = linspace(0.0, 2.0, 5);
        let resampled = iterate.resample(&new_times).unwrap();
        let states = &resampled.variables[Var::States];
        assert_eq!(states.shape(), (2, 5));
        for (col, t) in new_times.iter().enumerate() {
            assert_abs_diff_eq!(states[(0, col)], t + 0.5, epsilon = 1e-12);
            assert_abs_diff_eq!(states[(1, col)], 2.0 * t + 0.5, epsilon = 1e-12);
        }
        assert_eq!(resampled.variables[Var::Parameters][(0, 0)], 7.0);
        assert_eq!(resampled.variables.shape(Var::Slacks), (1, 2));
        assert_eq!(resampled.state_names, iterate.state_names);
    }

    #[test]
    fn projection_states_from_states() {
        let mut variables = Variables::new();
        variables.insert(Var::States, DMatrix::from_fn(3, 5, |r, c| (10 * r + c) as f64));
        let iterate = Iterate {
            variables,
            times: linspace(0.0, 1.0, 5),
            state_names: vec!["q".into(), "u".into(), "z".into()],
            ..Default::default()
        }
        .with_projection_states(2, &[2, 4])
        .unwrap();
        let proj = &iterate.variables[Var::ProjectionStates];
        assert_eq!(proj.shape(), (2, 2));
        assert_eq!(proj[(0, 0)], 2.0);
        assert_eq!(proj[(1, 1)], 14.0);
        assert_eq!(iterate.projection_state_names, vec!["q/projection", "u/projection"]);
    }
}
