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

use super::{FiniteDifferenceScheme, NlpProblem};
use crate::errors::{CollocationError, NlpSnafu};
use crate::linalg::DVector;
use snafu::ensure;

/// Sparsity patterns of the constraint Jacobian and of the Hessian of the Lagrangian.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpSparsity {
    pub jacobian: SparsityPattern,
    pub hessian: SparsityPattern,
}

impl NlpSparsity {
    pub fn dense(num_constraints: usize, num_variables: usize) -> Self {
        Self {
            jacobian: SparsityPattern::dense(num_constraints, num_variables),
            hessian: SparsityPattern::dense(num_variables, num_variables),
        }
    }

    /// Detects both patterns at the samples. Two variables may be coupled in the Hessian of the
    /// Lagrangian if they appear in a same constraint, or if both change the objective at any
    /// sample. Without samples, both patterns are dense.
    pub fn detect(
        nlp: &dyn NlpProblem,
        samples: &[DVector<f64>],
        scheme: FiniteDifferenceScheme,
    ) -> Result<Self, CollocationError> {
        let num_variables = nlp.num_variables();
        let jacobian = SparsityPattern::detect(nlp, samples, scheme)?;
        if samples.is_empty() {
            return Ok(Self {
                jacobian,
                hessian: SparsityPattern::dense(num_variables, num_variables),
            });
        }

        let mut in_objective = vec![false; num_variables];
        for sample in samples {
            let f0 = nlp.objective(sample)?;
            let grad = scheme.gradient(|x| nlp.objective(x), sample, f0)?;
            for (j, value) in grad.iter().enumerate() {
                in_objective[j] |= *value != 0.0;
            }
        }
        let hessian = SparsityPattern::lagrangian_hessian(&jacobian, &in_objective);
        debug!(
            "{} non-zeros in the {num_variables}x{num_variables} Hessian of the Lagrangian, {} colors",
            hessian.nnz(),
            hessian.num_colors()
        );
        Ok(Self { jacobian, hessian })
    }
}

/// Non-zero pattern of the constraint Jacobian, stored by column, and a greedy coloring of its
/// columns: columns of the same color share no row and are perturbed together.
#[derive(Clone, Debug, PartialEq)]
pub struct SparsityPattern {
    num_rows: usize,
    columns: Vec<Vec<usize>>,
    colors: Vec<Vec<usize>>,
}

impl SparsityPattern {
    /// Pattern where every entry may be non-zero.
    pub fn dense(num_rows: usize, num_cols: usize) -> Self {
        Self::from_columns(num_rows, vec![(0..num_rows).collect(); num_cols])
    }

    /// Builds a pattern from the row indices of the non-zeros of each column.
    pub fn from_columns(num_rows: usize, mut columns: Vec<Vec<usize>>) -> Self {
        for rows in columns.iter_mut() {
            rows.retain(|r| *r < num_rows);
            rows.sort_unstable();
            rows.dedup();
        }
        let colors = greedy_coloring(num_rows, &columns);
        Self {
            num_rows,
            columns,
            colors,
        }
    }

    /// Detects the pattern from finite differences of the constraints at each sample: an entry is
    /// part of the pattern if it is non-zero at any sample. Without samples, the pattern is dense.
    pub fn detect(
        nlp: &dyn NlpProblem,
        samples: &[DVector<f64>],
        scheme: FiniteDifferenceScheme,
    ) -> Result<Self, CollocationError> {
        let num_rows = nlp.num_constraints();
        let num_cols = nlp.num_variables();
        if samples.is_empty() {
            return Ok(Self::dense(num_rows, num_cols));
        }

        let dense = Self::dense(num_rows, num_cols);
        let mut columns: Vec<Vec<usize>> = vec![Vec::new(); num_cols];
        for (k, sample) in samples.iter().enumerate() {
            ensure!(
                sample.len() == num_cols,
                NlpSnafu {
                    msg: format!(
                        "sparsity sample #{k} has {} variables instead of {num_cols}",
                        sample.len()
                    )
                }
            );
            let g0 = nlp.constraints(sample)?;
            let jac = scheme.jacobian(|x| nlp.constraints(x), sample, &g0, &dense)?;
            for (j, rows) in columns.iter_mut().enumerate() {
                rows.extend((0..num_rows).filter(|i| jac[(*i, j)] != 0.0));
            }
        }
        let pattern = Self::from_columns(num_rows, columns);
        debug!(
            "detected {} non-zeros in the {num_rows}x{num_cols} constraint Jacobian from {} samples, {} colors",
            pattern.nnz(),
            samples.len(),
            pattern.num_colors()
        );
        Ok(pattern)
    }

    /// Pattern of the Hessian of the Lagrangian: the diagonal, every pair of variables sharing a
    /// row of the constraint Jacobian, and every pair of variables flagged in `in_objective`.
    pub fn lagrangian_hessian(jacobian: &Self, in_objective: &[bool]) -> Self {
        let num_vars = jacobian.num_cols();
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); jacobian.num_rows()];
        for (j, column) in jacobian.columns.iter().enumerate() {
            for i in column {
                rows[*i].push(j);
            }
        }
        let objective: Vec<usize> = (0..num_vars)
            .filter(|j| in_objective.get(*j).copied().unwrap_or(false))
            .collect();

        let mut columns: Vec<Vec<usize>> = (0..num_vars).map(|j| vec![j]).collect();
        for coupled in rows.iter().chain(std::iter::once(&objective)) {
            for j in coupled {
                columns[*j].extend_from_slice(coupled);
            }
        }
        Self::from_columns(num_vars, columns)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    /// Rows of the non-zeros of column j.
    pub fn column(&self, j: usize) -> &[usize] {
        &self.columns[j]
    }

    pub fn colors(&self) -> &[Vec<usize>] {
        &self.colors
    }

    pub fn num_colors(&self) -> usize {
        self.colors.len()
    }

    pub fn nnz(&self) -> usize {
        self.columns.iter().map(|c| c.len()).sum()
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.columns
            .get(col)
            .is_some_and(|rows| rows.binary_search(&row).is_ok())
    }
}

/// Assigns to each column the smallest color not used by a column sharing one of its rows.
fn greedy_coloring(num_rows: usize, columns: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut row_colors: Vec<Vec<usize>> = vec![Vec::new(); num_rows];
    let mut colors: Vec<Vec<usize>> = Vec::new();
    for (j, rows) in columns.iter().enumerate() {
        let mut forbidden = vec![false; colors.len()];
        for r in rows {
            for c in &row_colors[*r] {
                forbidden[*c] = true;
            }
        }
        let color = forbidden.iter().position(|f| !f).unwrap_or(colors.len());
        if color == colors.len() {
            colors.push(Vec::new());
        }
        colors[color].push(j);
        for r in rows {
            row_colors[*r].push(color);
        }
    }
    colors
}
