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

use crate::errors::{CollocationError, CsvSnafu, IoSnafu, TrajectorySnafu};
use crate::iterate::{interpolate_rows, linspace, Iterate, Var, Variables};
use crate::linalg::{DMatrix, DVector};
use snafu::{ensure, ResultExt};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Blocks stored in a trajectory file, in column order.
const ROLES: [Var; 6] = [
    Var::States,
    Var::Controls,
    Var::Multipliers,
    Var::Derivatives,
    Var::Parameters,
    Var::Slacks,
];

fn role_from_name(name: &str) -> Option<Var> {
    ROLES.iter().copied().find(|var| var.name() == name)
}

/// A tabular trajectory: one row per time sample and one column per named variable.
///
/// In CSV, the header row is `time` followed by `<role>:<name>` for each variable, where `role`
/// is one of `states`, `controls`, `multipliers`, `derivatives`, `parameters` or `slacks`.
/// Parameters are repeated on every row.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub times: DVector<f64>,
    pub columns: Vec<(Var, String)>,
    /// One row per time and one column per entry of `columns`
    pub data: DMatrix<f64>,
}

impl Trajectory {
    /// Builds a trajectory from an iterate. Slacks sampled on a different number of points than
    /// the times are assumed uniformly spaced in time and are interpolated onto the times.
    pub fn from_iterate(iterate: &Iterate) -> Result<Self, CollocationError> {
        let times = iterate.times.clone();
        let num_times = times.len();
        ensure!(
            num_times > 0,
            TrajectorySnafu {
                msg: "iterate has no time samples"
            }
        );

        let mut columns = Vec::new();
        let mut blocks: Vec<DMatrix<f64>> = Vec::new();
        for var in ROLES {
            let names = iterate.names(var);
            let values = match iterate.variables.get(var) {
                Some(values) => values.clone(),
                None => DMatrix::zeros(0, num_times),
            };
            ensure!(
                values.nrows() == names.len(),
                TrajectorySnafu {
                    msg: format!(
                        "`{var}` has {} rows but {} names",
                        values.nrows(),
                        names.len()
                    )
                }
            );
            if names.is_empty() {
                continue;
            }
            let sampled = match var {
                Var::Parameters => {
                    ensure!(
                        values.ncols() == 1,
                        TrajectorySnafu {
                            msg: format!("parameters must have 1 column, got {}", values.ncols())
                        }
                    );
                    DMatrix::from_fn(values.nrows(), num_times, |r, _| values[(r, 0)])
                }
                Var::Slacks if values.ncols() != num_times => {
                    ensure!(
                        values.ncols() > 0,
                        TrajectorySnafu {
                            msg: "slacks have no samples"
                        }
                    );
                    let slack_times =
                        linspace(times[0], times[num_times - 1], values.ncols());
                    interpolate_rows(slack_times.as_slice(), &values, times.as_slice())
                }
                _ => {
                    ensure!(
                        values.ncols() == num_times,
                        TrajectorySnafu {
                            msg: format!(
                                "`{var}` has {} columns but there are {num_times} times",
                                values.ncols()
                            )
                        }
                    );
                    values
                }
            };
            columns.extend(names.iter().map(|name| (var, name.clone())));
            blocks.push(sampled);
        }

        let mut data = DMatrix::zeros(num_times, columns.len());
        let mut col = 0;
        for block in blocks {
            for row in 0..block.nrows() {
                data.column_mut(col).copy_from(&block.row(row).transpose());
                col += 1;
            }
        }

        Ok(Self {
            times,
            columns,
            data,
        })
    }

    /// Converts this trajectory back into an iterate.
    pub fn to_iterate(&self) -> Result<Iterate, CollocationError> {
        let num_times = self.times.len();
        ensure!(
            num_times > 0,
            TrajectorySnafu {
                msg: "trajectory has no time samples"
            }
        );
        ensure!(
            self.data.shape() == (num_times, self.columns.len()),
            TrajectorySnafu {
                msg: format!(
                    "data shape {:?} does not match {num_times} times and {} columns",
                    self.data.shape(),
                    self.columns.len()
                )
            }
        );

        let mut iterate = Iterate {
            times: self.times.clone(),
            ..Default::default()
        };
        let mut variables = Variables::new();
        variables.insert(Var::InitialTime, DMatrix::from_element(1, 1, self.times[0]));
        variables.insert(
            Var::FinalTime,
            DMatrix::from_element(1, 1, self.times[num_times - 1]),
        );

        for var in ROLES {
            let indices: Vec<usize> = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, (role, _))| *role == var)
                .map(|(i, _)| i)
                .collect();
            let names: Vec<String> = indices.iter().map(|i| self.columns[*i].1.clone()).collect();
            let values = if var == Var::Parameters {
                DMatrix::from_fn(indices.len(), 1, |r, _| self.data[(0, indices[r])])
            } else {
                DMatrix::from_fn(indices.len(), num_times, |r, c| self.data[(c, indices[r])])
            };
            variables.insert(var, values);
            match var {
                Var::States => iterate.state_names = names,
                Var::Controls => iterate.control_names = names,
                Var::Multipliers => iterate.multiplier_names = names,
                Var::Derivatives => iterate.derivative_names = names,
                Var::Parameters => iterate.parameter_names = names,
                _ => iterate.slack_names = names,
            }
        }
        iterate.variables = variables;
        Ok(iterate)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), CollocationError> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["time".to_string()];
        header.extend(
            self.columns
                .iter()
                .map(|(var, name)| format!("{}:{name}", var.name())),
        );
        wtr.write_record(&header).context(CsvSnafu {
            action: "writing trajectory header",
        })?;
        for (row, time) in self.times.iter().enumerate() {
            let mut record = vec![time.to_string()];
            record.extend(self.data.row(row).iter().map(|v| v.to_string()));
            wtr.write_record(&record).context(CsvSnafu {
                action: "writing trajectory row",
            })?;
        }
        wtr.flush().context(IoSnafu {
            action: "flushing trajectory",
        })
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, CollocationError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .context(CsvSnafu {
                action: "reading trajectory header",
            })?
            .clone();

        let mut fields = headers.iter();
        ensure!(
            fields.next().map(str::trim) == Some("time"),
            TrajectorySnafu {
                msg: "first column of a trajectory must be `time`"
            }
        );
        let mut columns = Vec::new();
        for field in fields {
            let (role, name) = field.trim().split_once(':').ok_or_else(|| {
                CollocationError::Trajectory {
                    msg: format!("column `{field}` is not of the form <role>:<name>"),
                }
            })?;
            let var = role_from_name(role).ok_or_else(|| CollocationError::Trajectory {
                msg: format!("unknown role `{role}` in column `{field}`"),
            })?;
            columns.push((var, name.to_string()));
        }

        let mut times = Vec::new();
        let mut values = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record.context(CsvSnafu {
                action: "reading trajectory row",
            })?;
            ensure!(
                record.len() == columns.len() + 1,
                TrajectorySnafu {
                    msg: format!(
                        "row {line} has {} fields, expected {}",
                        record.len(),
                        columns.len() + 1
                    )
                }
            );
            for (i, field) in record.iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|e| {
                    CollocationError::Trajectory {
                        msg: format!("row {line}, field {i}: {e}"),
                    }
                })?;
                if i == 0 {
                    times.push(value);
                } else {
                    values.push(value);
                }
            }
        }

        let data = DMatrix::from_row_slice(times.len(), columns.len(), &values);
        Ok(Self {
            times: DVector::from_vec(times),
            columns,
            data,
        })
    }
}

impl Iterate {
    /// Writes this iterate to a CSV trajectory file.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), CollocationError> {
        let file = File::create(path).context(IoSnafu {
            action: "creating trajectory file",
        })?;
        Trajectory::from_iterate(self)?.write_csv(file)
    }

    /// Reads an iterate from a CSV trajectory file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, CollocationError> {
        let file = File::open(path).context(IoSnafu {
            action: "opening trajectory file",
        })?;
        Trajectory::read_csv(file)?.to_iterate()
    }
}
