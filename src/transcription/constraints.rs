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
use std::fmt;

/// Values of every constraint of a transcription, grouped by block. Each column of a block holds
/// the constraints of one point (or one mesh interval for defects and projections).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    pub defects: DMatrix<f64>,
    pub multibody_residuals: DMatrix<f64>,
    pub auxiliary_residuals: DMatrix<f64>,
    /// Position, velocity and (unless projecting) acceleration errors at mesh points
    pub kinematic: DMatrix<f64>,
    /// Acceleration errors at every grid point, when projecting onto the constraint manifold
    pub kinematic_udoterr: DMatrix<f64>,
    pub endpoint: Vec<DMatrix<f64>>,
    pub path: Vec<DMatrix<f64>>,
    pub interp_controls: DMatrix<f64>,
    pub projection: DMatrix<f64>,
}

/// A block of the [`Constraints`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Endpoint(usize),
    Path(usize),
    Kinematic,
    KinematicUdoterr,
    MultibodyResiduals,
    AuxiliaryResiduals,
    Defects,
    InterpControls,
    Projection,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(i) => write!(f, "endpoint #{i}"),
            Self::Path(i) => write!(f, "path #{i}"),
            Self::Kinematic => write!(f, "kinematic"),
            Self::KinematicUdoterr => write!(f, "kinematic_udoterr"),
            Self::MultibodyResiduals => write!(f, "multibody_residuals"),
            Self::AuxiliaryResiduals => write!(f, "auxiliary_residuals"),
            Self::Defects => write!(f, "defects"),
            Self::InterpControls => write!(f, "interp_controls"),
            Self::Projection => write!(f, "projection"),
        }
    }
}

impl Constraints {
    pub fn block(&self, block: Block) -> &DMatrix<f64> {
        match block {
            Block::Endpoint(i) => &self.endpoint[i],
            Block::Path(i) => &self.path[i],
            Block::Kinematic => &self.kinematic,
            Block::KinematicUdoterr => &self.kinematic_udoterr,
            Block::MultibodyResiduals => &self.multibody_residuals,
            Block::AuxiliaryResiduals => &self.auxiliary_residuals,
            Block::Defects => &self.defects,
            Block::InterpControls => &self.interp_controls,
            Block::Projection => &self.projection,
        }
    }

    pub fn block_mut(&mut self, block: Block) -> &mut DMatrix<f64> {
        match block {
            Block::Endpoint(i) => &mut self.endpoint[i],
            Block::Path(i) => &mut self.path[i],
            Block::Kinematic => &mut self.kinematic,
            Block::KinematicUdoterr => &mut self.kinematic_udoterr,
            Block::MultibodyResiduals => &mut self.multibody_residuals,
            Block::AuxiliaryResiduals => &mut self.auxiliary_residuals,
            Block::Defects => &mut self.defects,
            Block::InterpControls => &mut self.interp_controls,
            Block::Projection => &mut self.projection,
        }
    }

    /// Every block paired with its identifier.
    pub fn blocks(&self) -> Vec<(Block, &DMatrix<f64>)> {
        let mut blocks: Vec<(Block, &DMatrix<f64>)> = (0..self.endpoint.len())
            .map(|i| (Block::Endpoint(i), &self.endpoint[i]))
            .collect();
        blocks.extend((0..self.path.len()).map(|i| (Block::Path(i), &self.path[i])));
        for block in [
            Block::Kinematic,
            Block::KinematicUdoterr,
            Block::MultibodyResiduals,
            Block::AuxiliaryResiduals,
            Block::Defects,
            Block::InterpControls,
            Block::Projection,
        ] {
            blocks.push((block, self.block(block)));
        }
        blocks
    }
}

/// Shapes of the constraint blocks and the order in which their columns are flattened.
///
/// Endpoint constraints come first. Then, for each mesh interval: the path constraints (at every
/// point of the interval if enforced at interior points, else at the mesh point), the kinematic
/// constraints at the mesh point, the acceleration errors at every point of the interval (when
/// projecting), the multibody and auxiliary residuals of every point of the interval, the defects,
/// the interpolating controls and the projection constraints. The final grid point closes the
/// sequence with its path, kinematic, acceleration error and residual blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintLayout {
    pub num_mesh_intervals: usize,
    /// Grid points per mesh interval, excluding the start of the next interval
    pub num_points_per_interval: usize,
    pub num_defects_per_interval: usize,
    pub num_multibody_residuals: usize,
    pub num_auxiliary_residuals: usize,
    pub num_kinematic: usize,
    /// Zero unless projecting onto the constraint manifold
    pub num_udoterr: usize,
    pub projecting: bool,
    pub endpoint_sizes: Vec<usize>,
    pub path_sizes: Vec<usize>,
    pub path_at_interior_points: bool,
    pub num_controls: usize,
    pub interpolate_controls: bool,
    pub num_projection: usize,
}

impl ConstraintLayout {
    pub fn num_mesh_points(&self) -> usize {
        self.num_mesh_intervals + 1
    }

    pub fn num_grid_points(&self) -> usize {
        self.num_mesh_intervals * self.num_points_per_interval + 1
    }

    pub fn num_path_points(&self) -> usize {
        if self.path_at_interior_points {
            self.num_grid_points()
        } else {
            self.num_mesh_points()
        }
    }

    pub fn num_interp_control_points(&self) -> usize {
        if self.interpolate_controls {
            self.num_mesh_intervals * self.num_points_per_interval.saturating_sub(1)
        } else {
            0
        }
    }

    pub fn num_udoterr_points(&self) -> usize {
        if self.projecting {
            self.num_grid_points()
        } else {
            0
        }
    }

    /// Total number of scalar constraints.
    pub fn len(&self) -> usize {
        self.endpoint_sizes.iter().sum::<usize>()
            + self.path_sizes.iter().sum::<usize>() * self.num_path_points()
            + self.num_kinematic * self.num_mesh_points()
            + self.num_udoterr * self.num_udoterr_points()
            + (self.num_multibody_residuals + self.num_auxiliary_residuals)
                * self.num_grid_points()
            + self.num_defects_per_interval * self.num_mesh_intervals
            + self.num_controls * self.num_interp_control_points()
            + self.num_projection * self.num_mesh_intervals
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A bundle with every block of the correct shape, filled with `value`.
    pub fn filled(&self, value: f64) -> Constraints {
        let g = self.num_grid_points();
        Constraints {
            defects: DMatrix::from_element(self.num_defects_per_interval, self.num_mesh_intervals, value),
            multibody_residuals: DMatrix::from_element(self.num_multibody_residuals, g, value),
            auxiliary_residuals: DMatrix::from_element(self.num_auxiliary_residuals, g, value),
            kinematic: DMatrix::from_element(self.num_kinematic, self.num_mesh_points(), value),
            kinematic_udoterr: DMatrix::from_element(
                self.num_udoterr,
                self.num_udoterr_points(),
                value,
            ),
            endpoint: self
                .endpoint_sizes
                .iter()
                .map(|n| DMatrix::from_element(*n, 1, value))
                .collect(),
            path: self
                .path_sizes
                .iter()
                .map(|n| DMatrix::from_element(*n, self.num_path_points(), value))
                .collect(),
            interp_controls: DMatrix::from_element(
                self.num_controls,
                self.num_interp_control_points(),
                value,
            ),
            projection: DMatrix::from_element(self.num_projection, self.num_mesh_intervals, value),
        }
    }

    /// Visits every column of every block in the flattening order.
    pub fn visit<F: FnMut(Block, usize)>(&self, mut f: F) {
        let n = self.num_points_per_interval;
        let num_paths = self.path_sizes.len();

        for i in 0..self.endpoint_sizes.len() {
            f(Block::Endpoint(i), 0);
        }

        let mut icon = 0;
        for imesh in 0..self.num_mesh_intervals {
            let igrid = imesh * n;

            if self.path_at_interior_points {
                for i in 0..n {
                    for ipc in 0..num_paths {
                        f(Block::Path(ipc), igrid + i);
                    }
                }
            } else {
                for ipc in 0..num_paths {
                    f(Block::Path(ipc), imesh);
                }
            }

            f(Block::Kinematic, imesh);
            if self.projecting {
                for i in 0..n {
                    f(Block::KinematicUdoterr, igrid + i);
                }
            }

            for i in 0..n {
                f(Block::MultibodyResiduals, igrid + i);
                f(Block::AuxiliaryResiduals, igrid + i);
            }

            f(Block::Defects, imesh);

            if self.interpolate_controls {
                for _ in 1..n {
                    f(Block::InterpControls, icon);
                    icon += 1;
                }
            }

            f(Block::Projection, imesh);
        }

        // Final grid point
        let last_grid = self.num_grid_points() - 1;
        let last_path = self.num_path_points() - 1;
        for ipc in 0..num_paths {
            f(Block::Path(ipc), last_path);
        }
        f(Block::Kinematic, self.num_mesh_points() - 1);
        if self.projecting {
            f(Block::KinematicUdoterr, last_grid);
        }
        f(Block::MultibodyResiduals, last_grid);
        f(Block::AuxiliaryResiduals, last_grid);
    }

    fn check_shapes(&self, constraints: &Constraints) -> Result<(), CollocationError> {
        let expected = self.filled(0.0);
        ensure!(
            constraints.endpoint.len() == expected.endpoint.len()
                && constraints.path.len() == expected.path.len(),
            StructuralSnafu {
                msg: "number of endpoint or path constraint blocks does not match the layout"
            }
        );
        for ((block, actual), (_, shape)) in constraints.blocks().into_iter().zip(expected.blocks()) {
            ensure!(
                actual.shape() == shape.shape(),
                StructuralSnafu {
                    msg: format!(
                        "constraint block {block} has shape {:?}, expected {:?}",
                        actual.shape(),
                        shape.shape()
                    )
                }
            );
        }
        Ok(())
    }

    /// Concatenates the columns of every block in the flattening order.
    pub fn flatten(&self, constraints: &Constraints) -> Result<DVector<f64>, CollocationError> {
        self.check_shapes(constraints)?;
        let len = self.len();
        let mut flat = DVector::zeros(len);
        let mut iflat = 0;
        let mut overflow = false;
        self.visit(|block, col| {
            let matrix = constraints.block(block);
            let rows = matrix.nrows();
            if rows == 0 {
                return;
            }
            if iflat + rows > len {
                overflow = true;
                return;
            }
            flat.rows_mut(iflat, rows).copy_from(&matrix.column(col));
            iflat += rows;
        });
        ensure!(
            !overflow && iflat == len,
            StructuralSnafu {
                msg: format!("flattened {iflat} constraints, expected {len}")
            }
        );
        Ok(flat)
    }

    /// Inverse of [`ConstraintLayout::flatten`].
    pub fn expand(&self, flat: &DVector<f64>) -> Result<Constraints, CollocationError> {
        let len = self.len();
        ensure!(
            flat.len() == len,
            StructuralSnafu {
                msg: format!("cannot expand {} values into {len} constraints", flat.len())
            }
        );
        let mut out = self.filled(0.0);
        let mut iflat = 0;
        let mut overflow = false;
        self.visit(|block, col| {
            let matrix = out.block_mut(block);
            let rows = matrix.nrows();
            if rows == 0 {
                return;
            }
            if iflat + rows > len {
                overflow = true;
                return;
            }
            matrix.column_mut(col).copy_from(&flat.rows(iflat, rows));
            iflat += rows;
        });
        ensure!(
            !overflow && iflat == len,
            StructuralSnafu {
                msg: format!("expanded {iflat} constraints, expected {len}")
            }
        );
        Ok(out)
    }
}
