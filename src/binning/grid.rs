//! Regular grid over an N-dimensional Cartesian space.
//!
//! Each axis is cut into equal-width bins, so a point maps to the [`Cell`]
//! holding `floor(x_i / size_i)` on every axis. Two points within distance
//! `r` of each other always share at least one cell from their
//! [`cells_around`](CellGrid::cells_around) sets at radius `r`.

use crate::{MatchError, Result};

use super::Cell;

/// Grid of cells with a fixed width per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    bin_sizes: Box<[f64]>,
}

impl CellGrid {
    /// Create a grid with the given per-axis cell widths.
    ///
    /// Every width must be finite and positive.
    pub fn new(bin_sizes: Vec<f64>) -> Result<Self> {
        if bin_sizes.is_empty() {
            return Err(MatchError::Config("grid needs at least one axis".into()));
        }
        if let Some(bad) = bin_sizes.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(MatchError::Config(format!("invalid grid bin size {bad}")));
        }
        Ok(Self {
            bin_sizes: bin_sizes.into_boxed_slice(),
        })
    }

    /// Grid with the same cell width on each of `ndim` axes.
    pub fn isotropic(ndim: usize, bin_size: f64) -> Result<Self> {
        Self::new(vec![bin_size; ndim])
    }

    pub fn ndim(&self) -> usize {
        self.bin_sizes.len()
    }

    pub fn bin_sizes(&self) -> &[f64] {
        &self.bin_sizes
    }

    /// Cell containing `coords`, or `None` if the dimensionality is wrong or
    /// any coordinate is not finite.
    pub fn cell_of(&self, coords: &[f64]) -> Option<Cell> {
        if coords.len() != self.ndim() || coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let ixs: Vec<i64> = coords
            .iter()
            .zip(self.bin_sizes.iter())
            .map(|(x, size)| (x / size).floor() as i64)
            .collect();
        Some(Cell::from(ixs))
    }

    /// All cells touched by the axis-aligned box of half-width `radius`
    /// around `coords`.
    ///
    /// Returns an empty list if the point cannot be placed on the grid or
    /// the radius is negative or not finite.
    pub fn cells_around(&self, coords: &[f64], radius: f64) -> Vec<Cell> {
        if coords.len() != self.ndim()
            || coords.iter().any(|c| !c.is_finite())
            || !(radius.is_finite() && radius >= 0.0)
        {
            return Vec::new();
        }
        let ranges: Vec<(i64, i64)> = coords
            .iter()
            .zip(self.bin_sizes.iter())
            .map(|(x, size)| {
                (
                    ((x - radius) / size).floor() as i64,
                    ((x + radius) / size).floor() as i64,
                )
            })
            .collect();

        let mut out = Vec::new();
        let mut current: Vec<i64> = ranges.iter().map(|r| r.0).collect();
        // odometer walk over the box of cell indices
        loop {
            out.push(Cell::from(current.clone()));
            let mut axis = 0;
            loop {
                if axis == current.len() {
                    return out;
                }
                if current[axis] < ranges[axis].1 {
                    current[axis] += 1;
                    break;
                }
                current[axis] = ranges[axis].0;
                axis += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_sizes() {
        assert!(CellGrid::new(vec![]).is_err());
        assert!(CellGrid::new(vec![1.0, 0.0]).is_err());
        assert!(CellGrid::new(vec![f64::NAN]).is_err());
        assert!(CellGrid::isotropic(3, 0.5).is_ok());
    }

    #[test]
    fn cell_of_floors_each_axis() {
        let grid = CellGrid::new(vec![1.0, 0.5]).unwrap();
        assert_eq!(grid.cell_of(&[2.7, -0.2]), Some(Cell::from(vec![2, -1])));
        assert_eq!(grid.cell_of(&[0.0, 0.0]), Some(Cell::from(vec![0, 0])));
        assert!(grid.cell_of(&[1.0]).is_none());
        assert!(grid.cell_of(&[f64::NAN, 1.0]).is_none());
    }

    #[test]
    fn cells_around_covers_box() {
        let grid = CellGrid::isotropic(2, 1.0).unwrap();
        let cells = grid.cells_around(&[0.5, 0.5], 0.75);
        // x and y each span cells -1..=1
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&Cell::from(vec![-1, 1])));
        assert!(cells.contains(&Cell::from(vec![0, 0])));

        let single = grid.cells_around(&[0.5, 0.5], 0.1);
        assert_eq!(single, vec![Cell::from(vec![0, 0])]);
        assert!(grid.cells_around(&[0.5, 0.5], -1.0).is_empty());
    }

    #[test]
    fn nearby_points_share_a_cell() {
        let grid = CellGrid::isotropic(3, 0.3).unwrap();
        let a = [1.01, -2.2, 0.149];
        let b = [1.19, -2.05, 0.31];
        let r = 0.2;
        let cells_a = grid.cells_around(&a, r);
        let cell_b = grid.cell_of(&b).unwrap();
        assert!(cells_a.contains(&cell_b));
    }
}
