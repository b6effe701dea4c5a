//! Match kits for points and error ellipses in Cartesian space.

use crate::binning::{Cell, CellGrid};
use crate::ellipse::{match_ellipses, Ellipse};
use crate::policy::ErrorSummation;

use super::MatchKit;

/// A point with an isotropic error radius.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianPoint {
    pub coords: Vec<f64>,
    pub error: f64,
}

impl CartesianPoint {
    pub fn new(coords: Vec<f64>, error: f64) -> Self {
        Self { coords, error }
    }

    /// Squared Euclidean distance, or `None` if the dimensions differ.
    pub fn distance_squared(&self, other: &CartesianPoint) -> Option<f64> {
        if self.coords.len() != other.coords.len() {
            return None;
        }
        Some(
            self.coords
                .iter()
                .zip(&other.coords)
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
        )
    }
}

/// Cartesian match with per-point errors.
///
/// Points bin under every grid cell touched by the box of half-width
/// `error` around them. Two points match when their distance is at most the
/// combination of their errors; the score is that distance as a fraction of
/// the threshold.
#[derive(Debug, Clone)]
pub struct CartesianMatchKit {
    grid: CellGrid,
    summation: ErrorSummation,
}

impl CartesianMatchKit {
    pub fn new(grid: CellGrid, summation: ErrorSummation) -> Self {
        Self { grid, summation }
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }
}

impl MatchKit for CartesianMatchKit {
    type Row = CartesianPoint;
    type Key = Cell;

    fn bins(&self, row: &CartesianPoint) -> Vec<Cell> {
        self.grid.cells_around(&row.coords, row.error)
    }

    fn match_score(&self, a: &CartesianPoint, b: &CartesianPoint) -> Option<f64> {
        let d2 = a.distance_squared(b)?;
        let t2 = self.summation.combine_squared(a.error, b.error);
        if !(d2 <= t2) {
            return None;
        }
        Some(if t2 > 0.0 { (d2 / t2).sqrt() } else { 0.0 })
    }
}

/// Planar match of anisotropic errors: rows are [`Ellipse`]s and match
/// when they overlap, scored by [`match_ellipses`].
///
/// `grid` must be two-dimensional; rows bin under the cells touched by a
/// square of half-width equal to their semi-major axis.
#[derive(Debug, Clone)]
pub struct EllipseMatchKit {
    grid: CellGrid,
    recognise_circles: bool,
}

impl EllipseMatchKit {
    pub fn new(grid: CellGrid, recognise_circles: bool) -> Self {
        Self {
            grid,
            recognise_circles,
        }
    }
}

impl MatchKit for EllipseMatchKit {
    type Row = Ellipse;
    type Key = Cell;

    fn bins(&self, row: &Ellipse) -> Vec<Cell> {
        self.grid.cells_around(&[row.x, row.y], row.max_radius())
    }

    fn match_score(&self, a: &Ellipse, b: &Ellipse) -> Option<f64> {
        match_ellipses(a, b, self.recognise_circles).map(|m| m.score)
    }
}
