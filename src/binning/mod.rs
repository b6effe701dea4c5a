//! Candidate partitioning: bin keys and the binners that collect rows
//! under them.
//!
//! Rows are only ever compared with rows that share a bin, so the choice of
//! key (a grid [`Cell`] or a sky pixel index) decides how much work the
//! pair scan does.

mod binner;
mod cell;
mod grid;
mod long_binner;

pub use binner::{MapBinner, ObjectBinner};
pub use cell::Cell;
pub use grid::CellGrid;
pub use long_binner::{CompactLongBinner, LongBinner, MapLongBinner, RowIndexBinner};
