//! Candidate scanning: the parallel passes that bin rows by match key and
//! turn shared bins into scored pair links.
//!
//! Table storage stays outside the crate. A table is anything implementing
//! [`RowSource`]; the matching criteria are a [`MatchKit`], which says
//! which bins a row falls in and how well two rows match.

mod cartesian;
mod passes;

use std::hash::Hash;

pub use cartesian::{CartesianMatchKit, CartesianPoint, EllipseMatchKit};
pub(crate) use passes::chunk_ranges;
pub use passes::{
    bin_row_indices, bin_row_refs, bins_to_links, find_pair_matches, find_pairs,
    scan_bins_for_pairs,
};

/// Random-access source of rows for one table.
pub trait RowSource: Sync {
    type Row;

    fn row_count(&self) -> u64;

    /// The row at `index`, for `index < row_count()`.
    fn row(&self, index: u64) -> Self::Row;
}

impl<T: Clone + Sync> RowSource for [T] {
    type Row = T;

    fn row_count(&self) -> u64 {
        self.len() as u64
    }

    fn row(&self, index: u64) -> T {
        self[index as usize].clone()
    }
}

impl<T: Clone + Sync> RowSource for Vec<T> {
    type Row = T;

    fn row_count(&self) -> u64 {
        self.len() as u64
    }

    fn row(&self, index: u64) -> T {
        self[index as usize].clone()
    }
}

/// Matching criteria for one kind of row.
///
/// A kit must be consistent: if `match_score(a, b)` is `Some`, then
/// `bins(a)` and `bins(b)` share at least one key. Kits are shared by the
/// worker threads of a pass, hence `Sync`.
pub trait MatchKit: Sync {
    type Row;
    type Key: Hash + Eq + Clone + Send + Sync;

    /// Keys of every bin in which a match for `row` could be found.
    /// An empty list means the row can match nothing.
    fn bins(&self, row: &Self::Row) -> Vec<Self::Key>;

    /// Score of the match between two rows, or `None` if they do not match.
    /// Scores are non-negative; lower is better.
    fn match_score(&self, a: &Self::Row, b: &Self::Row) -> Option<f64>;
}

/// A table's index within the match together with its rows.
#[derive(Debug)]
pub struct TableRef<'a, S: ?Sized> {
    pub index: u32,
    pub rows: &'a S,
}

impl<'a, S: ?Sized> TableRef<'a, S> {
    pub fn new(index: u32, rows: &'a S) -> Self {
        Self { index, rows }
    }
}

impl<S: ?Sized> Clone for TableRef<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for TableRef<'_, S> {}
