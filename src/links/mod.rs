//! Match-group data model.
//!
//! A [`RowRef`] names one row of one table, a [`RowLink`] groups the rows
//! believed to be the same object, and a [`LinkSet`] accumulates links over
//! a matching run and hands them out in canonical order at the end.

mod linkset;
mod rowlink;
mod rowref;

pub use linkset::{HashLinkSet, LinkSet, TreeLinkSet};
pub use rowlink::{LinkShape, RowLink};
pub use rowref::RowRef;
