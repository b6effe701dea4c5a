//! # skyjoin
//!
//! The computational core of a catalog **crossmatch**: given several tables of
//! rows (sky positions, Cartesian points, or anything a [`MatchKit`] can
//! score), find the groups of rows that describe the same object.
//!
//! Table storage, row parsing and output formatting live outside the crate.
//! Rows are read through the [`RowSource`] trait and results come back as
//! [`RowLink`]s naming `(table, row)` pairs.
//!
//! ## Example
//!
//! ```no_run
//! use skyjoin::{
//!     find_pair_matches, ErrorSummation, HealpixSkyPixellator, LinkSet,
//!     NullProgressIndicator, ScanConfig, SkyMatchKit, SkyPosition, TableRef,
//! };
//!
//! let arcsec = (1.0_f64 / 3600.0).to_radians();
//! let left = vec![SkyPosition::new(1.0, 0.5, 2.0 * arcsec)];
//! let right = vec![SkyPosition::new(1.0, 0.5 + arcsec, 2.0 * arcsec)];
//!
//! let pixellator = HealpixSkyPixellator::new(2.0 * arcsec);
//! let kit = SkyMatchKit::new(&pixellator, ErrorSummation::Simple).unwrap();
//! let pairs = find_pair_matches(
//!     &kit,
//!     TableRef::new(0, &left),
//!     TableRef::new(1, &right),
//!     &ScanConfig::default(),
//!     &NullProgressIndicator,
//! )
//! .unwrap();
//! for link in pairs.into_sorted() {
//!     println!("{link} score {:.3}", link.score());
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Binning**: every row is placed in the bins (grid cells or HEALPix
//!    pixels) covered by its error region. Rows in different bins can never
//!    match.
//! 2. **Pair scan**: rows sharing a bin are scored against each other in
//!    parallel, producing scored pair links.
//! 3. **Post-processing**: pairs are reduced according to a [`PairMode`],
//!    grouped around the rows of a reference table, or agglomerated into
//!    groups with at most one row per table, then filtered by per-table
//!    [`MultiJoinType`] constraints.
//!
//! Sky pair matches can first intersect the tables' HEALPix coverage so
//! that rows outside the shared region are never binned
//! ([`find_sky_pair_matches`]).
//!
//! Long passes report through a [`ProgressIndicator`], which may also cancel
//! the run.

pub mod binning;
mod config;
pub mod ellipse;
mod error;
pub mod groups;
pub mod links;
pub mod optimise;
pub mod pairs;
mod policy;
pub mod progress;
pub mod scan;
pub mod sky;

pub use binning::{Cell, CellGrid, LongBinner, MapBinner, ObjectBinner, RowIndexBinner};
pub use config::{OptimiserConfig, ScanConfig};
pub use ellipse::{match_ellipses, Ellipse, EllipseMatch};
pub use error::{MatchError, Result};
pub use groups::{
    agglomerate_links, eliminate_internal_links, eliminate_multiple_row_entries,
    filter_join_groups, find_group_matches, find_internal_matches, missing_singles,
};
pub use links::{HashLinkSet, LinkSet, LinkShape, RowLink, RowRef, TreeLinkSet};
pub use optimise::{AngleOptimiser, ExtremumKind};
pub use pairs::{find_multi_pair_matches, find_pair_matches_by_mode, keep_symmetric_best};
pub use policy::{ErrorSummation, MultiJoinType, PairMode};
pub use progress::{NullProgressIndicator, ProgressIndicator, ProgressTracker};
pub use scan::{
    find_pair_matches, CartesianMatchKit, CartesianPoint, EllipseMatchKit, MatchKit, RowSource,
    TableRef,
};
pub use sky::{
    find_sky_pair_matches, FixedSkyMatchKit, HealpixMask, HealpixSkyPixellator, MocMask,
    PixelTester, SkyCoverageKit, SkyEllipse, SkyEllipseMatchKit, SkyMatchKit, SkyPixellator,
    SkyPosition,
};
