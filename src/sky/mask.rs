//! Sky coverage masks built from HEALPix pixels.
//!
//! A mask records which parts of the sky a catalog covers. Masks from
//! several catalogs are intersected to find their common footprint, then
//! frozen into a [`PixelTester`] that worker threads consult while binning
//! rows: a row whose pixels all fall outside the footprint cannot match.
//!
//! Coverage is held as a `cdshealpix` BMOC at order 29, the nested scheme's
//! finest level, so pixels of mixed orders combine without conversion.
//! Unions and intersections are the BMOC `or` and `and` operations.

use std::ops::Range;
use std::sync::Arc;

use cdshealpix::nested::bmoc::{BMOCBuilderFixedDepth, BMOC};

use crate::{MatchError, Result};

use super::pixellator::{pixel_count, MAX_ORDER};

/// Number of order-29 pixels on the whole sky.
const FULL_SKY: u64 = 12 << (2 * MAX_ORDER as u32);

/// Smallest number of buffered pixels merged into the MOC at once.
const MIN_FLUSH: usize = 4096;

/// Mutable sky-coverage set.
///
/// Building a mask (`add_pixel`, `union`, `intersection`) is single-threaded;
/// concurrent readers use the [`PixelTester`] from
/// [`create_pixel_tester`](Self::create_pixel_tester).
pub trait HealpixMask: Default + Clone {
    /// True iff no pixel is covered.
    fn is_empty(&self) -> bool;

    /// Fraction of the sky covered, in `[0, 1]`.
    fn sky_fraction(&self) -> f64;

    /// Add the nested pixel `index` at `order`.
    ///
    /// An order above 29 or an index beyond the pixel count of the order
    /// is a configuration error.
    fn add_pixel(&mut self, order: u8, index: u64) -> Result<()>;

    /// Extend this mask with everything `other` covers.
    ///
    /// Precondition: `other` uses the same tessellation scheme as `self`.
    /// This is not checked.
    fn union(&mut self, other: &Self);

    /// Restrict this mask to what `other` also covers.
    ///
    /// Precondition: `other` uses the same tessellation scheme as `self`.
    /// This is not checked.
    fn intersection(&mut self, other: &Self);

    /// Frozen, thread-safe snapshot of the current coverage.
    fn create_pixel_tester(&self) -> PixelTester;
}

/// [`HealpixMask`] backed by a BMOC.
///
/// Added pixels are buffered and merged into the MOC in batches no smaller
/// than the MOC itself, so a long run of `add_pixel` calls stays cheap.
/// Every `MocMask` uses the nested scheme, so the union/intersection
/// precondition holds by construction.
#[derive(Debug, Clone)]
pub struct MocMask {
    moc: Arc<BMOC>,
    pending: Vec<(u8, u64)>,
}

impl Default for MocMask {
    fn default() -> Self {
        Self {
            moc: Arc::new(BMOC::new_empty(MAX_ORDER)),
            pending: Vec::new(),
        }
    }
}

impl MocMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask covering the whole sky.
    pub fn full_sky() -> Self {
        Self {
            moc: Arc::new(BMOC::new_allsky(MAX_ORDER)),
            pending: Vec::new(),
        }
    }

    /// Number of disjoint, non-adjacent order-29 ranges covered.
    pub fn range_count(&self) -> usize {
        self.covered().to_ranges().len()
    }

    /// True if the pixel overlaps the covered area.
    pub fn contains_pixel(&self, order: u8, index: u64) -> bool {
        self.create_pixel_tester().contains_pixel(order, index)
    }

    /// Merge the buffered pixels into the MOC.
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.pending);
        let added = pixels_to_moc(&mut pending);
        self.moc = Arc::new(self.moc.or(&added));
    }

    /// The MOC including buffered pixels, without touching `self`.
    fn covered(&self) -> Arc<BMOC> {
        if self.pending.is_empty() {
            return Arc::clone(&self.moc);
        }
        let mut pending = self.pending.clone();
        Arc::new(self.moc.or(&pixels_to_moc(&mut pending)))
    }
}

impl PartialEq for MocMask {
    fn eq(&self, other: &Self) -> bool {
        self.covered().to_ranges() == other.covered().to_ranges()
    }
}

impl Eq for MocMask {}

impl HealpixMask for MocMask {
    fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.moc.size() == 0
    }

    fn sky_fraction(&self) -> f64 {
        let covered: u64 = order29_ranges(&self.covered())
            .iter()
            .map(|r| r.end - r.start)
            .sum();
        covered as f64 / FULL_SKY as f64
    }

    fn add_pixel(&mut self, order: u8, index: u64) -> Result<()> {
        if pixel_range(order, index).is_none() {
            return Err(MatchError::Config(format!(
                "no HEALPix pixel {index} at order {order}"
            )));
        }
        self.pending.push((order, index));
        if self.pending.len() >= MIN_FLUSH.max(self.moc.size()) {
            self.flush();
        }
        Ok(())
    }

    fn union(&mut self, other: &Self) {
        self.flush();
        self.moc = Arc::new(self.moc.or(&other.covered()));
    }

    fn intersection(&mut self, other: &Self) {
        self.flush();
        self.moc = Arc::new(self.moc.and(&other.covered()));
    }

    fn create_pixel_tester(&self) -> PixelTester {
        PixelTester {
            ranges: order29_ranges(&self.covered()).into(),
        }
    }
}

/// Build a MOC from pixels of any orders. Sorts `pixels` in place.
fn pixels_to_moc(pixels: &mut [(u8, u64)]) -> BMOC {
    pixels.sort_unstable();
    let mut moc = BMOC::new_empty(MAX_ORDER);
    for run in pixels.chunk_by(|a, b| a.0 == b.0) {
        let order = run[0].0;
        let mut builder = BMOCBuilderFixedDepth::with_capacity(order, true, run.len() + 1);
        for &(_, index) in run {
            builder.push(index);
        }
        if let Some(part) = builder.to_bmoc() {
            moc = moc.or(&part);
        }
    }
    moc
}

/// Ranges of order-29 indices covered by `moc`.
fn order29_ranges(moc: &BMOC) -> Vec<Range<u64>> {
    let shift = 2 * u32::from(MAX_ORDER - moc.get_depth_max());
    moc.to_ranges()
        .iter()
        .map(|r| (r.start << shift)..(r.end << shift))
        .collect()
}

/// Immutable, shareable predicate over HEALPix pixels.
///
/// Cloning is cheap and the tester may be used from any number of threads.
#[derive(Debug, Clone)]
pub struct PixelTester {
    ranges: Arc<[Range<u64>]>,
}

impl PixelTester {
    /// Tester accepting every pixel.
    pub fn all_sky() -> Self {
        Self {
            ranges: Arc::from(vec![0..FULL_SKY]),
        }
    }

    /// True if the pixel may overlap the covered area.
    pub fn contains_pixel(&self, order: u8, index: u64) -> bool {
        let Some((start, end)) = pixel_range(order, index) else {
            return false;
        };
        let idx = self.ranges.partition_point(|r| r.start < end);
        idx > 0 && self.ranges[idx - 1].end > start
    }
}

/// Order-29 index range `[start, end)` spanned by a pixel.
fn pixel_range(order: u8, index: u64) -> Option<(u64, u64)> {
    if order > MAX_ORDER || index >= pixel_count(order) {
        return None;
    }
    let shift = 2 * u32::from(MAX_ORDER - order);
    Some((index << shift, (index + 1) << shift))
}
