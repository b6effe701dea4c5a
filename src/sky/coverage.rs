//! Restricting a sky match to the region the tables have in common.
//!
//! Before a sky pair match the pixels each table's rows bin into are read
//! into a [`MocMask`] per table. The intersection of the masks is the only
//! place a match can happen: if it is empty the match is skipped, otherwise
//! the kit is restricted to it and the table with fewer rows inside it is
//! the one binned.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ScanConfig;
use crate::links::HashLinkSet;
use crate::pairs::match_pairs;
use crate::policy::PairMode;
use crate::progress::{ProgressIndicator, ProgressTracker};
use crate::scan::{chunk_ranges, MatchKit, RowSource, TableRef};
use crate::Result;

use super::mask::{HealpixMask, MocMask, PixelTester};

/// A sky match kit whose bins are HEALPix pixels at a known order and which
/// can be confined to a footprint.
pub trait SkyCoverageKit: MatchKit<Key = u64> + Clone {
    /// Order of the pixel indices returned by [`MatchKit::bins`].
    fn pixel_order(&self) -> u8;

    /// Copy of this kit that drops every bin outside `footprint`.
    fn restricted_to(&self, footprint: PixelTester) -> Self;
}

/// Sky coverage of a table: every pixel any of its rows bins into.
pub fn read_coverage<K, S>(
    kit: &K,
    table: TableRef<'_, S>,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<MocMask>
where
    K: SkyCoverageKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let n_rows = table.rows.row_count();
    let order = kit.pixel_order();
    let tracker = ProgressTracker::new(
        indicator,
        n_rows,
        &format!("Reading coverage for table {}", table.index + 1),
    );
    let result = chunk_ranges(n_rows, config.chunk_len())
        .into_par_iter()
        .map(|range| -> Result<MocMask> {
            let mut mask = MocMask::new();
            for irow in range {
                for pixel in kit.bins(&table.rows.row(irow)) {
                    mask.add_pixel(order, pixel)?;
                }
                tracker.next_progress()?;
            }
            Ok(mask)
        })
        .try_reduce(MocMask::new, |mut a, b| {
            a.union(&b);
            Ok(a)
        });
    let mask = tracker.finish(result)?;
    debug!(
        "Table {} covers {:.3e} of the sky",
        table.index,
        mask.sky_fraction()
    );
    Ok(mask)
}

/// Number of rows with at least one bin inside `footprint`.
pub fn count_rows_in_footprint<K, S>(
    kit: &K,
    table: TableRef<'_, S>,
    footprint: &PixelTester,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<u64>
where
    K: SkyCoverageKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let n_rows = table.rows.row_count();
    let order = kit.pixel_order();
    let tracker = ProgressTracker::new(
        indicator,
        n_rows,
        &format!("Counting rows in match region for table {}", table.index + 1),
    );
    let result = chunk_ranges(n_rows, config.chunk_len())
        .into_par_iter()
        .map(|range| -> Result<u64> {
            let mut n_in = 0;
            for irow in range {
                let bins = kit.bins(&table.rows.row(irow));
                if bins.iter().any(|&p| footprint.contains_pixel(order, p)) {
                    n_in += 1;
                }
                tracker.next_progress()?;
            }
            Ok(n_in)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b));
    let n_in = tracker.finish(result)?;
    indicator.log_message(&format!("{n_in} rows in match region"));
    Ok(n_in)
}

/// Pair match of two sky tables confined to their common coverage.
///
/// Gives the same pairs as
/// [`find_pair_matches_by_mode`](crate::find_pair_matches_by_mode) on the
/// unrestricted kit, but rows outside the common region are never binned,
/// and tables that do not overlap at all are not scanned.
pub fn find_sky_pair_matches<K, T1, T2>(
    kit: &K,
    table1: &T1,
    table2: &T2,
    mode: PairMode,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: SkyCoverageKit,
    T1: RowSource<Row = K::Row> + ?Sized,
    T2: RowSource<Row = K::Row> + ?Sized,
{
    let t1 = TableRef::new(0, table1);
    let t2 = TableRef::new(1, table2);
    indicator.log_message("Attempt to locate restricted common region");
    let mut region = read_coverage(kit, t1, config, indicator)?;
    region.intersection(&read_coverage(kit, t2, config, indicator)?);
    if region.is_empty() {
        indicator.log_message("No region overlap - matches not possible");
        info!("Tables share no sky region, no pairs possible");
        return Ok(HashLinkSet::new());
    }
    indicator.log_message(&format!(
        "Potential match region covers {:.4}% of the sky",
        100.0 * region.sky_fraction()
    ));

    let footprint = region.create_pixel_tester();
    let n1 = count_rows_in_footprint(kit, t1, &footprint, config, indicator)?;
    let n2 = count_rows_in_footprint(kit, t2, &footprint, config, indicator)?;
    for (n_in, n_rows) in [(n1, table1.row_count()), (n2, table2.row_count())] {
        indicator.log_message(&format!(
            "{}/{} rows excluded (out of match region)",
            n_rows - n_in,
            n_rows
        ));
    }
    let restricted = kit.restricted_to(footprint);
    match_pairs(&restricted, table1, table2, mode, n1 < n2, config, indicator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkSet;
    use crate::pairs::find_pair_matches_by_mode;
    use crate::policy::ErrorSummation;
    use crate::sky::{HealpixSkyPixellator, SkyMatchKit, SkyPosition};
    use std::sync::Mutex;

    const ARCSEC: f64 = std::f64::consts::PI / 180.0 / 3600.0;

    #[derive(Default)]
    struct Messages(Mutex<Vec<String>>);

    impl ProgressIndicator for Messages {
        fn start_stage(&self, _name: &str) {}
        fn set_level(&self, _level: f64) -> Result<()> {
            Ok(())
        }
        fn end_stage(&self) {}
        fn log_message(&self, msg: &str) {
            self.0.lock().unwrap().push(msg.to_string());
        }
    }

    /// `n` by `n` grid of positions 20 arcsec apart starting at (`ra`, `dec`).
    fn grid(ra: f64, dec: f64, n: usize) -> Vec<SkyPosition> {
        let mut rows = Vec::new();
        for i in 0..n {
            for j in 0..n {
                rows.push(SkyPosition::new(
                    ra + (i as f64) * 20.0 * ARCSEC,
                    dec + (j as f64) * 20.0 * ARCSEC,
                    3.0 * ARCSEC,
                ));
            }
        }
        rows
    }

    fn kit() -> SkyMatchKit {
        SkyMatchKit::new(&HealpixSkyPixellator::new(6.0 * ARCSEC), ErrorSummation::Simple)
            .unwrap()
    }

    #[test]
    fn coverage_holds_every_row_pixel() {
        let kit = kit();
        let rows = grid(1.0, 0.2, 5);
        let config = ScanConfig {
            rows_per_chunk: 4,
            ..Default::default()
        };
        let mask = read_coverage(&kit, TableRef::new(0, &rows), &config, &Messages::default())
            .unwrap();
        assert!(!mask.is_empty());
        let tester = mask.create_pixel_tester();
        for row in &rows {
            for p in kit.bins(row) {
                assert!(tester.contains_pixel(kit.pixel_order(), p));
            }
        }
        let far = SkyPosition::new(4.0, -0.8, 3.0 * ARCSEC);
        assert!(kit
            .bins(&far)
            .iter()
            .all(|&p| !tester.contains_pixel(kit.pixel_order(), p)));
    }

    #[test]
    fn disjoint_tables_skip_the_scan() {
        let left = grid(1.0, 0.2, 6);
        let right = grid(3.0, -0.4, 6);
        let messages = Messages::default();
        let pairs = find_sky_pair_matches(
            &kit(),
            &left,
            &right,
            PairMode::All,
            &ScanConfig::default(),
            &messages,
        )
        .unwrap();
        assert!(pairs.is_empty());
        let log = messages.0.lock().unwrap();
        assert!(log.iter().any(|m| m == "No region overlap - matches not possible"));
        assert!(!log.iter().any(|m| m.contains("rows in match region")));
    }

    #[test]
    fn restricted_match_agrees_with_full_match() {
        let kit = kit();
        let left = grid(1.0, 0.2, 12);
        // half the columns overlap the left grid, offset by 1.5 arcsec
        let right = grid(1.0 + 120.0 * ARCSEC + 1.5 * ARCSEC, 0.2, 12);
        let config = ScanConfig::default();
        for mode in [PairMode::All, PairMode::Best, PairMode::Best1, PairMode::Symmetric] {
            let messages = Messages::default();
            let restricted =
                find_sky_pair_matches(&kit, &left, &right, mode, &config, &messages).unwrap();
            let full =
                find_pair_matches_by_mode(&kit, &left, &right, mode, &config, &messages).unwrap();
            assert!(!restricted.is_empty());
            assert_eq!(restricted.into_sorted(), full.into_sorted(), "{mode}");
        }
    }

    #[test]
    fn rows_outside_region_are_counted_out() {
        let kit = kit();
        let left = grid(1.0, 0.2, 4);
        let mut region = MocMask::new();
        for p in kit.bins(&left[0]) {
            region.add_pixel(kit.pixel_order(), p).unwrap();
        }
        let footprint = region.create_pixel_tester();
        let messages = Messages::default();
        let n_in = count_rows_in_footprint(
            &kit,
            TableRef::new(0, &left),
            &footprint,
            &ScanConfig::default(),
            &messages,
        )
        .unwrap();
        assert!(n_in >= 1 && n_in < left.len() as u64);
        let restricted = kit.restricted_to(footprint);
        assert!(!restricted.bins(&left[0]).is_empty());
        assert!(restricted.bins(&left[left.len() - 1]).is_empty());
    }
}
