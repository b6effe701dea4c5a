//! Parallel binning and pair-scanning passes.
//!
//! Each pass splits the rows of a table into consecutive chunks of
//! [`ScanConfig::rows_per_chunk`] rows. A worker builds its own binner or
//! link set for each chunk and the partial results are combined in chunk
//! order, so the output does not depend on how rayon schedules the work.

use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::binning::{LongBinner, MapBinner, ObjectBinner, RowIndexBinner};
use crate::config::ScanConfig;
use crate::links::{HashLinkSet, LinkSet, RowLink, RowRef};
use crate::progress::{ProgressIndicator, ProgressTracker};
use crate::{MatchError, Result};

use super::{MatchKit, RowSource, TableRef};

/// Split `0..n_rows` into consecutive ranges of at most `chunk` rows.
pub(crate) fn chunk_ranges(n_rows: u64, chunk: usize) -> Vec<Range<u64>> {
    let step = chunk as u64;
    (0..n_rows.div_ceil(step))
        .map(|i| i * step..((i + 1) * step).min(n_rows))
        .collect()
}

/// Bin every row of a table by the kit's match keys, storing row indices.
///
/// Per bin, row indices appear in ascending order.
pub fn bin_row_indices<K, S>(
    kit: &K,
    rows: &S,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<RowIndexBinner<K::Key>>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let n_rows = rows.row_count();
    let tracker = ProgressTracker::new(indicator, n_rows, "Binning rows");
    let result = chunk_ranges(n_rows, config.chunk_len())
        .into_par_iter()
        .map(|range| -> Result<RowIndexBinner<K::Key>> {
            let mut binner = RowIndexBinner::for_row_count(n_rows);
            for irow in range {
                let row = rows.row(irow);
                for key in kit.bins(&row) {
                    binner.add_item(key, irow);
                }
                tracker.next_progress()?;
            }
            Ok(binner)
        })
        .try_reduce(
            || RowIndexBinner::for_row_count(n_rows),
            |a, b| Ok(a.combine(b)),
        );
    let binner = tracker.finish(result)?;
    debug!(
        "Binned {} rows: {} refs in {} bins",
        n_rows,
        binner.item_count(),
        binner.bin_count()
    );
    Ok(binner)
}

/// Bin every row of a table by the kit's match keys, storing [`RowRef`]s
/// tagged with `table.index`.
///
/// Binners from several tables can be merged with
/// [`ObjectBinner::add_content`] before calling [`bins_to_links`].
pub fn bin_row_refs<K, S>(
    kit: &K,
    table: TableRef<'_, S>,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<MapBinner<K::Key, RowRef>>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let n_rows = table.rows.row_count();
    let tracker = ProgressTracker::new(
        indicator,
        n_rows,
        &format!("Binning rows for table {}", table.index + 1),
    );
    let result = chunk_ranges(n_rows, config.chunk_len())
        .into_par_iter()
        .map(|range| -> Result<MapBinner<K::Key, RowRef>> {
            let mut binner = MapBinner::new();
            for irow in range {
                let row = table.rows.row(irow);
                let rref = RowRef::new(table.index, irow);
                for key in kit.bins(&row) {
                    binner.add_item(key, rref);
                }
                tracker.next_progress()?;
            }
            Ok(binner)
        })
        .try_reduce(MapBinner::new, |a, b| Ok(a.combine(b)));
    let binner = tracker.finish(result)?;
    debug!(
        "Table {}: {} row refs in {} bins",
        table.index,
        binner.item_count(),
        binner.bin_count()
    );
    Ok(binner)
}

/// Turn each bin holding more than one ref into a candidate group link.
///
/// The binner is consumed as it is walked.
pub fn bins_to_links<Key>(
    binner: MapBinner<Key, RowRef>,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    Key: std::hash::Hash + Eq,
{
    let n_items = binner.item_count();
    let n_bins = binner.bin_count();
    if n_bins > 0 {
        indicator.log_message(&format!(
            "{} row refs in {} bins (average bin occupancy {:.2})",
            n_items,
            n_bins,
            n_items as f64 / n_bins as f64
        ));
    }
    let tracker = ProgressTracker::new(
        indicator,
        n_bins as u64,
        "Consolidating potential match groups",
    );
    let mut links = HashLinkSet::new();
    let mut result = Ok(());
    for (_, refs) in binner.into_bins() {
        if refs.len() > 1 {
            if let Some(link) = RowLink::from_refs(refs) {
                links.add_link(link);
            }
        }
        result = tracker.next_progress();
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;
    debug!("{} candidate groups", links.len());
    Ok(links)
}

/// Scan table S against the binned rows of table R for scored pairs.
///
/// For each row of S, every R row sharing one of its bins is scored with
/// the kit. All matching partners are kept, or only the best-scoring one
/// when [`ScanConfig::best_only`] is set. If R and S are the same table, a
/// row is never paired with itself.
pub fn scan_bins_for_pairs<K, R, S>(
    kit: &K,
    table_r: TableRef<'_, R>,
    binner_r: &RowIndexBinner<K::Key>,
    table_s: TableRef<'_, S>,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    R: RowSource<Row = K::Row> + ?Sized,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let n_rows = table_s.rows.row_count();
    let same_table = table_r.index == table_s.index;
    let tracker = ProgressTracker::new(indicator, n_rows, "Scanning rows for pairs");
    let result = chunk_ranges(n_rows, config.chunk_len())
        .into_par_iter()
        .map(|range| -> Result<HashLinkSet> {
            let mut links = HashLinkSet::new();
            let mut candidates: Vec<u64> = Vec::new();
            for is in range {
                let row_s = table_s.rows.row(is);
                candidates.clear();
                for key in kit.bins(&row_s) {
                    binner_r.for_each_in(&key, |ir| candidates.push(ir));
                }
                candidates.sort_unstable();
                candidates.dedup();

                let ref_s = RowRef::new(table_s.index, is);
                let mut best: Option<(u64, f64)> = None;
                for &ir in &candidates {
                    if same_table && ir == is {
                        continue;
                    }
                    let row_r = table_r.rows.row(ir);
                    let Some(score) = kit.match_score(&row_s, &row_r) else {
                        continue;
                    };
                    if config.best_only {
                        if best.is_none_or(|(_, best_score)| score < best_score) {
                            best = Some((ir, score));
                        }
                    } else {
                        let ref_r = RowRef::new(table_r.index, ir);
                        links.add_link(RowLink::scored_pair(ref_r, ref_s, score));
                    }
                }
                if let Some((ir, score)) = best {
                    let ref_r = RowRef::new(table_r.index, ir);
                    links.add_link(RowLink::scored_pair(ref_r, ref_s, score));
                }
                tracker.next_progress()?;
            }
            Ok(links)
        })
        .try_reduce(HashLinkSet::new, |mut a, mut b| {
            for link in b.drain() {
                a.add_link(link);
            }
            Ok(a)
        });
    let links = tracker.finish(result)?;
    debug!(
        "Scanned {} rows of table {} against table {}: {} pairs",
        n_rows,
        table_s.index,
        table_r.index,
        links.len()
    );
    Ok(links)
}

/// Match two tables: bin table R, then scan table S against it.
///
/// The result holds scored pairs with one ref from each table.
pub fn find_pair_matches<K, R, S>(
    kit: &K,
    table_r: TableRef<'_, R>,
    table_s: TableRef<'_, S>,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    R: RowSource<Row = K::Row> + ?Sized,
    S: RowSource<Row = K::Row> + ?Sized,
{
    info!(
        "Pair match: {} rows against {} rows",
        table_s.rows.row_count(),
        table_r.rows.row_count()
    );
    let binner_r = bin_row_indices(kit, table_r.rows, config, indicator)?;
    scan_bins_for_pairs(kit, table_r, &binner_r, table_s, config, indicator)
}

/// Test every pair of rows inside each candidate group.
///
/// `possible` is consumed as it is walked. Rows are fetched from
/// `tables[ref.table_index]`; a ref naming a table outside `tables` is a
/// configuration error.
pub fn find_pairs<K, S>(
    mut possible: HashLinkSet,
    kit: &K,
    tables: &[&S],
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let tracker = ProgressTracker::new(indicator, possible.len() as u64, "Locating pairs");
    let mut pairs = HashLinkSet::new();
    let result = possible.drain().try_for_each(|link| {
        if link.size() > 1 {
            let rows = link
                .refs()
                .iter()
                .map(|r| {
                    tables
                        .get(r.table_index as usize)
                        .map(|table| table.row(r.row_index))
                        .ok_or_else(|| {
                            MatchError::Config(format!(
                                "row ref {r} names table {} of {}",
                                r.table_index,
                                tables.len()
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            for i in 0..rows.len() {
                for j in 0..i {
                    let pair = RowLink::pair(link.get_ref(i), link.get_ref(j));
                    if pairs.contains_link(&pair) {
                        continue;
                    }
                    if let Some(score) = kit.match_score(&rows[i], &rows[j]) {
                        pairs.add_link(pair.with_score(score));
                    }
                }
            }
        }
        tracker.next_progress()
    });
    tracker.finish(result)?;
    debug!("Located {} pairs", pairs.len());
    Ok(pairs)
}
