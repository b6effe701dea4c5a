//! Two-table pair selection and reference-table multi-pair matching.
//!
//! [`find_pair_matches_by_mode`] runs the pair scan and then applies a
//! [`PairMode`]. [`find_multi_pair_matches`] matches every other table
//! against one reference table and groups the pairs per reference row.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::binning::ObjectBinner;
use crate::config::ScanConfig;
use crate::groups::{
    eliminate_multiple_row_entries, filter_join_groups, missing_singles, table_index,
};
use crate::links::{HashLinkSet, LinkSet, RowLink, RowRef};
use crate::policy::{MultiJoinType, PairMode};
use crate::progress::{ProgressIndicator, ProgressTracker};
use crate::scan::{bin_row_refs, bins_to_links, find_pair_matches, MatchKit, RowSource, TableRef};
use crate::{MatchError, Result};

/// Match two tables and keep the pairs `mode` selects.
///
/// Rows of `table1` get table index 0 and rows of `table2` index 1. For
/// the modes that do not depend on scan direction, the smaller table is
/// binned. [`ScanConfig::best_only`] is ignored; the mode decides.
pub fn find_pair_matches_by_mode<K, T1, T2>(
    kit: &K,
    table1: &T1,
    table2: &T2,
    mode: PairMode,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    T1: RowSource<Row = K::Row> + ?Sized,
    T2: RowSource<Row = K::Row> + ?Sized,
{
    let bin_first = table1.row_count() <= table2.row_count();
    match_pairs(kit, table1, table2, mode, bin_first, config, indicator)
}

/// As [`find_pair_matches_by_mode`], with the binned table chosen by the
/// caller: `table1` if `bin_first`, else `table2`.
pub(crate) fn match_pairs<K, T1, T2>(
    kit: &K,
    table1: &T1,
    table2: &T2,
    mode: PairMode,
    bin_first: bool,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    T1: RowSource<Row = K::Row> + ?Sized,
    T2: RowSource<Row = K::Row> + ?Sized,
{
    info!("Pair match, mode {}", mode);
    let t1 = TableRef::new(0, table1);
    let t2 = TableRef::new(1, table2);
    let every = ScanConfig {
        best_only: false,
        ..config.clone()
    };
    let best = ScanConfig {
        best_only: true,
        ..config.clone()
    };
    let pairs = match mode {
        PairMode::Best1 => return find_pair_matches(kit, t2, t1, &best, indicator),
        PairMode::Best2 => return find_pair_matches(kit, t1, t2, &best, indicator),
        _ if bin_first => find_pair_matches(kit, t1, t2, &every, indicator)?,
        _ => find_pair_matches(kit, t2, t1, &every, indicator)?,
    };
    match mode {
        PairMode::Best => eliminate_multiple_row_entries(pairs, indicator),
        PairMode::Symmetric => keep_symmetric_best(pairs, indicator),
        _ => Ok(pairs),
    }
}

/// Keep only the pairs whose rows are each other's best partner.
///
/// Every input link must be a scored pair. A row's best partner is the
/// one with the lowest score, ties going to the lower link.
pub fn keep_symmetric_best(
    mut pairs: HashLinkSet,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet> {
    let mut sorted: Vec<RowLink> = pairs.drain().collect();
    if let Some(bad) = sorted
        .iter()
        .find(|p| p.size() != 2 || p.score().is_nan())
    {
        return Err(MatchError::Config(format!("expected a scored pair, got {bad}")));
    }
    sorted.sort_unstable_by(|a, b| a.score().total_cmp(&b.score()).then_with(|| a.cmp(b)));

    let tracker = ProgressTracker::new(
        indicator,
        sorted.len() as u64,
        "Selecting mutual best pairs",
    );
    let mut best: FxHashMap<RowRef, usize> = FxHashMap::default();
    let mut result = Ok(());
    for (ipair, pair) in sorted.iter().enumerate() {
        for &r in pair.refs() {
            best.entry(r).or_insert(ipair);
        }
        result = tracker.next_progress();
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;

    let n_in = sorted.len();
    let kept: HashLinkSet = sorted
        .into_iter()
        .enumerate()
        .filter(|(ipair, pair)| pair.refs().iter().all(|r| best.get(r) == Some(ipair)))
        .map(|(_, pair)| pair)
        .collect();
    debug!("Kept {} of {} pairs as mutual best", kept.len(), n_in);
    Ok(kept)
}

/// Match each row of reference table `index0` with its partners in every
/// other table.
///
/// Only pairs with one row from the reference table are considered; rows
/// of two other tables are never compared. Each output link holds one
/// reference row and its partners, with each partner's score kept on the
/// link (see [`RowLink::multi_pair`]). With `best_only`, a reference row
/// keeps only its best partner from each other table. Unmatched rows of
/// [`MultiJoinType::Always`] tables are added as singles, then the result
/// is filtered by `join_types`, one entry per table.
pub fn find_multi_pair_matches<K, S>(
    kit: &K,
    tables: &[&S],
    index0: usize,
    best_only: bool,
    join_types: &[MultiJoinType],
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    if tables.len() < 2 {
        return Err(MatchError::Config(format!(
            "multi-pair matching needs at least two tables, got {}",
            tables.len()
        )));
    }
    if join_types.len() != tables.len() {
        return Err(MatchError::Config(format!(
            "{} join types given for {} tables",
            join_types.len(),
            tables.len()
        )));
    }
    if index0 >= tables.len() {
        return Err(MatchError::Config(format!(
            "reference table {index0} out of range for {} tables",
            tables.len()
        )));
    }
    info!(
        "Multi-pair match of {} tables against table {}",
        tables.len(),
        index0 + 1
    );

    let ref_index = table_index(index0)?;
    let reference = TableRef::new(ref_index, tables[index0]);
    let mut binner = bin_row_refs(kit, reference, config, indicator)?;
    for (itable, &rows) in tables.iter().enumerate() {
        if itable == index0 {
            continue;
        }
        let table = TableRef::new(table_index(itable)?, rows);
        let other = bin_row_refs(kit, table, config, indicator)?;
        // a bin without reference rows cannot produce a pair
        for (key, refs) in other.into_bins() {
            if binner.get(&key).is_some() {
                for r in refs {
                    binner.add_item(key.clone(), r);
                }
            }
        }
    }
    let possible = bins_to_links(binner, indicator)?;
    let partners = score_reference_pairs(possible, kit, tables, ref_index, indicator)?;

    let tracker = ProgressTracker::new(
        indicator,
        partners.len() as u64,
        "Grouping pairs by reference row",
    );
    let mut links = HashLinkSet::with_capacity(partners.len());
    let mut result = Ok(());
    for (reference, found) in partners {
        let found = if best_only { best_per_table(found) } else { found };
        links.add_link(RowLink::multi_pair(reference, found));
        result = tracker.next_progress();
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;

    for (itable, (join_type, rows)) in join_types.iter().zip(tables).enumerate() {
        if *join_type == MultiJoinType::Always {
            let mut singles = missing_singles(&links, table_index(itable)?, rows.row_count());
            for link in singles.drain() {
                links.add_link(link);
            }
        }
    }
    let links = filter_join_groups(links, join_types, indicator)?;
    info!("Multi-pair match found {} groups", links.len());
    Ok(links)
}

/// Score every (reference row, other row) pair in the candidate groups,
/// collecting the matches per reference row.
fn score_reference_pairs<K, S>(
    mut possible: HashLinkSet,
    kit: &K,
    tables: &[&S],
    ref_index: u32,
    indicator: &dyn ProgressIndicator,
) -> Result<FxHashMap<RowRef, Vec<(RowRef, f64)>>>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    let tracker = ProgressTracker::new(indicator, possible.len() as u64, "Locating pairs");
    let mut seen: FxHashSet<(RowRef, RowRef)> = FxHashSet::default();
    let mut partners: FxHashMap<RowRef, Vec<(RowRef, f64)>> = FxHashMap::default();
    let result = possible.drain().try_for_each(|link| {
        let (refs0, others): (Vec<RowRef>, Vec<RowRef>) = link
            .refs()
            .iter()
            .copied()
            .partition(|r| r.table_index == ref_index);
        if !others.is_empty() {
            for &r0 in &refs0 {
                let row0 = fetch_row(tables, r0)?;
                for &r1 in &others {
                    if !seen.insert((r0, r1)) {
                        continue;
                    }
                    let row1 = fetch_row(tables, r1)?;
                    if let Some(score) = kit.match_score(&row0, &row1) {
                        partners.entry(r0).or_default().push((r1, score));
                    }
                }
            }
        }
        tracker.next_progress()
    });
    tracker.finish(result)?;
    debug!("{} reference rows have partners", partners.len());
    Ok(partners)
}

/// The lowest-scoring partner from each table.
fn best_per_table(mut found: Vec<(RowRef, f64)>) -> Vec<(RowRef, f64)> {
    found.sort_by(|a, b| {
        a.0.table_index
            .cmp(&b.0.table_index)
            .then(a.1.total_cmp(&b.1))
            .then(a.0.cmp(&b.0))
    });
    found.dedup_by_key(|(r, _)| r.table_index);
    found
}

fn fetch_row<S: RowSource + ?Sized>(tables: &[&S], r: RowRef) -> Result<S::Row> {
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
}
