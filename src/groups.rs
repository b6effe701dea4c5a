//! Link post-processing and the multi-table and internal match pipelines.
//!
//! The scanning passes in [`crate::scan`] produce scored pairs. The
//! functions here turn those pairs into the final result: mutually
//! exclusive groups, at most one row per table, filtered by per-table
//! [`MultiJoinType`] constraints.

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::binning::{MapBinner, ObjectBinner};
use crate::config::ScanConfig;
use crate::links::{HashLinkSet, LinkSet, RowLink, RowRef};
use crate::policy::MultiJoinType;
use crate::progress::{ProgressIndicator, ProgressTracker};
use crate::scan::{bin_row_refs, bins_to_links, find_pairs, MatchKit, RowSource, TableRef};
use crate::{MatchError, Result};

/// Merge links that share rows into disjoint groups.
///
/// Every row present in the input appears in exactly one output link, whose
/// members form a connected graph under the input links. Links that share
/// no row with any other link are copied across unchanged, keeping their
/// scores.
pub fn agglomerate_links(
    mut links: HashLinkSet,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet> {
    let links: Vec<RowLink> = links.drain().collect();

    let tracker = ProgressTracker::new(indicator, links.len() as u64, "Mapping rows to links");
    let mut ref_binner: MapBinner<RowRef, usize> = MapBinner::new();
    let result = links.iter().enumerate().try_for_each(|(ilink, link)| {
        for &r in link.refs() {
            ref_binner.add_item(r, ilink);
        }
        tracker.next_progress()
    });
    tracker.finish(result)?;

    let tracker = ProgressTracker::new(
        indicator,
        links.len() as u64,
        "Identifying isolated links",
    );
    let mut isolated = vec![false; links.len()];
    let result = links.iter().enumerate().try_for_each(|(ilink, link)| {
        let alone = link
            .refs()
            .iter()
            .all(|r| ref_binner.get(r).is_some_and(|ids| ids.len() == 1));
        if alone {
            isolated[ilink] = true;
            for r in link.refs() {
                ref_binner.remove(r);
            }
        }
        tracker.next_progress()
    });
    tracker.finish(result)?;

    let n_refs = ref_binner.bin_count() as u64;
    let tracker = ProgressTracker::new(indicator, n_refs, "Walking links");
    let mut groups = Vec::new();
    let mut component = Vec::new();
    let starts: Vec<RowRef> = ref_binner.keys().copied().collect();
    let mut result = Ok(());
    for start in starts {
        // already consumed by an earlier walk
        if ref_binner.get(&start).is_none() {
            continue;
        }
        walk_links(start, &mut ref_binner, &links, &mut component);
        let n_walked = component.len() as u64;
        groups.extend(RowLink::from_refs(std::mem::take(&mut component)));
        result = tracker.advance(n_walked);
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;

    let mut agglomerated = HashLinkSet::with_capacity(groups.len());
    for (link, alone) in links.into_iter().zip(isolated) {
        if alone {
            agglomerated.add_link(link);
        }
    }
    for group in groups {
        agglomerated.add_link(group);
    }
    debug!("Agglomerated links into {} groups", agglomerated.len());
    Ok(agglomerated)
}

/// Collect every row reachable from `start` into `component`, consuming
/// the bins it visits.
fn walk_links(
    start: RowRef,
    ref_binner: &mut MapBinner<RowRef, usize>,
    links: &[RowLink],
    component: &mut Vec<RowRef>,
) {
    let mut stack = vec![start];
    while let Some(r) = stack.pop() {
        let Some(link_ids) = ref_binner.remove(&r) else {
            continue;
        };
        component.push(r);
        for ilink in link_ids {
            stack.extend(links[ilink].refs().iter().copied());
        }
    }
}

/// Reduce a set of scored pairs so that no row appears in more than one
/// pair.
///
/// Pairs are visited in ascending score order, ties broken by link order.
/// A pair is kept only if neither of its rows has been seen in an earlier
/// pair, kept or not. Every input link must be a pair with a non-negative
/// score and refs from tables 0 and 1.
pub fn eliminate_multiple_row_entries(
    mut pairs: HashLinkSet,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet> {
    let mut sorted: Vec<RowLink> = pairs.drain().collect();
    for pair in &sorted {
        let score = pair.score();
        if pair.size() != 2 || score.is_nan() || score < 0.0 {
            return Err(MatchError::Config(format!(
                "expected a scored pair, got {pair} with score {score}"
            )));
        }
        if pair.get_ref(0).table_index != 0 || pair.get_ref(1).table_index != 1 {
            return Err(MatchError::Config(format!(
                "pair {pair} does not link table 0 to table 1"
            )));
        }
    }
    sorted.sort_unstable_by(|a, b| a.score().total_cmp(&b.score()).then_with(|| a.cmp(b)));

    let tracker = ProgressTracker::new(
        indicator,
        sorted.len() as u64,
        "Eliminating multiple row references",
    );
    let mut seen: FxHashSet<RowRef> = FxHashSet::default();
    let mut kept = HashLinkSet::new();
    let mut result = Ok(());
    for pair in sorted {
        let new_0 = seen.insert(pair.get_ref(0));
        let new_1 = seen.insert(pair.get_ref(1));
        if new_0 && new_1 {
            kept.add_link(pair);
        }
        result = tracker.next_progress();
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;
    Ok(kept)
}

/// Make sure no link holds more than one row from the same table.
///
/// Where a link has several rows from one table only the first, in ref
/// order, is kept. A link reduced to a single row is dropped.
pub fn eliminate_internal_links(
    mut links: HashLinkSet,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet> {
    let tracker = ProgressTracker::new(
        indicator,
        links.len() as u64,
        "Eliminating internal links",
    );
    let mut out = HashLinkSet::with_capacity(links.len());
    let mut replacements = Vec::new();
    let (mut n_replace, mut n_remove) = (0usize, 0usize);
    let mut result = Ok(());
    for link in links.drain() {
        let refs = link.refs();
        // refs are sorted, so rows of one table are adjacent
        let has_dups = refs
            .windows(2)
            .any(|w| w[0].table_index == w[1].table_index);
        if has_dups {
            let mut kept = refs.to_vec();
            kept.dedup_by_key(|r| r.table_index);
            if kept.len() > 1 {
                replacements.extend(RowLink::from_refs(kept));
                n_replace += 1;
            } else {
                n_remove += 1;
            }
        } else {
            out.add_link(link);
        }
        result = tracker.next_progress();
        if result.is_err() {
            break;
        }
    }
    tracker.finish(result)?;
    if n_replace > 0 {
        indicator.log_message(&format!("Internal links replaced: {n_replace}"));
    }
    if n_remove > 0 {
        indicator.log_message(&format!("Internal links removed: {n_remove}"));
    }
    for link in replacements {
        out.add_link(link);
    }
    Ok(out)
}

/// Single-row links for every row of table `table_index` (with `n_rows`
/// rows) that appears in none of `links`.
pub fn missing_singles<L: LinkSet>(links: &L, table_index: u32, n_rows: u64) -> HashLinkSet {
    let mut present: FxHashSet<u64> = FxHashSet::default();
    for link in links.iter() {
        present.extend(
            link.refs()
                .iter()
                .filter(|r| r.table_index == table_index)
                .map(|r| r.row_index),
        );
    }
    (0..n_rows)
        .filter(|irow| !present.contains(irow))
        .map(|irow| RowLink::single(RowRef::new(table_index, irow)))
        .collect()
}

/// Keep only the links accepted by [`MultiJoinType::accept`] under
/// `join_types`, one entry per table.
///
/// A link naming a table outside `join_types` is a configuration error.
pub fn filter_join_groups(
    mut links: HashLinkSet,
    join_types: &[MultiJoinType],
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet> {
    let tracker = ProgressTracker::new(indicator, links.len() as u64, "Filtering groups");
    let mut out = HashLinkSet::with_capacity(links.len());
    let mut present = vec![false; join_types.len()];
    let result = links.drain().try_for_each(|link| {
        present.fill(false);
        for r in link.refs() {
            let slot = present.get_mut(r.table_index as usize).ok_or_else(|| {
                MatchError::Config(format!(
                    "row ref {r} names table {} but only {} join types are given",
                    r.table_index,
                    join_types.len()
                ))
            })?;
            *slot = true;
        }
        if MultiJoinType::accept(join_types, &present)? {
            out.add_link(link);
        }
        tracker.next_progress()
    });
    tracker.finish(result)?;
    Ok(out)
}

/// Match any number (at least two) of tables against each other.
///
/// Each output link is a group of rows matched across tables, with at most
/// one row from each table, and every row appears in at most one link. For
/// tables flagged [`MultiJoinType::Always`], unmatched rows are added as
/// single-row links. The result is then filtered by `join_types`, which
/// must hold one entry per table.
pub fn find_group_matches<K, S>(
    kit: &K,
    tables: &[&S],
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
            "group matching needs at least two tables, got {}",
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
    info!("Group match over {} tables", tables.len());

    let mut binner = MapBinner::new();
    for (itable, &rows) in tables.iter().enumerate() {
        let table = TableRef::new(table_index(itable)?, rows);
        binner.add_content(bin_row_refs(kit, table, config, indicator)?);
    }
    let possible = bins_to_links(binner, indicator)?;
    let pairs = find_pairs(possible, kit, tables, indicator)?;
    let pairs = eliminate_internal_links(pairs, indicator)?;
    let links = agglomerate_links(pairs, indicator)?;
    let mut links = eliminate_internal_links(links, indicator)?;

    let mut singles = Vec::new();
    for (itable, (join_type, rows)) in join_types.iter().zip(tables).enumerate() {
        if *join_type == MultiJoinType::Always {
            singles.push(missing_singles(&links, table_index(itable)?, rows.row_count()));
        }
    }
    for mut set in singles {
        for link in set.drain() {
            links.add_link(link);
        }
    }

    let links = filter_join_groups(links, join_types, indicator)?;
    info!("Group match found {} groups", links.len());
    Ok(links)
}

/// Find groups of mutually matching rows within a single table.
///
/// Groups may be of any size and every row appears in at most one group.
/// With `include_singles`, rows that match nothing are added as single-row
/// links.
pub fn find_internal_matches<K, S>(
    kit: &K,
    rows: &S,
    include_singles: bool,
    config: &ScanConfig,
    indicator: &dyn ProgressIndicator,
) -> Result<HashLinkSet>
where
    K: MatchKit,
    S: RowSource<Row = K::Row> + ?Sized,
{
    info!("Internal match over {} rows", rows.row_count());
    let binner = bin_row_refs(kit, TableRef::new(0, rows), config, indicator)?;
    let possible = bins_to_links(binner, indicator)?;
    let pairs = find_pairs(possible, kit, &[rows], indicator)?;
    let mut links = agglomerate_links(pairs, indicator)?;
    if include_singles {
        let mut singles = missing_singles(&links, 0, rows.row_count());
        for link in singles.drain() {
            links.add_link(link);
        }
    }
    info!("Internal match found {} groups", links.len());
    Ok(links)
}

pub(crate) fn table_index(itable: usize) -> Result<u32> {
    u32::try_from(itable)
        .map_err(|_| MatchError::Config(format!("table index {itable} out of range")))
}
