//! Integration tests: crossmatch synthetic catalogs and check the results
//! against brute-force comparison of every row pair.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rand_distr::{Distribution, Normal};
use rustc_hash::FxHashSet;
use skyjoin::{
    eliminate_multiple_row_entries, find_group_matches, find_internal_matches,
    find_pair_matches, CartesianMatchKit, CartesianPoint, CellGrid, ErrorSummation,
    HashLinkSet, HealpixSkyPixellator, LinkSet, MatchError, MatchKit, MultiJoinType,
    NullProgressIndicator, ProgressIndicator, RowLink, RowRef, ScanConfig, SkyMatchKit,
    SkyPosition, TableRef,
};

const ARCSEC: f64 = std::f64::consts::PI / 180.0 / 3600.0;

/// Random positions in a small patch of sky, plus a perturbed copy of most
/// of them with some unrelated extras.
fn sky_catalogs(n: usize, seed: u64) -> (Vec<SkyPosition>, Vec<SkyPosition>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = Normal::new(0.0, 1.5 * ARCSEC).unwrap();
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for _ in 0..n {
        let ra = 1.0 + 0.01 * rng.random::<f64>();
        let dec = 0.3 + 0.01 * rng.random::<f64>();
        let err = (1.0 + 3.0 * rng.random::<f64>()) * ARCSEC;
        left.push(SkyPosition::new(ra, dec, err));
        if rng.random::<f64>() < 0.8 {
            let ra2 = ra + jitter.sample(&mut rng) / dec.cos();
            let dec2 = dec + jitter.sample(&mut rng);
            let err2 = (1.0 + 3.0 * rng.random::<f64>()) * ARCSEC;
            right.push(SkyPosition::new(ra2, dec2, err2));
        }
        if rng.random::<f64>() < 0.2 {
            let ra3 = 1.0 + 0.01 * rng.random::<f64>();
            let dec3 = 0.3 + 0.01 * rng.random::<f64>();
            right.push(SkyPosition::new(ra3, dec3, 2.0 * ARCSEC));
        }
    }
    (left, right)
}

fn brute_force_pairs<K: MatchKit>(kit: &K, r: &[K::Row], s: &[K::Row]) -> Vec<(RowLink, f64)> {
    let mut pairs = Vec::new();
    for (ir, row_r) in r.iter().enumerate() {
        for (is, row_s) in s.iter().enumerate() {
            if let Some(score) = kit.match_score(row_s, row_r) {
                let link = RowLink::pair(RowRef::new(0, ir as u64), RowRef::new(1, is as u64));
                pairs.push((link, score));
            }
        }
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

/// Cancels on the `n`th level report.
struct CancelAfter {
    n: usize,
    calls: AtomicUsize,
}

impl ProgressIndicator for CancelAfter {
    fn start_stage(&self, _name: &str) {}

    fn set_level(&self, _level: f64) -> skyjoin::Result<()> {
        if self.calls.fetch_add(1, Ordering::Relaxed) + 1 >= self.n {
            Err(MatchError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn end_stage(&self) {}

    fn log_message(&self, _msg: &str) {}
}

#[test]
fn sky_pair_match_agrees_with_brute_force() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let (left, right) = sky_catalogs(1500, 17);
    let pixellator = HealpixSkyPixellator::new(4.0 * ARCSEC);
    // small chunks so the parallel merge is exercised
    let config = ScanConfig {
        rows_per_chunk: 97,
        ..Default::default()
    };

    for summation in ErrorSummation::ALL {
        let kit = SkyMatchKit::new(&pixellator, summation)?;
        let found = find_pair_matches(
            &kit,
            TableRef::new(0, &left),
            TableRef::new(1, &right),
            &config,
            &NullProgressIndicator,
        )?
        .into_sorted();
        let expected = brute_force_pairs(&kit, &left, &right);
        println!("{summation}: {} pairs", found.len());
        assert!(!expected.is_empty());
        assert_eq!(found.len(), expected.len());
        for (link, (want, score)) in found.iter().zip(&expected) {
            assert_eq!(link, want);
            assert!((link.score() - score).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&link.score()));
        }
    }
    Ok(())
}

#[test]
fn best_only_and_unique_pairs() -> anyhow::Result<()> {
    let (left, right) = sky_catalogs(800, 5);
    let pixellator = HealpixSkyPixellator::new(4.0 * ARCSEC);
    let kit = SkyMatchKit::new(&pixellator, ErrorSummation::Simple)?;
    let config = ScanConfig {
        rows_per_chunk: 64,
        best_only: true,
    };
    let best = find_pair_matches(
        &kit,
        TableRef::new(0, &left),
        TableRef::new(1, &right),
        &config,
        &NullProgressIndicator,
    )?;

    // one pair per matched row of the scanned table, with the lowest score
    let expected = brute_force_pairs(&kit, &left, &right);
    let mut best_scores = vec![f64::INFINITY; right.len()];
    for (link, score) in &expected {
        let is = link.get_ref(1).row_index as usize;
        best_scores[is] = best_scores[is].min(*score);
    }
    let n_matched = best_scores.iter().filter(|s| s.is_finite()).count();
    assert_eq!(best.len(), n_matched);
    for link in best.iter() {
        let is = link.get_ref(1).row_index as usize;
        assert_eq!(link.score(), best_scores[is]);
    }

    let all = find_pair_matches(
        &kit,
        TableRef::new(0, &left),
        TableRef::new(1, &right),
        &ScanConfig::default(),
        &NullProgressIndicator,
    )?;
    let unique = eliminate_multiple_row_entries(all, &NullProgressIndicator)?;
    let mut seen = FxHashSet::default();
    for link in unique.iter() {
        for r in link.refs() {
            assert!(seen.insert(*r), "{r} used twice");
        }
    }
    assert!(!unique.is_empty());
    Ok(())
}

fn cartesian_tables(seed: u64) -> Vec<Vec<CartesianPoint>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = Normal::new(0.0, 0.02).unwrap();
    let truth: Vec<[f64; 2]> = (0..300)
        .map(|_| [1000.0 * rng.random::<f64>(), 1000.0 * rng.random::<f64>()])
        .collect();
    let mut tables = Vec::new();
    for _ in 0..3 {
        let mut table = Vec::new();
        for p in &truth {
            if rng.random::<f64>() < 0.7 {
                let x = p[0] + jitter.sample(&mut rng);
                let y = p[1] + jitter.sample(&mut rng);
                table.push(CartesianPoint::new(vec![x, y], 0.1));
            }
        }
        tables.push(table);
    }
    tables
}

fn assert_disjoint_one_per_table(links: &HashLinkSet) {
    let mut seen = FxHashSet::default();
    for link in links.iter() {
        let mut tables = FxHashSet::default();
        for r in link.refs() {
            assert!(seen.insert(*r), "{r} appears in two groups");
            assert!(tables.insert(r.table_index), "{link} repeats a table");
        }
    }
}

#[test]
fn cartesian_group_match_invariants() -> anyhow::Result<()> {
    let tables = cartesian_tables(99);
    let refs: Vec<&[CartesianPoint]> = tables.iter().map(Vec::as_slice).collect();
    let kit = CartesianMatchKit::new(CellGrid::isotropic(2, 0.4)?, ErrorSummation::Simple);
    let config = ScanConfig {
        rows_per_chunk: 50,
        ..Default::default()
    };

    let default = [MultiJoinType::Default; 3];
    let groups = find_group_matches(&kit, &refs, &default, &config, &NullProgressIndicator)?;
    assert_disjoint_one_per_table(&groups);
    assert!(groups.iter().all(|l| l.size() >= 2));

    // every member of a group is joined to another member by a real match
    for link in groups.iter() {
        for a in link.refs() {
            let row_a = &tables[a.table_index as usize][a.row_index as usize];
            assert!(link.refs().iter().any(|b| {
                b != a
                    && kit
                        .match_score(row_a, &tables[b.table_index as usize][b.row_index as usize])
                        .is_some()
            }));
        }
    }

    // with every table flagged always, each row appears exactly once
    let always = [MultiJoinType::Always; 3];
    let everything = find_group_matches(&kit, &refs, &always, &config, &NullProgressIndicator)?;
    assert_disjoint_one_per_table(&everything);
    let n_refs: usize = everything.iter().map(RowLink::size).sum();
    assert_eq!(n_refs, tables.iter().map(Vec::len).sum::<usize>());

    // requiring the first table keeps a subset of the default result
    let need_first = [
        MultiJoinType::Match,
        MultiJoinType::Default,
        MultiJoinType::Default,
    ];
    let subset = find_group_matches(&kit, &refs, &need_first, &config, &NullProgressIndicator)?;
    assert!(subset.iter().all(|l| l.contains_table(0)));
    assert!(subset.iter().all(|l| groups.contains_link(l)));
    Ok(())
}

#[test]
fn internal_match_covers_every_row_once() -> anyhow::Result<()> {
    let tables = cartesian_tables(3);
    let rows: Vec<CartesianPoint> = tables.into_iter().flatten().collect();
    let kit = CartesianMatchKit::new(CellGrid::isotropic(2, 0.4)?, ErrorSummation::Quadrature);
    let links = find_internal_matches(
        &kit,
        rows.as_slice(),
        true,
        &ScanConfig::default(),
        &NullProgressIndicator,
    )?;
    let mut seen = FxHashSet::default();
    for link in links.iter() {
        for r in link.refs() {
            assert_eq!(r.table_index, 0);
            assert!(seen.insert(r.row_index));
        }
    }
    assert_eq!(seen.len(), rows.len());
    assert!(links.iter().any(|l| l.size() > 1));
    Ok(())
}

#[test]
fn cancellation_stops_the_match() {
    let (left, right) = sky_catalogs(30_000, 8);
    let pixellator = HealpixSkyPixellator::new(4.0 * ARCSEC);
    let kit = SkyMatchKit::new(&pixellator, ErrorSummation::Simple).unwrap();
    let indicator = CancelAfter {
        n: 1,
        calls: AtomicUsize::new(0),
    };
    let result = find_pair_matches(
        &kit,
        TableRef::new(0, &left),
        TableRef::new(1, &right),
        &ScanConfig::default(),
        &indicator,
    );
    assert_eq!(result.unwrap_err(), MatchError::Interrupted);
}
