//! Binners holding row indices as bare integers.
//!
//! Candidate scanning of a large table puts every row index into one or
//! more bins, so storage per item matters. [`MapLongBinner`] stores `u64`
//! values; [`RowIndexBinner`] stores `u32` values while every index fits in
//! 32 bits and widens itself on the first index that does not.

use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Map from bin key to the row indices placed in that bin.
///
/// Same contract as [`ObjectBinner`](super::ObjectBinner), specialised to
/// integer items.
pub trait LongBinner<K>: Default + Send {
    /// Append `value` to the bin for `key`, creating the bin if needed.
    fn add_item(&mut self, key: K, value: u64);

    /// A copy of the values in the bin for `key`, in insertion order.
    fn get_longs(&self, key: &K) -> Option<Vec<u64>>;

    /// Number of values in the bin for `key` (0 if absent).
    fn bin_len(&self, key: &K) -> usize;

    /// Drop the bin for `key`; returns whether it existed.
    fn remove(&mut self, key: &K) -> bool;

    /// Keys of all non-empty bins, in no particular order.
    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a
    where
        K: 'a;

    /// Total number of values over all bins.
    fn item_count(&self) -> u64;

    /// Number of non-empty bins.
    fn bin_count(&self) -> usize;

    /// Add everything in `other` to this binner, as if each of its
    /// `add_item` calls had been replayed here in their original order.
    fn add_content(&mut self, other: Self);

    /// Merge two binners into a new one. Per bin, the values of `self`
    /// come before those of `other`.
    fn combine(mut self, other: Self) -> Self
    where
        Self: Sized,
    {
        self.add_content(other);
        self
    }
}

/// Hash-map backed [`LongBinner`] with 64-bit storage.
#[derive(Debug, Clone)]
pub struct MapLongBinner<K> {
    bins: FxHashMap<K, Vec<u64>>,
    n_items: u64,
}

impl<K> Default for MapLongBinner<K> {
    fn default() -> Self {
        Self {
            bins: FxHashMap::default(),
            n_items: 0,
        }
    }
}

impl<K: Hash + Eq> MapLongBinner<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the values of one bin without copying.
    pub fn get_slice(&self, key: &K) -> Option<&[u64]> {
        self.bins.get(key).map(Vec::as_slice)
    }
}

impl<K: Hash + Eq + Send> LongBinner<K> for MapLongBinner<K> {
    fn add_item(&mut self, key: K, value: u64) {
        self.bins.entry(key).or_default().push(value);
        self.n_items += 1;
    }

    fn get_longs(&self, key: &K) -> Option<Vec<u64>> {
        self.bins.get(key).cloned()
    }

    fn bin_len(&self, key: &K) -> usize {
        self.bins.get(key).map_or(0, Vec::len)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.bins.remove(key) {
            Some(values) => {
                self.n_items -= values.len() as u64;
                true
            }
            None => false,
        }
    }

    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a
    where
        K: 'a,
    {
        self.bins.keys()
    }

    fn item_count(&self) -> u64 {
        self.n_items
    }

    fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn add_content(&mut self, other: Self) {
        for (key, values) in other.bins {
            self.n_items += values.len() as u64;
            self.bins.entry(key).or_default().extend(values);
        }
    }
}

/// Compact 32-bit storage used inside [`RowIndexBinner`].
#[derive(Debug, Clone)]
pub struct CompactLongBinner<K> {
    bins: FxHashMap<K, Vec<u32>>,
    n_items: u64,
}

impl<K> Default for CompactLongBinner<K> {
    fn default() -> Self {
        Self {
            bins: FxHashMap::default(),
            n_items: 0,
        }
    }
}

impl<K: Hash + Eq> CompactLongBinner<K> {
    fn push(&mut self, key: K, value: u32) {
        self.bins.entry(key).or_default().push(value);
        self.n_items += 1;
    }

    fn widen(self) -> MapLongBinner<K> {
        let bins = self
            .bins
            .into_iter()
            .map(|(k, values)| (k, values.into_iter().map(u64::from).collect()))
            .collect();
        MapLongBinner {
            bins,
            n_items: self.n_items,
        }
    }
}

/// Row-index binner that starts with 32-bit storage and widens on demand.
///
/// Produced by the binning pass; tables with fewer than 2³² rows never pay
/// for 64-bit storage.
#[derive(Debug, Clone)]
pub enum RowIndexBinner<K> {
    Compact(CompactLongBinner<K>),
    Wide(MapLongBinner<K>),
}

impl<K> Default for RowIndexBinner<K> {
    fn default() -> Self {
        RowIndexBinner::Compact(CompactLongBinner::default())
    }
}

impl<K: Hash + Eq> RowIndexBinner<K> {
    /// An empty binner suitable for a table of `n_rows` rows.
    pub fn for_row_count(n_rows: u64) -> Self {
        if n_rows <= u64::from(u32::MAX) + 1 {
            RowIndexBinner::Compact(CompactLongBinner::default())
        } else {
            RowIndexBinner::Wide(MapLongBinner::default())
        }
    }

    pub fn is_compact(&self) -> bool {
        matches!(self, RowIndexBinner::Compact(_))
    }

    fn make_wide(&mut self) -> &mut MapLongBinner<K> {
        if let RowIndexBinner::Compact(compact) = self {
            let wide = std::mem::take(compact).widen();
            *self = RowIndexBinner::Wide(wide);
        }
        match self {
            RowIndexBinner::Wide(wide) => wide,
            RowIndexBinner::Compact(_) => unreachable!("widened above"),
        }
    }

    /// Visit the values of one bin in insertion order without allocating.
    pub fn for_each_in<F: FnMut(u64)>(&self, key: &K, mut f: F) {
        match self {
            RowIndexBinner::Compact(c) => {
                if let Some(values) = c.bins.get(key) {
                    values.iter().for_each(|&v| f(u64::from(v)));
                }
            }
            RowIndexBinner::Wide(w) => {
                if let Some(values) = w.bins.get(key) {
                    values.iter().for_each(|&v| f(v));
                }
            }
        }
    }
}

impl<K: Hash + Eq + Send> LongBinner<K> for RowIndexBinner<K> {
    fn add_item(&mut self, key: K, value: u64) {
        if let RowIndexBinner::Compact(compact) = self {
            if let Ok(v) = u32::try_from(value) {
                compact.push(key, v);
                return;
            }
        }
        self.make_wide().add_item(key, value);
    }

    fn get_longs(&self, key: &K) -> Option<Vec<u64>> {
        match self {
            RowIndexBinner::Compact(c) => c
                .bins
                .get(key)
                .map(|values| values.iter().map(|&v| u64::from(v)).collect()),
            RowIndexBinner::Wide(w) => w.get_longs(key),
        }
    }

    fn bin_len(&self, key: &K) -> usize {
        match self {
            RowIndexBinner::Compact(c) => c.bins.get(key).map_or(0, Vec::len),
            RowIndexBinner::Wide(w) => w.bin_len(key),
        }
    }

    fn remove(&mut self, key: &K) -> bool {
        match self {
            RowIndexBinner::Compact(c) => match c.bins.remove(key) {
                Some(values) => {
                    c.n_items -= values.len() as u64;
                    true
                }
                None => false,
            },
            RowIndexBinner::Wide(w) => w.remove(key),
        }
    }

    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a
    where
        K: 'a,
    {
        let keys: Box<dyn Iterator<Item = &'a K> + 'a> = match self {
            RowIndexBinner::Compact(c) => Box::new(c.bins.keys()),
            RowIndexBinner::Wide(w) => Box::new(w.bins.keys()),
        };
        keys
    }

    fn item_count(&self) -> u64 {
        match self {
            RowIndexBinner::Compact(c) => c.n_items,
            RowIndexBinner::Wide(w) => w.n_items,
        }
    }

    fn bin_count(&self) -> usize {
        match self {
            RowIndexBinner::Compact(c) => c.bins.len(),
            RowIndexBinner::Wide(w) => w.bins.len(),
        }
    }

    fn add_content(&mut self, other: Self) {
        match other {
            RowIndexBinner::Compact(theirs) => {
                if let RowIndexBinner::Compact(mine) = self {
                    for (key, values) in theirs.bins {
                        mine.n_items += values.len() as u64;
                        mine.bins.entry(key).or_default().extend(values);
                    }
                    return;
                }
                self.make_wide().add_content(theirs.widen());
            }
            RowIndexBinner::Wide(theirs) => self.make_wide().add_content(theirs),
        }
    }
}
