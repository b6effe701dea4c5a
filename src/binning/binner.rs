use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Map from bin key to the items placed in that bin, in insertion order.
///
/// Looking up a bin that was never filled gives `None`, never an error.
pub trait ObjectBinner<K, E>: Default {
    /// Append `item` to the bin for `key`, creating the bin if needed.
    fn add_item(&mut self, key: K, item: E);

    /// Contents of the bin for `key`.
    fn get(&self, key: &K) -> Option<&[E]>;

    /// Drop the bin for `key`, returning its contents if it existed.
    fn remove(&mut self, key: &K) -> Option<Vec<E>>;

    /// Keys of all non-empty bins, in no particular order.
    ///
    /// Bins cannot be removed while this iterator is live; collect the keys
    /// first or use [`MapBinner::retain_bins`].
    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a
    where
        K: 'a,
        E: 'a;

    /// Total number of items over all bins.
    fn item_count(&self) -> usize;

    /// Number of non-empty bins.
    fn bin_count(&self) -> usize;

    /// Add everything in `other` to this binner, as if each of its
    /// `add_item` calls had been replayed here in their original order.
    fn add_content(&mut self, other: Self);

    /// Merge two binners into one. Per bin, the items of `self` come before
    /// those of `other`.
    fn combine(mut self, other: Self) -> Self
    where
        Self: Sized,
    {
        self.add_content(other);
        self
    }
}

/// Hash-map backed [`ObjectBinner`].
#[derive(Debug, Clone)]
pub struct MapBinner<K, E> {
    bins: FxHashMap<K, Vec<E>>,
    n_items: usize,
}

impl<K, E> Default for MapBinner<K, E> {
    fn default() -> Self {
        Self {
            bins: FxHashMap::default(),
            n_items: 0,
        }
    }
}

impl<K: Hash + Eq, E> MapBinner<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to one bin's contents.
    ///
    /// A bin emptied through this handle is dropped by the next
    /// [`retain_bins`](Self::retain_bins) or [`prune_empty`](Self::prune_empty).
    pub fn get_mut(&mut self, key: &K) -> Option<&mut Vec<E>> {
        self.bins.get_mut(key)
    }

    /// Keep only the bins for which `keep` returns true.
    pub fn retain_bins<F: FnMut(&K, &[E]) -> bool>(&mut self, mut keep: F) {
        let mut removed = 0;
        self.bins.retain(|k, items| {
            let kept = keep(k, items);
            if !kept {
                removed += items.len();
            }
            kept
        });
        self.n_items -= removed;
    }

    /// Drop bins left empty by [`get_mut`](Self::get_mut) and recount items.
    pub fn prune_empty(&mut self) {
        self.bins.retain(|_, items| !items.is_empty());
        self.n_items = self.bins.values().map(Vec::len).sum();
    }

    /// Iterate over non-empty bins.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[E])> + '_ {
        self.bins
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(k, items)| (k, items.as_slice()))
    }

    /// Consume the binner, yielding each non-empty bin.
    pub fn into_bins(self) -> impl Iterator<Item = (K, Vec<E>)> {
        self.bins.into_iter().filter(|(_, items)| !items.is_empty())
    }
}

impl<K: Hash + Eq, E> ObjectBinner<K, E> for MapBinner<K, E> {
    fn add_item(&mut self, key: K, item: E) {
        self.bins.entry(key).or_default().push(item);
        self.n_items += 1;
    }

    fn get(&self, key: &K) -> Option<&[E]> {
        self.bins
            .get(key)
            .filter(|items| !items.is_empty())
            .map(Vec::as_slice)
    }

    fn remove(&mut self, key: &K) -> Option<Vec<E>> {
        let items = self.bins.remove(key)?;
        self.n_items -= items.len();
        Some(items)
    }

    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K> + 'a
    where
        K: 'a,
        E: 'a,
    {
        self.bins
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(k, _)| k)
    }

    fn item_count(&self) -> usize {
        self.n_items
    }

    fn bin_count(&self) -> usize {
        self.bins.values().filter(|items| !items.is_empty()).count()
    }

    fn add_content(&mut self, other: Self) {
        for (key, items) in other.bins {
            self.n_items += items.len();
            self.bins.entry(key).or_default().extend(items);
        }
    }
}
