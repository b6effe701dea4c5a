use std::collections::BTreeSet;

use rayon::slice::ParallelSliceMut;
use rustc_hash::FxHashSet;

use super::RowLink;

/// Working collection of unique [`RowLink`]s for one matching run.
///
/// Adding a link equal to one already present replaces the stored link, so
/// the most recently added score wins. Two backings exist: [`HashLinkSet`]
/// for bulk unordered mutation and [`TreeLinkSet`] when sorted access is
/// needed while the set is still changing.
pub trait LinkSet: Default + Send {
    /// Insert `link`, replacing any equal link.
    fn add_link(&mut self, link: RowLink);

    fn contains_link(&self, link: &RowLink) -> bool;

    /// The stored link equal to `link`, if any.
    fn get_link(&self, link: &RowLink) -> Option<&RowLink>;

    /// Remove `link`; returns whether it was present.
    fn remove_link(&mut self, link: &RowLink) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> impl Iterator<Item = &RowLink> + '_;

    /// Keep only the links for which `keep` returns true.
    fn retain<F: FnMut(&RowLink) -> bool>(&mut self, keep: F);

    /// Remove and yield every link, leaving the set empty.
    fn drain(&mut self) -> impl Iterator<Item = RowLink> + '_;

    /// Consume the set, returning its links in canonical [`RowLink`] order.
    fn into_sorted(self) -> Vec<RowLink>;
}

/// Hash-backed link set. Sorting happens on demand, in parallel.
#[derive(Debug, Clone, Default)]
pub struct HashLinkSet {
    links: FxHashSet<RowLink>,
}

impl HashLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut links = FxHashSet::default();
        links.reserve(capacity);
        Self { links }
    }
}

impl LinkSet for HashLinkSet {
    fn add_link(&mut self, link: RowLink) {
        self.links.replace(link);
    }

    fn contains_link(&self, link: &RowLink) -> bool {
        self.links.contains(link)
    }

    fn get_link(&self, link: &RowLink) -> Option<&RowLink> {
        self.links.get(link)
    }

    fn remove_link(&mut self, link: &RowLink) -> bool {
        self.links.remove(link)
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn iter(&self) -> impl Iterator<Item = &RowLink> + '_ {
        self.links.iter()
    }

    fn retain<F: FnMut(&RowLink) -> bool>(&mut self, keep: F) {
        self.links.retain(keep);
    }

    fn drain(&mut self) -> impl Iterator<Item = RowLink> + '_ {
        self.links.drain()
    }

    fn into_sorted(self) -> Vec<RowLink> {
        let mut sorted: Vec<RowLink> = self.links.into_iter().collect();
        // elements are unique, so an unstable sort gives the canonical order
        sorted.par_sort_unstable();
        sorted
    }
}

impl FromIterator<RowLink> for HashLinkSet {
    fn from_iter<I: IntoIterator<Item = RowLink>>(iter: I) -> Self {
        let mut set = Self::new();
        for link in iter {
            set.add_link(link);
        }
        set
    }
}

/// Tree-backed link set, kept in canonical order at all times.
#[derive(Debug, Clone, Default)]
pub struct TreeLinkSet {
    links: BTreeSet<RowLink>,
}

impl TreeLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest link in canonical order.
    pub fn first(&self) -> Option<&RowLink> {
        self.links.first()
    }

    /// Largest link in canonical order.
    pub fn last(&self) -> Option<&RowLink> {
        self.links.last()
    }
}

impl LinkSet for TreeLinkSet {
    fn add_link(&mut self, link: RowLink) {
        self.links.replace(link);
    }

    fn contains_link(&self, link: &RowLink) -> bool {
        self.links.contains(link)
    }

    fn get_link(&self, link: &RowLink) -> Option<&RowLink> {
        self.links.get(link)
    }

    fn remove_link(&mut self, link: &RowLink) -> bool {
        self.links.remove(link)
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    /// Links in canonical order.
    fn iter(&self) -> impl Iterator<Item = &RowLink> + '_ {
        self.links.iter()
    }

    fn retain<F: FnMut(&RowLink) -> bool>(&mut self, keep: F) {
        self.links.retain(keep);
    }

    fn drain(&mut self) -> impl Iterator<Item = RowLink> + '_ {
        std::mem::take(&mut self.links).into_iter()
    }

    fn into_sorted(self) -> Vec<RowLink> {
        self.links.into_iter().collect()
    }
}

impl FromIterator<RowLink> for TreeLinkSet {
    fn from_iter<I: IntoIterator<Item = RowLink>>(iter: I) -> Self {
        let mut set = Self::new();
        for link in iter {
            set.add_link(link);
        }
        set
    }
}
