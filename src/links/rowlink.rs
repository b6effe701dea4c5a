use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::RowRef;

/// A group of one or more rows believed to represent the same object.
///
/// The refs are held in ascending [`RowRef`] order with duplicates removed,
/// so links built from the same refs in any order are equal, hash alike and
/// sort alike. Pairs additionally carry a match score, which takes no part
/// in equality, hashing or ordering.
///
/// The only ways to build a link are [`single`](Self::single),
/// [`pair`](Self::pair), [`scored_pair`](Self::scored_pair),
/// [`from_refs`](Self::from_refs) and [`multi_pair`](Self::multi_pair), all
/// of which sort the refs, so no link can hold them out of order.
///
/// Links order first by size, then lexicographically by their refs.
#[derive(Debug, Clone)]
pub struct RowLink {
    repr: Repr,
}

#[derive(Debug, Clone)]
enum Repr {
    Single(RowRef),
    Pair {
        refs: [RowRef; 2],
        score: f64,
    },
    Group {
        refs: Box<[RowRef]>,
        // one per ref when built by `multi_pair`
        scores: Option<Box<[f64]>>,
    },
}

/// Size class of a [`RowLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkShape {
    /// A lone row.
    Single,
    /// Two rows and the score of the match between them.
    Pair,
    /// Three or more rows.
    Group,
}

impl RowLink {
    pub fn single(r: RowRef) -> Self {
        Self {
            repr: Repr::Single(r),
        }
    }

    /// Link two rows, with an unset score.
    ///
    /// If `a == b` the result is a single-row link.
    pub fn pair(a: RowRef, b: RowRef) -> Self {
        let refs = match a.cmp(&b) {
            Ordering::Less => [a, b],
            Ordering::Greater => [b, a],
            Ordering::Equal => return Self::single(a),
        };
        Self {
            repr: Repr::Pair {
                refs,
                score: f64::NAN,
            },
        }
    }

    /// Link two rows with a given score.
    pub fn scored_pair(a: RowRef, b: RowRef, score: f64) -> Self {
        Self::pair(a, b).with_score(score)
    }

    /// Build a link of any size from an owned vector of refs.
    ///
    /// The vector is sorted and deduplicated in place and then consumed; it
    /// is never copied for the many-ref case. Returns `None` if `refs` is
    /// empty.
    pub fn from_refs(mut refs: Vec<RowRef>) -> Option<Self> {
        refs.sort_unstable();
        refs.dedup();
        let repr = match refs.len() {
            0 => return None,
            1 => Repr::Single(refs[0]),
            2 => Repr::Pair {
                refs: [refs[0], refs[1]],
                score: f64::NAN,
            },
            _ => Repr::Group {
                refs: refs.into_boxed_slice(),
                scores: None,
            },
        };
        Some(Self { repr })
    }

    /// Link a reference row with its scored partners.
    ///
    /// Each partner keeps the score of its match with `reference`; a partner
    /// listed twice keeps its lower score. With one partner this is a
    /// scored pair, with none a single.
    pub fn multi_pair(reference: RowRef, mut partners: Vec<(RowRef, f64)>) -> Self {
        partners.retain(|(r, _)| *r != reference);
        partners.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        partners.dedup_by_key(|(r, _)| *r);
        match partners.as_slice() {
            [] => return Self::single(reference),
            [(other, score)] => return Self::scored_pair(reference, *other, *score),
            _ => {}
        }
        let mut entries: Vec<(RowRef, f64)> = partners;
        let at = entries.partition_point(|(r, _)| *r < reference);
        entries.insert(at, (reference, f64::NAN));
        let (refs, scores): (Vec<RowRef>, Vec<f64>) = entries.into_iter().unzip();
        Self {
            repr: Repr::Group {
                refs: refs.into_boxed_slice(),
                scores: Some(scores.into_boxed_slice()),
            },
        }
    }

    pub fn shape(&self) -> LinkShape {
        match self.repr {
            Repr::Single(_) => LinkShape::Single,
            Repr::Pair { .. } => LinkShape::Pair,
            Repr::Group { .. } => LinkShape::Group,
        }
    }

    /// Number of refs.
    pub fn size(&self) -> usize {
        self.refs().len()
    }

    /// The `i`th ref in ascending order. Panics if `i >= self.size()`.
    pub fn get_ref(&self, i: usize) -> RowRef {
        self.refs()[i]
    }

    /// All refs in ascending order.
    pub fn refs(&self) -> &[RowRef] {
        match &self.repr {
            Repr::Single(r) => std::slice::from_ref(r),
            Repr::Pair { refs, .. } => refs,
            Repr::Group { refs, .. } => refs,
        }
    }

    /// Score of the link.
    ///
    /// For a pair, its match score. For a group built by
    /// [`multi_pair`](Self::multi_pair), the best partner score. NaN
    /// otherwise.
    pub fn score(&self) -> f64 {
        match &self.repr {
            Repr::Pair { score, .. } => *score,
            Repr::Group {
                scores: Some(scores),
                ..
            } => scores
                .iter()
                .copied()
                .filter(|s| !s.is_nan())
                .reduce(f64::min)
                .unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Score attached to the `i`th ref: the pair score for either ref of a
    /// pair, the partner score within a multi-pair group, NaN otherwise.
    pub fn ref_score(&self, i: usize) -> f64 {
        match &self.repr {
            Repr::Pair { score, .. } if i < 2 => *score,
            Repr::Group {
                scores: Some(scores),
                ..
            } => scores.get(i).copied().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    /// Set the score of a pair link. Ignored for other sizes.
    pub fn set_score(&mut self, value: f64) {
        if let Repr::Pair { score, .. } = &mut self.repr {
            *score = value;
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.set_score(score);
        self
    }

    /// True if any ref of this link belongs to table `table_index`.
    pub fn contains_table(&self, table_index: u32) -> bool {
        self.refs().iter().any(|r| r.table_index == table_index)
    }
}

impl PartialEq for RowLink {
    fn eq(&self, other: &Self) -> bool {
        self.refs() == other.refs()
    }
}

impl Eq for RowLink {}

impl Hash for RowLink {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.refs().hash(state);
    }
}

impl PartialOrd for RowLink {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RowLink {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size()
            .cmp(&other.size())
            .then_with(|| self.refs().cmp(other.refs()))
    }
}

impl fmt::Display for RowLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, r) in self.refs().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(link: &RowLink) -> u64 {
        let mut h = DefaultHasher::new();
        link.hash(&mut h);
        h.finish()
    }

    #[test]
    fn pair_is_canonical() {
        let x = RowRef::new(1, 7);
        let y = RowRef::new(0, 12);
        let xy = RowLink::pair(x, y);
        let yx = RowLink::pair(y, x);
        assert_eq!(xy, yx);
        assert_eq!(hash_of(&xy), hash_of(&yx));
        assert_eq!(xy.get_ref(0), y);
        assert_eq!(xy.get_ref(1), x);
        assert!(xy.score().is_nan());
    }

    #[test]
    fn score_is_not_identity() {
        let a = RowRef::new(0, 1);
        let b = RowRef::new(1, 1);
        let l1 = RowLink::scored_pair(a, b, 0.25);
        let l2 = RowLink::scored_pair(b, a, 1.5);
        assert_eq!(l1, l2);
        assert_eq!(hash_of(&l1), hash_of(&l2));
        assert_eq!(l1.cmp(&l2), Ordering::Equal);
        assert_eq!(l1.score(), 0.25);
    }

    #[test]
    fn group_refs_are_sorted() {
        let refs = vec![
            RowRef::new(2, 3),
            RowRef::new(0, 9),
            RowRef::new(1, 0),
            RowRef::new(0, 2),
        ];
        let link = RowLink::from_refs(refs.clone()).unwrap();
        assert_eq!(link.size(), 4);
        for i in 1..link.size() {
            assert!(link.get_ref(i - 1) < link.get_ref(i));
        }
        let mut reversed = refs;
        reversed.reverse();
        assert_eq!(RowLink::from_refs(reversed).unwrap(), link);
    }

    #[test]
    fn from_refs_picks_shape() {
        assert!(RowLink::from_refs(Vec::new()).is_none());
        let one = RowLink::from_refs(vec![RowRef::new(0, 0)]).unwrap();
        assert_eq!(one.shape(), LinkShape::Single);
        let two = RowLink::from_refs(vec![RowRef::new(0, 1), RowRef::new(0, 0)]).unwrap();
        assert_eq!(two.shape(), LinkShape::Pair);
        assert_eq!(two, RowLink::pair(RowRef::new(0, 0), RowRef::new(0, 1)));
        // duplicate refs collapse
        let dup = RowLink::from_refs(vec![RowRef::new(3, 3), RowRef::new(3, 3)]).unwrap();
        assert_eq!(dup.size(), 1);
    }

    #[test]
    fn ordering_by_size_then_refs() {
        let single = RowLink::single(RowRef::new(5, 5));
        let pair_lo = RowLink::pair(RowRef::new(0, 0), RowRef::new(1, 0));
        let pair_hi = RowLink::pair(RowRef::new(0, 1), RowRef::new(1, 0));
        let group = RowLink::from_refs(vec![
            RowRef::new(0, 0),
            RowRef::new(1, 0),
            RowRef::new(2, 0),
        ])
        .unwrap();
        let mut links = vec![group.clone(), pair_hi.clone(), single.clone(), pair_lo.clone()];
        links.sort();
        assert_eq!(links, vec![single, pair_lo, pair_hi, group]);
    }

    #[test]
    fn pair_order_does_not_split_a_set() {
        use crate::links::{HashLinkSet, LinkSet};

        let a = RowRef::new(0, 3);
        let b = RowRef::new(1, 2);
        let mut set = HashLinkSet::new();
        set.add_link(RowLink::scored_pair(b, a, 0.4));
        set.add_link(RowLink::scored_pair(a, b, 0.1));
        assert_eq!(set.len(), 1);
        assert!(set.contains_link(&RowLink::pair(a, b)));
        assert_eq!(RowLink::pair(b, a).refs(), [a, b]);
        assert_eq!(RowLink::pair(a, a).shape(), LinkShape::Single);
    }

    #[test]
    fn multi_pair_keeps_partner_scores() {
        let reference = RowRef::new(0, 5);
        let link = RowLink::multi_pair(
            reference,
            vec![
                (RowRef::new(2, 1), 0.7),
                (RowRef::new(1, 9), 0.3),
                (RowRef::new(2, 1), 0.2),
            ],
        );
        assert_eq!(link.shape(), LinkShape::Group);
        assert_eq!(
            link.refs(),
            [RowRef::new(0, 5), RowRef::new(1, 9), RowRef::new(2, 1)]
        );
        assert!(link.ref_score(0).is_nan());
        assert_eq!(link.ref_score(1), 0.3);
        assert_eq!(link.ref_score(2), 0.2);
        assert_eq!(link.score(), 0.2);
        // identity is the refs alone
        let plain = RowLink::from_refs(link.refs().to_vec()).unwrap();
        assert_eq!(plain, link);
        assert!(plain.score().is_nan());

        let one = RowLink::multi_pair(reference, vec![(RowRef::new(1, 0), 0.5)]);
        assert_eq!(one.shape(), LinkShape::Pair);
        assert_eq!(one.score(), 0.5);
        assert_eq!(RowLink::multi_pair(reference, Vec::new()).shape(), LinkShape::Single);
    }

    #[test]
    fn display_lists_refs() {
        let link = RowLink::pair(RowRef::new(1, 2), RowRef::new(0, 4));
        assert_eq!(link.to_string(), "(0:4, 1:2)");
    }
}
