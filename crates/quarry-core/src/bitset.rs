//! Fixed-size bitsets over document ids.

use crate::types::DocId;
use std::fmt;

/// A set of document ids in `[1, max]` stored one bit per id.
///
/// Bit `i` is doc id `i`; bit 0 is never set. All sets taking part in one
/// boolean evaluation share the same `max`.
#[derive(Clone, PartialEq, Eq)]
pub struct DocBitSet {
    max: u64,
    words: Vec<u64>,
}

impl DocBitSet {
    /// An empty set able to hold ids up to `max`.
    pub fn new(max: u64) -> Self {
        let words = (max as usize + 1).div_ceil(64);
        DocBitSet {
            max,
            words: vec![0; words],
        }
    }

    /// Every id in `[1, max]`.
    pub fn full(max: u64) -> Self {
        let mut set = Self::new(max);
        set.words.iter_mut().for_each(|w| *w = u64::MAX);
        set.mask_out_of_range();
        set
    }

    pub fn from_ids(max: u64, ids: impl IntoIterator<Item = DocId>) -> Self {
        let mut set = Self::new(max);
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Set the bit for `id`. Ids outside `[1, max]` are ignored.
    pub fn insert(&mut self, id: DocId) {
        if id.0 == 0 || id.0 > self.max {
            return;
        }
        self.words[(id.0 / 64) as usize] |= 1 << (id.0 % 64);
    }

    pub fn contains(&self, id: DocId) -> bool {
        if id.0 == 0 || id.0 > self.max {
            return false;
        }
        self.words[(id.0 / 64) as usize] & (1 << (id.0 % 64)) != 0
    }

    pub fn and_with(&mut self, other: &DocBitSet) {
        debug_assert_eq!(self.max, other.max);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    pub fn or_with(&mut self, other: &DocBitSet) {
        debug_assert_eq!(self.max, other.max);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Complement within `[1, max]`.
    pub fn flip(&mut self) {
        for w in &mut self.words {
            *w = !*w;
        }
        self.mask_out_of_range();
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let base = i as u64 * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as u64;
                bits &= bits - 1;
                Some(DocId(base + tz))
            })
        })
    }

    /// Clear bit 0 and every bit above `max`.
    fn mask_out_of_range(&mut self) {
        if let Some(first) = self.words.first_mut() {
            *first &= !1;
        }
        let used = (self.max % 64) + 1;
        if used < 64 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }
}

impl fmt::Debug for DocBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.0)).finish()
    }
}
