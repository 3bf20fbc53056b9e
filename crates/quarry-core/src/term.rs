//! Posting lists.

use crate::codec::{Decode, Encode, ReadBuffer, WriteBuffer};
use crate::error::{QuarryError, Result};
use crate::types::DocId;
use std::collections::BTreeSet;

/// Byte offsets of every occurrence of a term within one document.
pub type OffsetSet = BTreeSet<u64>;

/// A word and the documents it occurs in.
///
/// `posting_list` is strictly ascending and `statistics_list[i]` holds the
/// offsets for `posting_list[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Term {
    pub posting_list: Vec<DocId>,
    pub statistics_list: Vec<OffsetSet>,
}

impl Term {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence, inserting the document at its sorted position.
    ///
    /// Returns false if the offset was already recorded for this document.
    pub fn add_occurrence(&mut self, doc_id: DocId, offset: u64) -> bool {
        let idx = match self.posting_list.binary_search(&doc_id) {
            Ok(idx) => idx,
            Err(idx) => {
                self.posting_list.insert(idx, doc_id);
                self.statistics_list.insert(idx, OffsetSet::new());
                idx
            }
        };
        self.statistics_list[idx].insert(offset)
    }

    /// Offsets recorded for `doc_id`, if the term occurs in it.
    pub fn offsets(&self, doc_id: DocId) -> Option<&OffsetSet> {
        self.posting_list
            .binary_search(&doc_id)
            .ok()
            .map(|idx| &self.statistics_list[idx])
    }

    /// Number of documents containing the term.
    pub fn document_frequency(&self) -> usize {
        self.posting_list.len()
    }

    /// Keep only documents for which `live` returns true.
    ///
    /// Returns the number of entries removed.
    pub fn retain_documents(&mut self, mut live: impl FnMut(DocId) -> bool) -> usize {
        let before = self.posting_list.len();
        let mut kept_ids = Vec::with_capacity(before);
        let mut kept_stats = Vec::with_capacity(before);
        for (id, stats) in self
            .posting_list
            .drain(..)
            .zip(self.statistics_list.drain(..))
        {
            if live(id) {
                kept_ids.push(id);
                kept_stats.push(stats);
            }
        }
        self.posting_list = kept_ids;
        self.statistics_list = kept_stats;
        before - self.posting_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posting_list.is_empty()
    }
}

impl Encode for Term {
    fn encode(&self, w: &mut WriteBuffer) {
        self.posting_list.encode(w);
        self.statistics_list.encode(w);
    }
}

impl Decode for Term {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        let posting_list: Vec<DocId> = r.read_vec()?;
        let statistics_list: Vec<OffsetSet> = r.read_vec()?;
        if posting_list.len() != statistics_list.len() {
            return Err(QuarryError::corrupted(format!(
                "posting list has {} entries but statistics list has {}",
                posting_list.len(),
                statistics_list.len()
            )));
        }
        if posting_list.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QuarryError::corrupted("posting list is not strictly ascending"));
        }
        Ok(Term {
            posting_list,
            statistics_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_insertion() {
        let mut term = Term::new();
        for (doc, offset) in [(5, 0), (2, 10), (9, 3), (2, 4), (5, 7), (1, 0)] {
            assert!(term.add_occurrence(DocId(doc), offset));
        }
        assert_eq!(
            term.posting_list,
            vec![DocId(1), DocId(2), DocId(5), DocId(9)]
        );
        assert_eq!(term.posting_list.len(), term.statistics_list.len());
        assert_eq!(
            term.offsets(DocId(2)).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![4, 10]
        );
        assert_eq!(
            term.offsets(DocId(5)).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0, 7]
        );
        assert!(term.offsets(DocId(3)).is_none());
    }

    #[test]
    fn test_duplicate_offset_rejected() {
        let mut term = Term::new();
        assert!(term.add_occurrence(DocId(1), 4));
        assert!(!term.add_occurrence(DocId(1), 4));
        assert_eq!(term.offsets(DocId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_retain_documents() {
        let mut term = Term::new();
        for doc in 1..=5 {
            term.add_occurrence(DocId(doc), doc * 10);
        }
        let removed = term.retain_documents(|id| id.0 % 2 == 1);
        assert_eq!(removed, 2);
        assert_eq!(term.posting_list, vec![DocId(1), DocId(3), DocId(5)]);
        assert_eq!(term.offsets(DocId(3)).unwrap().first(), Some(&30));
    }

    #[test]
    fn test_decode_rejects_misaligned_lists() {
        let mut w = WriteBuffer::new();
        vec![DocId(1), DocId(2)].encode(&mut w);
        vec![OffsetSet::new()].encode(&mut w);
        let bytes = w.into_inner();
        assert!(Term::decode(&mut ReadBuffer::new(&bytes)).is_err());
    }
}
