//! Word-list stage: selects documents through the inverted index.

use super::{Executor, Intermediate};
use crate::bitset::DocBitSet;
use crate::error::Result;
use crate::query::Conjunction;
use crate::store::Store;

/// Evaluates the word list over posting lists, or selects every live
/// document when the query has no word list.
///
/// Evaluation runs on bitsets sized to the highest allocated id, so `NOT`
/// also yields ids of deleted documents. The result is intersected with the
/// live ids before it leaves the stage.
pub struct TermsExecutor<'a> {
    store: &'a Store,
    words: Option<Conjunction<String>>,
}

impl<'a> TermsExecutor<'a> {
    pub fn new(store: &'a Store, words: Option<Conjunction<String>>) -> Self {
        TermsExecutor { store, words }
    }

    /// A single-word selection.
    pub fn word(store: &'a Store, word: impl Into<String>) -> Self {
        Self::new(store, Some(Conjunction::Leaf(word.into())))
    }

    /// The raw bitset for a tree, before masking out dead ids.
    pub fn evaluate(&self, node: &Conjunction<String>, max: u64) -> DocBitSet {
        match node {
            Conjunction::Leaf(word) => match self.store.find_term(word) {
                Some(term) => DocBitSet::from_ids(max, term.posting_list.iter().copied()),
                None => DocBitSet::new(max),
            },
            Conjunction::Not(inner) => {
                let mut set = self.evaluate(inner, max);
                set.flip();
                set
            }
            Conjunction::And(children) => self.fold(children, max, DocBitSet::and_with),
            Conjunction::Or(children) => self.fold(children, max, DocBitSet::or_with),
        }
    }

    fn fold(
        &self,
        children: &[Conjunction<String>],
        max: u64,
        combine: fn(&mut DocBitSet, &DocBitSet),
    ) -> DocBitSet {
        let mut iter = children.iter();
        let Some(first) = iter.next() else {
            return DocBitSet::new(max);
        };
        let mut acc = self.evaluate(first, max);
        for child in iter {
            combine(&mut acc, &self.evaluate(child, max));
        }
        acc
    }
}

impl Executor for TermsExecutor<'_> {
    fn name(&self) -> &'static str {
        "terms"
    }

    fn execute(&self, _input: Intermediate) -> Result<Intermediate> {
        let live = self.store.live_ids();
        let Some(words) = &self.words else {
            return Ok(Intermediate::DocIds(live));
        };
        let max = self.store.max_allocated_doc_id();
        let selected = self.evaluate(words, max);
        Ok(Intermediate::DocIds(
            live.into_iter().filter(|id| selected.contains(*id)).collect(),
        ))
    }
}
