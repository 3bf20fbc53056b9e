//! Query execution.
//!
//! A [`Pipeline`] always runs four stages in order: word selection, HAVING
//! filter, BM25 scoring and limit. Stages hand each other an
//! [`Intermediate`], which is a plain id set before scoring and a ranked
//! [`ScoredDocs`] after it. Clauses missing from the query become stages
//! that select every live document or pass their input through.

pub mod having;
pub mod limit;
pub mod predicate;
pub mod score;
pub mod terms;

pub use having::HavingExecutor;
pub use limit::LimitExecutor;
pub use score::ScoreExecutor;
pub use terms::TermsExecutor;

use crate::config::ScoringConfig;
use crate::error::{QuarryError, Result};
use crate::query::Query;
use crate::store::Store;
use crate::types::DocId;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Documents ranked by integer score, highest first. Equal scores are
/// ordered by ascending id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoredDocs {
    entries: BTreeMap<Reverse<i64>, BTreeSet<DocId>>,
    len: usize,
}

impl ScoredDocs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, score: i64, id: DocId) {
        if self.entries.entry(Reverse(score)).or_default().insert(id) {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `(score, id)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, DocId)> + '_ {
        self.entries
            .iter()
            .flat_map(|(Reverse(score), ids)| ids.iter().map(move |id| (*score, *id)))
    }

    pub fn ids(&self) -> Vec<DocId> {
        self.iter().map(|(_, id)| id).collect()
    }

    /// Keep only the first `n` entries in rank order.
    pub fn truncate(&mut self, n: usize) {
        if n >= self.len {
            return;
        }
        let kept: Vec<(i64, DocId)> = self.iter().take(n).collect();
        *self = kept.into_iter().collect();
    }
}

impl FromIterator<(i64, DocId)> for ScoredDocs {
    fn from_iter<I: IntoIterator<Item = (i64, DocId)>>(iter: I) -> Self {
        let mut docs = ScoredDocs::new();
        for (score, id) in iter {
            docs.insert(score, id);
        }
        docs
    }
}

/// Value passed between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intermediate {
    DocIds(BTreeSet<DocId>),
    Scored(ScoredDocs),
}

impl Intermediate {
    pub fn len(&self) -> usize {
        match self {
            Intermediate::DocIds(ids) => ids.len(),
            Intermediate::Scored(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Intermediate::DocIds(_) => "doc ids",
            Intermediate::Scored(_) => "scored docs",
        }
    }
}

/// One pipeline stage.
pub trait Executor {
    fn name(&self) -> &'static str;

    fn execute(&self, input: Intermediate) -> Result<Intermediate>;
}

/// Error for a stage handed the wrong kind of input.
pub(crate) fn unexpected_input(stage: &str, input: &Intermediate) -> QuarryError {
    QuarryError::internal(format!("{} stage received {}", stage, input.kind()))
}

pub struct Pipeline<'a> {
    stages: Vec<Box<dyn Executor + 'a>>,
}

impl<'a> Pipeline<'a> {
    /// Build the four-stage pipeline for a parsed query.
    pub fn from_query(store: &'a Store, query: &Query, scoring: &ScoringConfig) -> Self {
        Pipeline {
            stages: vec![
                Box::new(TermsExecutor::new(store, query.words.clone())),
                Box::new(HavingExecutor::new(store, query.having.clone())),
                Box::new(ScoreExecutor::for_query(store, query, scoring.clone())),
                Box::new(LimitExecutor::new(query.limit)),
            ],
        }
    }

    pub fn from_stages(stages: Vec<Box<dyn Executor + 'a>>) -> Self {
        Pipeline { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage and return the ranked result.
    pub fn execute(&self) -> Result<ScoredDocs> {
        let mut current = Intermediate::DocIds(BTreeSet::new());
        for stage in &self.stages {
            current = stage.execute(current)?;
            trace!(stage = stage.name(), results = current.len(), "Stage done");
        }
        Ok(match current {
            Intermediate::Scored(docs) => docs,
            Intermediate::DocIds(ids) => ids.into_iter().map(|id| (0, id)).collect(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::add_doc;
    use super::*;
    use crate::document::KvMap;
    use crate::query::{parse, ParseOutcome};
    use tempfile::TempDir;

    fn run(store: &Store, text: &str) -> Vec<DocId> {
        let ParseOutcome::Ast(query) = parse(text, 0, 0) else {
            panic!("{:?} did not parse", text);
        };
        Pipeline::from_query(store, &query, &ScoringConfig::default())
            .execute()
            .unwrap()
            .ids()
    }

    #[test]
    fn test_scored_docs_order() {
        let docs: ScoredDocs = [(5, DocId(3)), (9, DocId(7)), (5, DocId(1)), (0, DocId(2))]
            .into_iter()
            .collect();
        assert_eq!(
            docs.iter().collect::<Vec<_>>(),
            vec![(9, DocId(7)), (5, DocId(1)), (5, DocId(3)), (0, DocId(2))]
        );
        let mut top = docs.clone();
        top.truncate(2);
        assert_eq!(top.ids(), vec![DocId(7), DocId(1)]);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_pipeline_shape() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), true).unwrap();
        let pipeline = Pipeline::from_query(&store, &Query::default(), &ScoringConfig::default());
        assert_eq!(pipeline.stage_names(), vec!["terms", "having", "score", "limit"]);
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), true).unwrap();
        let a = add_doc(&store, "/a", "apple banana", KvMap::new());
        let b = add_doc(&store, "/b", "apple apple apple cherry", KvMap::new());
        let c = add_doc(&store, "/c", "cherry", KvMap::new());
        let _d = add_doc(&store, "/d", "durian", KvMap::new());

        assert_eq!(run(&store, "'banana'"), vec![a]);
        assert_eq!(run(&store, "'apple' AND 'cherry'"), vec![b]);
        let mut either = run(&store, "'banana' OR 'cherry'");
        either.sort();
        assert_eq!(either, vec![a, b, c]);
        assert_eq!(run(&store, "'apple' LIMIT 1").len(), 1);
        assert!(run(&store, "'missing'").is_empty());

        store.delete_document(c);
        assert_eq!(run(&store, "'cherry'"), vec![b]);
        assert!(!run(&store, "NOT 'apple'").contains(&c));
    }
}
