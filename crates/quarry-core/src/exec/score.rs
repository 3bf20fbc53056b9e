//! BM25 ranking stage.

use super::{unexpected_input, Executor, Intermediate, ScoredDocs};
use crate::config::ScoringConfig;
use crate::error::Result;
use crate::query::Query;
use crate::store::Store;
use crate::term::Term;
use crate::types::DocId;
use std::sync::Arc;

/// Scores candidates with BM25 over the query's words.
///
/// For each query word with document frequency `df` among `N` allocated
/// ids, occurring `occ` times in a document of `wc` words:
///
/// ```text
/// idf = ln((N - df + 0.5) / (df + 0.5))
/// tf  = occ / wc
/// K   = k1 * (1 - b + b * wc / avg_wc)
/// sqd = (k1 + 1) * tf / (K + tf)
/// sqq = (k3 + 1) * f / (k3 + f)   when the query has many distinct words, else 1
/// ```
///
/// where `f` is how often the word appears in the query. The document score
/// is the sum of `idf * sqd * sqq`, stored as `round(score * granularity)`.
pub struct ScoreExecutor<'a> {
    store: &'a Store,
    /// Distinct query words with their frequency in the query
    terms: Vec<(String, usize)>,
    scoring: ScoringConfig,
}

impl<'a> ScoreExecutor<'a> {
    pub fn new(store: &'a Store, terms: Vec<(String, usize)>, scoring: ScoringConfig) -> Self {
        ScoreExecutor {
            store,
            terms,
            scoring,
        }
    }

    pub fn for_query(store: &'a Store, query: &Query, scoring: ScoringConfig) -> Self {
        let mut terms: Vec<(String, usize)> = Vec::new();
        if let Some(words) = &query.words {
            for word in words.leaves() {
                match terms.iter_mut().find(|(w, _)| w == word) {
                    Some((_, f)) => *f += 1,
                    None => terms.push((word.clone(), 1)),
                }
            }
        }
        Self::new(store, terms, scoring)
    }

    /// Score one document. Missing documents score `None`.
    pub fn score(&self, id: DocId) -> Option<f64> {
        let stats = self.term_stats();
        self.score_with(id, &stats)
    }

    fn term_stats(&self) -> Vec<(Arc<Term>, f64, f64)> {
        let n = self.store.max_allocated_doc_id() as f64;
        let long_query = self.terms.len() >= self.scoring.long_query_terms;
        let k3 = self.scoring.k3;

        self.terms
            .iter()
            .filter_map(|(word, f)| {
                let term = self.store.find_term(word)?;
                let df = match term.document_frequency() {
                    0 => n,
                    df => df as f64,
                };
                let idf = ((n - df + 0.5) / (df + 0.5)).ln();
                let f = *f as f64;
                let sqq = if long_query { (k3 + 1.0) * f / (k3 + f) } else { 1.0 };
                Some((term, idf, sqq))
            })
            .collect()
    }

    fn score_with(&self, id: DocId, stats: &[(Arc<Term>, f64, f64)]) -> Option<f64> {
        let doc = self.store.find_document(id)?;
        let wc = doc.word_count() as f64;
        if wc == 0.0 {
            return Some(0.0);
        }
        let avg = self.store.avg_word_count();
        let ScoringConfig { k1, b, .. } = self.scoring;
        let k = k1 * (1.0 - b + b * wc / avg);

        let mut score = 0.0;
        for (term, idf, sqq) in stats {
            let occurrences = term.offsets(id).map_or(0, |o| o.len());
            if occurrences == 0 {
                continue;
            }
            let tf = occurrences as f64 / wc;
            let sqd = (k1 + 1.0) * tf / (k + tf);
            score += idf * sqd * sqq;
        }
        Some(score)
    }
}

impl Executor for ScoreExecutor<'_> {
    fn name(&self) -> &'static str {
        "score"
    }

    fn execute(&self, input: Intermediate) -> Result<Intermediate> {
        let ids = match input {
            Intermediate::DocIds(ids) => ids,
            other => return Err(unexpected_input(self.name(), &other)),
        };

        let stats = self.term_stats();
        let mut scored = ScoredDocs::new();
        for id in ids {
            if let Some(score) = self.score_with(id, &stats) {
                scored.insert((score * self.scoring.granularity).round() as i64, id);
            }
        }
        Ok(Intermediate::Scored(scored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::KvMap;
    use crate::exec::test_support::add_doc;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn scored(result: Intermediate) -> ScoredDocs {
        match result {
            Intermediate::Scored(docs) => docs,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn make_store(dir: &TempDir) -> Store {
        let store = Store::open(dir.path(), true).unwrap();
        add_doc(&store, "/1", "river river river flows", KvMap::new());
        add_doc(&store, "/2", "river runs down to the sea", KvMap::new());
        add_doc(&store, "/3", "mountain", KvMap::new());
        add_doc(&store, "/4", "lake", KvMap::new());
        add_doc(&store, "/5", "sky", KvMap::new());
        store
    }

    #[test]
    fn test_denser_document_ranks_higher() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        let stage = ScoreExecutor::new(&store, vec![("river".into(), 1)], ScoringConfig::default());

        let dense = stage.score(DocId(1)).unwrap();
        let sparse = stage.score(DocId(2)).unwrap();
        assert!(dense > sparse, "{} <= {}", dense, sparse);
        assert_eq!(stage.score(DocId(3)), Some(0.0));
        assert_eq!(stage.score(DocId(42)), None);

        let ids: BTreeSet<DocId> = [1, 2, 3, 42].map(DocId).into_iter().collect();
        let result = scored(stage.execute(Intermediate::DocIds(ids)).unwrap());
        assert_eq!(result.ids(), vec![DocId(1), DocId(2), DocId(3)]);
    }

    #[test]
    fn test_formula() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        let scoring = ScoringConfig::default();
        let stage = ScoreExecutor::new(&store, vec![("river".into(), 1)], scoring.clone());

        let n = 5.0_f64;
        let df = 2.0_f64;
        let idf = ((n - df + 0.5) / (df + 0.5)).ln();
        let avg = (4.0 + 6.0 + 1.0 + 1.0 + 1.0) / 5.0;
        let wc = 4.0;
        let tf = 3.0 / wc;
        let k = scoring.k1 * (1.0 - scoring.b + scoring.b * wc / avg);
        let expected = idf * (scoring.k1 + 1.0) * tf / (k + tf);

        let got = stage.score(DocId(1)).unwrap();
        assert!((got - expected).abs() < 1e-12, "{} vs {}", got, expected);
    }

    #[test]
    fn test_no_terms_scores_zero() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        let stage = ScoreExecutor::for_query(&store, &Query::default(), ScoringConfig::default());
        let ids: BTreeSet<DocId> = [3, 1, 2].map(DocId).into_iter().collect();
        let result = scored(stage.execute(Intermediate::DocIds(ids)).unwrap());
        assert_eq!(
            result.iter().collect::<Vec<_>>(),
            vec![(0, DocId(1)), (0, DocId(2)), (0, DocId(3))]
        );
    }

    #[test]
    fn test_query_frequency_counted() {
        let dir = TempDir::new().unwrap();
        let store = make_store(&dir);
        let query = match crate::query::parse("'river' OR ('river' AND 'sea')", 0, 0) {
            crate::query::ParseOutcome::Ast(q) => q,
            other => panic!("unexpected {:?}", other),
        };
        let stage = ScoreExecutor::for_query(&store, &query, ScoringConfig::default());
        assert_eq!(
            stage.terms,
            vec![("river".to_string(), 2), ("sea".to_string(), 1)]
        );
    }
}
