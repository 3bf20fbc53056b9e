//! Query entry point: parsing, execution, snippets and telemetry.
//!
//! A query made of a single bare token is treated as a word prefix: it is
//! completed through the vocabulary trie and every completion is searched
//! on its own. Anything else goes through the query parser.

use crate::config::{Config, ScoringConfig, SearchConfig};
use crate::document::Document;
use crate::error::Result;
use crate::exec::{
    Executor, HavingExecutor, LimitExecutor, Pipeline, ScoreExecutor, ScoredDocs, TermsExecutor,
};
use crate::query::{parse_with, Query};
use crate::store::Store;
use crate::types::DocId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Snippet text for hits selected without any word occurrence.
pub const NO_MATCH_TEXT: &str = "no match text";

/// Snippet text when the document's file can no longer be read.
pub const UNREADABLE_TEXT: &str = "<unable to read file>";

/// One occurrence of a query word in a hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub term: String,
    /// Byte offset of the occurrence in the file
    pub offset: u64,
    pub len: usize,
    /// Context around the occurrence
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: DocId,
    pub path: PathBuf,
    pub score: f64,
    pub highlights: Vec<Highlight>,
}

pub struct Searcher {
    store: Arc<Store>,
    scoring: ScoringConfig,
    search: SearchConfig,
}

impl Searcher {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Searcher {
            store,
            scoring: config.scoring.clone(),
            search: config.search.clone(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Run a query and return ranked hits.
    ///
    /// Syntax errors are logged and produce no hits. Every call is recorded
    /// in the store's telemetry.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        let text = query.trim();

        let hits = if text.is_empty() {
            Vec::new()
        } else if is_prefix_query(text) {
            self.search_prefix(text)?
        } else {
            match parse_with(text, &self.search).into_result() {
                Ok(Some(ast)) => self.search_ast(&ast)?,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(query = text, error = %e, "Query rejected");
                    Vec::new()
                }
            }
        };

        let telemetry = self.store.telemetry();
        telemetry.record_query(query, started.elapsed(), hits.len());
        for hit in &hits {
            telemetry.add_query_freq(hit.id);
        }
        debug!(
            query = text,
            hits = hits.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Search done"
        );
        Ok(hits)
    }

    /// Execute an already parsed query.
    pub fn search_ast(&self, query: &Query) -> Result<Vec<SearchHit>> {
        let ranked = Pipeline::from_query(&self.store, query, &self.scoring).execute()?;
        let terms = query.terms();
        Ok(ranked
            .iter()
            .filter_map(|(score, id)| self.hit(id, self.unscale(score), &terms))
            .collect())
    }

    fn search_prefix(&self, prefix: &str) -> Result<Vec<SearchHit>> {
        // best score and matching completions per document
        let mut merged: BTreeMap<DocId, (i64, Vec<String>)> = BTreeMap::new();
        for word in self.store.complete(prefix, self.search.fuzzy_candidates) {
            for (score, id) in self.rank_word(&word)?.iter() {
                let entry = merged.entry(id).or_insert((score, Vec::new()));
                entry.0 = entry.0.max(score);
                entry.1.push(word.clone());
            }
        }

        let mut ranked: Vec<(DocId, i64, Vec<String>)> = merged
            .into_iter()
            .map(|(id, (score, words))| (id, score, words))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(ranked
            .into_iter()
            .filter_map(|(id, score, words)| self.hit(id, self.unscale(score), &words))
            .collect())
    }

    fn rank_word(&self, word: &str) -> Result<ScoredDocs> {
        let stages: Vec<Box<dyn Executor + '_>> = vec![
            Box::new(TermsExecutor::word(&self.store, word)),
            Box::new(HavingExecutor::new(&self.store, None)),
            Box::new(ScoreExecutor::new(
                &self.store,
                vec![(word.to_string(), 1)],
                self.scoring.clone(),
            )),
            Box::new(LimitExecutor::new(Some(self.search.fuzzy_limit))),
        ];
        Pipeline::from_stages(stages).execute()
    }

    fn unscale(&self, score: i64) -> f64 {
        score as f64 / self.scoring.granularity
    }

    fn hit(&self, id: DocId, score: f64, terms: &[String]) -> Option<SearchHit> {
        let doc = self.store.find_document(id)?;
        Some(SearchHit {
            id,
            path: doc.path().to_path_buf(),
            score,
            highlights: self.highlights(&doc, terms),
        })
    }

    /// Occurrences of `terms` in `doc`, earliest first, with snippets.
    fn highlights(&self, doc: &Document, terms: &[String]) -> Vec<Highlight> {
        let mut found: Vec<(u64, &str)> = Vec::new();
        for word in terms {
            if let Some(term) = self.store.find_term(word) {
                if let Some(offsets) = term.offsets(doc.id()) {
                    found.extend(offsets.iter().map(|&o| (o, word.as_str())));
                }
            }
        }
        found.sort();
        found.truncate(self.search.max_highlights);

        if found.is_empty() {
            return vec![Highlight {
                term: String::new(),
                offset: 0,
                len: 0,
                text: NO_MATCH_TEXT.to_string(),
            }];
        }

        found
            .into_iter()
            .map(|(offset, word)| {
                let text = doc
                    .snippet(offset, word.len(), self.search.snippet_width)
                    .unwrap_or_else(|e| {
                        warn!(path = %doc.path().display(), error = %e, "Failed to read snippet");
                        UNREADABLE_TEXT.to_string()
                    });
                Highlight {
                    term: word.to_string(),
                    offset,
                    len: word.len(),
                    text,
                }
            })
            .collect()
    }
}

/// A single bare token with no query syntax is completed as a prefix.
fn is_prefix_query(text: &str) -> bool {
    !text.contains(char::is_whitespace) && !text.starts_with(['\'', '(', '`'])
}
