//! Query and document-access telemetry.
//!
//! The searcher records one [`QueryRecord`] per search and bumps the query
//! counter of every document it returns. Callers serving documents bump the
//! download counter. Both survive restarts through a bincode snapshot
//! written next to the store's metadata file.

use crate::error::Result;
use crate::types::{now_seconds, DocId};
use chrono::NaiveDateTime;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Oldest query records are dropped beyond this many.
pub const MAX_QUERY_RECORDS: usize = 10_000;

/// One executed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub at: NaiveDateTime,
    pub query: String,
    pub elapsed_micros: u64,
    pub result_count: usize,
}

/// Access counters of one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFreq {
    pub download: u64,
    pub query: u64,
}

#[derive(Serialize, Deserialize)]
struct TelemetrySnapshot {
    queries: Vec<QueryRecord>,
    freqs: Vec<(DocId, DocumentFreq)>,
}

#[derive(Debug, Default)]
pub struct Telemetry {
    queries: RwLock<VecDeque<QueryRecord>>,
    freqs: DashMap<DocId, DocumentFreq>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, query: &str, elapsed: Duration, result_count: usize) {
        let mut queries = self.queries.write();
        if queries.len() >= MAX_QUERY_RECORDS {
            queries.pop_front();
        }
        queries.push_back(QueryRecord {
            at: now_seconds(),
            query: query.to_string(),
            elapsed_micros: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            result_count,
        });
    }

    pub fn add_query_freq(&self, id: DocId) {
        self.freqs.entry(id).or_default().query += 1;
    }

    pub fn add_download_freq(&self, id: DocId) {
        self.freqs.entry(id).or_default().download += 1;
    }

    pub fn frequency(&self, id: DocId) -> DocumentFreq {
        self.freqs.get(&id).map(|f| *f).unwrap_or_default()
    }

    /// All recorded queries, oldest first.
    pub fn query_statistics(&self) -> Vec<QueryRecord> {
        self.queries.read().iter().cloned().collect()
    }

    /// Per-document counters ordered by downloads, then queries, both
    /// descending, then by id.
    pub fn document_frequencies(&self) -> Vec<(DocId, DocumentFreq)> {
        let mut out: Vec<_> = self.freqs.iter().map(|e| (*e.key(), *e.value())).collect();
        out.sort_by(|(ia, a), (ib, b)| {
            b.download
                .cmp(&a.download)
                .then(b.query.cmp(&a.query))
                .then(ia.cmp(ib))
        });
        out
    }

    /// Drop counters for a document that no longer exists.
    pub fn forget(&self, id: DocId) {
        self.freqs.remove(&id);
    }

    pub fn clear(&self) {
        self.queries.write().clear();
        self.freqs.clear();
    }

    /// Write a snapshot atomically (temp file, then rename).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = TelemetrySnapshot {
            queries: self.query_statistics(),
            freqs: self.freqs.iter().map(|e| (*e.key(), *e.value())).collect(),
        };
        let temp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            bincode::serialize_into(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        debug!(
            path = %path.display(),
            queries = snapshot.queries.len(),
            documents = snapshot.freqs.len(),
            "Telemetry saved"
        );
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: TelemetrySnapshot = bincode::deserialize_from(reader)?;
        Ok(Telemetry {
            queries: RwLock::new(snapshot.queries.into()),
            freqs: snapshot.freqs.into_iter().collect(),
        })
    }

    /// Load a snapshot, starting empty if it is missing or unreadable.
    pub fn load_or_new(path: &Path) -> Self {
        if !path.exists() {
            return Telemetry::new();
        }
        match Self::load_from(path) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load telemetry, starting empty");
                Telemetry::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_frequency_ordering() {
        let t = Telemetry::new();
        for _ in 0..4 {
            t.add_query_freq(DocId(4));
            t.add_query_freq(DocId(8));
        }
        for _ in 0..16 {
            t.add_query_freq(DocId(2));
        }
        t.add_download_freq(DocId(8));
        t.add_download_freq(DocId(8));
        t.add_download_freq(DocId(4));

        let freqs = t.document_frequencies();
        assert_eq!(freqs.len(), 3);
        assert_eq!(freqs[0], (DocId(8), DocumentFreq { download: 2, query: 4 }));
        assert_eq!(freqs[1], (DocId(4), DocumentFreq { download: 1, query: 4 }));
        assert_eq!(freqs[2], (DocId(2), DocumentFreq { download: 0, query: 16 }));
    }

    #[test]
    fn test_query_records_bounded() {
        let t = Telemetry::new();
        for i in 0..MAX_QUERY_RECORDS + 5 {
            t.record_query(&format!("q{}", i), Duration::from_micros(3), 1);
        }
        let stats = t.query_statistics();
        assert_eq!(stats.len(), MAX_QUERY_RECORDS);
        assert_eq!(stats[0].query, "q5");
        assert_eq!(stats[0].elapsed_micros, 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry");

        let t = Telemetry::new();
        t.record_query("'fall'", Duration::from_millis(2), 3);
        t.add_download_freq(DocId(1));
        t.save_to(&path).unwrap();

        let loaded = Telemetry::load_from(&path).unwrap();
        assert_eq!(loaded.query_statistics(), t.query_statistics());
        assert_eq!(loaded.frequency(DocId(1)).download, 1);
    }

    #[test]
    fn test_load_or_new_on_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry");
        fs::write(&path, b"\x01").unwrap();

        let t = Telemetry::load_or_new(&path);
        assert!(t.query_statistics().is_empty());
    }
}
