//! The inverted-index store.
//!
//! ## Architecture
//!
//! - The term table (`word -> Term` plus the vocabulary [`Trie`]) and the
//!   document table (`DocId -> Document`) sit behind independent locks.
//!   Single-map operations take one lock. Whole-store snapshot, load and
//!   clear take both, always terms first.
//! - Terms are held as `Arc<Term>` and updated copy-on-write, so a reader
//!   holding a term from [`Store::find_term`] keeps a consistent snapshot.
//! - `delete_document` only touches the document table. Posting lists keep
//!   referring to the deleted id until [`Store::tidy_term`] sweeps them; the
//!   executors filter against the live ids in the meantime.
//! - Dropping the store flushes it to `<dir>/meta`. There is no write-ahead
//!   log, so anything since the last flush is lost on a crash.
//!
//! ## Metadata File Format
//!
//! ```text
//! [u64 next_doc_id]
//! [u64 term_count]  { [string word] [posting list] [statistics list] } * term_count
//! [u64 doc_count]   { [u64 id] [document record] } * doc_count
//! ```

use crate::codec::{Decode, Encode, ReadBuffer, WriteBuffer};
use crate::document::{Document, DocumentInfo, KvMap};
use crate::error::{QuarryError, Result};
use crate::telemetry::Telemetry;
use crate::term::Term;
use crate::trie::Trie;
use crate::types::{DocId, DocumentType};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const META_FILE: &str = "meta";
const TELEMETRY_FILE: &str = "telemetry";

#[derive(Default)]
struct TermTable {
    terms: BTreeMap<String, Arc<Term>>,
    vocabulary: Trie,
}

/// Term and document storage for one database directory.
pub struct Store {
    dir: PathBuf,
    terms: RwLock<TermTable>,
    documents: RwLock<BTreeMap<DocId, Arc<Document>>>,
    next_doc_id: AtomicU64,
    /// Cached mean word count, tagged with the generation it was computed at
    avg_word_count: Mutex<Option<(u64, f64)>>,
    generation: AtomicU64,
    telemetry: Telemetry,
}

impl Store {
    /// Open the store at `dir`.
    ///
    /// In create mode a missing directory is created and the store starts
    /// empty. Otherwise the directory must exist and its metadata is loaded.
    pub fn open(dir: impl AsRef<Path>, create: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        if dir.exists() && !dir.is_dir() {
            return Err(QuarryError::DatabaseType {
                path: dir,
                reason: "not a directory".to_string(),
            });
        }

        if create {
            fs::create_dir_all(&dir)?;
            info!(path = %dir.display(), "Created empty store");
            return Ok(Self::empty(dir, Telemetry::new()));
        }

        if !dir.exists() {
            return Err(QuarryError::DatabaseType {
                path: dir,
                reason: "does not exist".to_string(),
            });
        }

        // decode before constructing, so a failed load never flushes an
        // empty store over the file it could not read
        let bytes = fs::read(dir.join(META_FILE))?;
        let (table, docs, next_doc_id) = decode_meta(&bytes)?;
        let telemetry = Telemetry::load_or_new(&dir.join(TELEMETRY_FILE));
        let store = Self::empty(dir, telemetry);
        store.install(table, docs, next_doc_id);
        Ok(store)
    }

    /// Load the store if it has been flushed before, otherwise create it.
    pub fn open_or_create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let create = !dir.join(META_FILE).exists();
        Self::open(dir, create)
    }

    fn empty(dir: PathBuf, telemetry: Telemetry) -> Self {
        Store {
            dir,
            terms: RwLock::new(TermTable::default()),
            documents: RwLock::new(BTreeMap::new()),
            next_doc_id: AtomicU64::new(1),
            avg_word_count: Mutex::new(None),
            generation: AtomicU64::new(0),
            telemetry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metadata file.
    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Modification counter, bumped by every mutating call.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // === Documents ===

    /// Allocate a fresh document id. Ids are never reused.
    pub fn new_doc_id(&self) -> DocId {
        DocId(self.next_doc_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Highest id handed out so far (0 if none).
    pub fn max_allocated_doc_id(&self) -> u64 {
        self.next_doc_id.load(Ordering::Acquire) - 1
    }

    pub fn add_document(
        &self,
        id: DocId,
        path: impl Into<PathBuf>,
        info: DocumentInfo,
        kvs: KvMap,
    ) -> Arc<Document> {
        let doc = Arc::new(Document::new(id, path, info, kvs));
        self.documents.write().insert(id, Arc::clone(&doc));
        self.touch();
        doc
    }

    pub fn find_document(&self, id: DocId) -> Option<Arc<Document>> {
        self.documents.read().get(&id).cloned()
    }

    /// Remove a document from the document table.
    ///
    /// Posting lists still reference the id until the term is tidied.
    pub fn delete_document(&self, id: DocId) -> bool {
        let removed = self.documents.write().remove(&id).is_some();
        if removed {
            self.telemetry.forget(id);
            self.touch();
        }
        removed
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Ids of all live documents.
    pub fn live_ids(&self) -> BTreeSet<DocId> {
        self.documents.read().keys().copied().collect()
    }

    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.documents.read().values().cloned().collect()
    }

    /// Mean word count over live documents, 0 when there are none.
    pub fn avg_word_count(&self) -> f64 {
        let generation = self.generation();
        if let Some((at, avg)) = *self.avg_word_count.lock() {
            if at == generation {
                return avg;
            }
        }
        let avg = {
            let docs = self.documents.read();
            if docs.is_empty() {
                0.0
            } else {
                docs.values().map(|d| d.word_count() as f64).sum::<f64>() / docs.len() as f64
            }
        };
        *self.avg_word_count.lock() = Some((generation, avg));
        avg
    }

    /// Number of live documents per type.
    pub fn type_histogram(&self) -> HashMap<DocumentType, usize> {
        let mut histogram = HashMap::new();
        for doc in self.documents.read().values() {
            *histogram.entry(doc.doc_type()).or_insert(0) += 1;
        }
        histogram
    }

    // === Terms ===

    /// Record that `word` occurs in `doc_id` at byte `offset`.
    pub fn add_term(&self, word: &str, doc_id: DocId, offset: u64) {
        let mut table = self.terms.write();
        let inserted = match table.terms.get_mut(word) {
            Some(term) => Arc::make_mut(term).add_occurrence(doc_id, offset),
            None => {
                let mut term = Term::new();
                term.add_occurrence(doc_id, offset);
                table.terms.insert(word.to_string(), Arc::new(term));
                table.vocabulary.insert(word);
                true
            }
        };
        debug_assert!(
            inserted,
            "duplicate offset {} for term {:?} in document {}",
            offset, word, doc_id
        );
        self.touch();
    }

    pub fn find_term(&self, word: &str) -> Option<Arc<Term>> {
        self.terms.read().terms.get(word).cloned()
    }

    /// Drop posting entries of deleted documents from one term.
    ///
    /// A term left with no documents is removed along with its vocabulary
    /// entry. Returns the number of entries dropped.
    pub fn tidy_term(&self, word: &str) -> usize {
        let mut table = self.terms.write();
        let docs = self.documents.read();

        let Some(term) = table.terms.get_mut(word) else {
            return 0;
        };
        if term.posting_list.iter().all(|id| docs.contains_key(id)) {
            return 0;
        }
        let removed = Arc::make_mut(term).retain_documents(|id| docs.contains_key(&id));
        if term.is_empty() {
            table.terms.remove(word);
            table.vocabulary.remove(word);
        }
        drop(docs);
        self.touch();
        removed
    }

    /// Tidy every term. Returns the number of entries dropped.
    #[instrument(skip(self))]
    pub fn tidy_all_terms(&self) -> usize {
        let words: Vec<String> = self.terms.read().terms.keys().cloned().collect();
        let removed: usize = words.iter().map(|w| self.tidy_term(w)).sum();
        debug!(terms = words.len(), removed, "Tidied posting lists");
        removed
    }

    pub fn term_count(&self) -> usize {
        self.terms.read().terms.len()
    }

    /// Up to `limit` vocabulary words starting with `prefix`.
    pub fn complete(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.terms.read().vocabulary.complete(prefix, limit)
    }

    // === Whole store ===

    /// Remove all terms and documents. The id counter keeps counting.
    pub fn clear(&self) {
        {
            let mut table = self.terms.write();
            let mut docs = self.documents.write();
            *table = TermTable::default();
            docs.clear();
        }
        self.telemetry.clear();
        self.touch();
        info!(path = %self.dir.display(), "Store cleared");
    }

    /// Encode the whole store.
    pub fn serialize(&self) -> Vec<u8> {
        let table = self.terms.read();
        let docs = self.documents.read();

        let mut w = WriteBuffer::new();
        w.write_u64(self.next_doc_id.load(Ordering::Acquire));

        w.write_len(table.terms.len());
        for (word, term) in &table.terms {
            w.write_str(word);
            term.encode(&mut w);
        }

        w.write_len(docs.len());
        for (id, doc) in docs.iter() {
            id.encode(&mut w);
            doc.encode(&mut w);
        }
        w.into_inner()
    }

    /// Replace the in-memory state with the contents of the metadata file.
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn deserialize(&self) -> Result<()> {
        let bytes = fs::read(self.meta_path())?;
        let (table, docs, next_doc_id) = decode_meta(&bytes)?;
        self.install(table, docs, next_doc_id);
        Ok(())
    }

    fn install(&self, table: TermTable, docs: BTreeMap<DocId, Arc<Document>>, next_doc_id: u64) {
        info!(
            path = %self.dir.display(),
            terms = table.terms.len(),
            documents = docs.len(),
            next_doc_id,
            "Store loaded"
        );
        {
            let mut current_table = self.terms.write();
            let mut current_docs = self.documents.write();
            *current_table = table;
            *current_docs = docs;
            self.next_doc_id.store(next_doc_id, Ordering::Release);
        }
        self.touch();
    }

    /// Write the metadata and telemetry files.
    ///
    /// The metadata file is replaced atomically (temp file, then rename).
    #[instrument(skip(self), fields(path = %self.dir.display()))]
    pub fn flush(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = self.serialize();

        let meta_path = self.meta_path();
        let temp_path = self.dir.join(format!("{}.tmp", META_FILE));
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, &meta_path)?;

        self.telemetry.save_to(&self.dir.join(TELEMETRY_FILE))?;

        debug!(bytes = bytes.len(), "Store flushed");
        Ok(())
    }
}

/// Decode a metadata file into its term table, document table and id counter.
fn decode_meta(bytes: &[u8]) -> Result<(TermTable, BTreeMap<DocId, Arc<Document>>, u64)> {
    let mut r = ReadBuffer::new(bytes);
    let next_doc_id = r.read_u64()?;

    let term_count = r.read_len()?;
    let mut table = TermTable::default();
    for _ in 0..term_count {
        let word = r.read_string()?;
        let term = Term::decode(&mut r)?;
        table.vocabulary.insert(&word);
        table.terms.insert(word, Arc::new(term));
    }

    let doc_count = r.read_len()?;
    let mut docs = BTreeMap::new();
    for _ in 0..doc_count {
        let id = DocId::decode(&mut r)?;
        let doc = Document::decode(&mut r)?;
        if doc.id() != id {
            return Err(QuarryError::corrupted(format!(
                "document record {} is filed under id {}",
                doc.id(),
                id
            )));
        }
        docs.insert(id, Arc::new(doc));
    }

    if !r.is_exhausted() {
        return Err(QuarryError::corrupted(format!(
            "{} trailing bytes after document table",
            r.remaining()
        )));
    }
    if next_doc_id == 0 || docs.keys().any(|id| id.0 >= next_doc_id) {
        return Err(QuarryError::corrupted("document id beyond id counter"));
    }

    Ok((table, docs, next_doc_id))
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.dir.display(), error = %e, "Failed to flush store on close");
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.dir)
            .field("terms", &self.term_count())
            .field("documents", &self.document_count())
            .field("next_doc_id", &self.next_doc_id.load(Ordering::Relaxed))
            .field("generation", &self.generation())
            .finish()
    }
}
