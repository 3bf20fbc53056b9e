//! Indexing files and directory trees into a [`Store`].
//!
//! Extraction is the expensive part and runs on the rayon pool. Registering
//! results in the store happens afterwards on the calling thread, in sorted
//! path order, so a directory indexed twice into fresh stores gets the same
//! ids both times.

use crate::config::ExtensionsConfig;
use crate::document::DocumentInfo;
use crate::error::Result;
use crate::extract::{extract_file, ExtractResult};
use crate::store::Store;
use crate::types::{to_local_seconds, DocId};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Indexer {
    store: Arc<Store>,
    extensions: ExtensionsConfig,
}

/// A file's extraction output and the modify time read before extracting.
struct Extracted {
    path: PathBuf,
    modify_time: NaiveDateTime,
    result: ExtractResult,
}

impl Indexer {
    pub fn new(store: Arc<Store>, extensions: ExtensionsConfig) -> Self {
        Indexer { store, extensions }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn extensions(&self) -> &ExtensionsConfig {
        &self.extensions
    }

    /// Index one file.
    ///
    /// Returns `None` without touching the store when the path is not a
    /// regular file, has an ignored extension, or has no words.
    pub fn index_file(&self, path: &Path) -> Result<Option<DocId>> {
        Ok(self
            .extract(path)?
            .map(|extracted| self.register(extracted)))
    }

    /// Index a file, or every allowed file below a directory.
    ///
    /// Files that fail to extract are logged and skipped when walking a
    /// directory. A path given directly as a file propagates its error.
    #[instrument(skip(self))]
    pub fn index(&self, path: &Path) -> Result<Vec<DocId>> {
        let meta = fs::metadata(path)?;
        if meta.is_file() {
            return Ok(self.index_file(path)?.into_iter().collect());
        }
        let files = collect_files(path, &self.extensions)?;
        let indexed: Vec<DocId> = self
            .index_files(&files)
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        info!(
            path = %path.display(),
            files = files.len(),
            docs = indexed.len(),
            "Indexed directory"
        );
        Ok(indexed)
    }

    /// Extract `paths` in parallel and register them in the given order.
    ///
    /// Returns the path and id of every file that produced a document.
    pub fn index_files(&self, paths: &[PathBuf]) -> Vec<(PathBuf, DocId)> {
        let extracted: Vec<Extracted> = paths
            .par_iter()
            .filter_map(|path| match self.extract(path) {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to index file");
                    None
                }
            })
            .collect();

        extracted
            .into_iter()
            .map(|e| {
                let path = e.path.clone();
                (path, self.register(e))
            })
            .collect()
    }

    fn extract(&self, path: &Path) -> Result<Option<Extracted>> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            debug!(path = %path.display(), "Not a regular file");
            return Ok(None);
        }
        if self.extensions.is_ignored(path) {
            debug!(path = %path.display(), "Ignored extension");
            return Ok(None);
        }
        let modify_time = to_local_seconds(meta.modified()?);
        let result = extract_file(path)?;
        if !result.is_valid() {
            debug!(path = %path.display(), "No indexable content");
            return Ok(None);
        }
        Ok(Some(Extracted {
            path: path.to_path_buf(),
            modify_time,
            result,
        }))
    }

    fn register(&self, extracted: Extracted) -> DocId {
        let Extracted {
            path,
            modify_time,
            result,
        } = extracted;

        let id = self.store.new_doc_id();
        for (word, offset) in &result.words {
            self.store.add_term(word, id, *offset);
        }
        let info = DocumentInfo {
            doc_type: result.doc_type,
            modify_time,
            word_count: result.word_count(),
        };
        debug!(path = %path.display(), id = %id, words = info.word_count, "Indexed file");
        self.store.add_document(id, path, info, result.kvs);
        id
    }
}

/// Files to index below `root`, sorted.
///
/// A root that is not a directory is returned as is, unfiltered, and left
/// for the indexer to accept or reject. Directories are walked recursively
/// without following symlinked directories, keeping files whose extension is
/// allowed. Unreadable subdirectories and entries are logged and skipped.
pub fn collect_files(root: &Path, extensions: &ExtensionsConfig) -> Result<Vec<PathBuf>> {
    if !fs::metadata(root)?.is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    let mut first = true;
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if !first => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        first = false;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if extensions.is_allowed(&path)
                && fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
            {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
