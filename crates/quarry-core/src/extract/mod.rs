//! Turning files into words and metadata.
//!
//! An [`Extractor`] reads one file and yields every word with its byte offset
//! plus a flattened key/value map. [`extractor_for`] picks the extractor by
//! file extension: JSON files get structural separators and metadata, all
//! other files are treated as plain text.

pub mod json;
pub mod reader;
pub mod words;

pub use reader::{Line, LineReader, LineSource};
pub use words::{Word, DEFAULT_SEPARATORS, JSON_SEPARATORS};

use crate::config::extension_of;
use crate::document::KvMap;
use crate::error::Result;
use crate::types::DocumentType;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Everything extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub words: Vec<Word>,
    pub kvs: KvMap,
    pub doc_type: DocumentType,
}

impl ExtractResult {
    /// A file with no words is not indexed.
    pub fn is_valid(&self) -> bool {
        !self.words.is_empty()
    }

    pub fn word_count(&self) -> u64 {
        self.words.len() as u64
    }
}

pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractResult>;
}

/// Plain-text extraction: words only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractResult> {
        let mut reader = LineReader::open(path)?;
        let words = words::extract_words(&mut reader, DEFAULT_SEPARATORS)?;
        Ok(ExtractResult {
            words,
            kvs: KvMap::new(),
            doc_type: DocumentType::from_extension(&extension_of(path)),
        })
    }
}

/// JSON extraction: words split on structural characters plus flattened
/// metadata. Malformed JSON keeps its words and loses its metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractResult> {
        let mut reader = LineReader::open(path)?;
        let words = words::extract_words(&mut reader, JSON_SEPARATORS)?;

        let kvs = match json::flatten_str(&fs::read(path)?) {
            Ok(kvs) => kvs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Dropping JSON metadata");
                KvMap::new()
            }
        };
        debug!(path = %path.display(), words = words.len(), keys = kvs.len(), "Extracted JSON");

        Ok(ExtractResult {
            words,
            kvs,
            doc_type: DocumentType::Json,
        })
    }
}

/// Choose the extractor for a file by its extension.
pub fn extractor_for(path: &Path) -> &'static dyn Extractor {
    if extension_of(path) == "json" {
        &JsonExtractor
    } else {
        &TextExtractor
    }
}

/// Extract a file with the extractor matching its extension.
pub fn extract_file(path: &Path) -> Result<ExtractResult> {
    extractor_for(path).extract(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Key, Value};
    use tempfile::TempDir;

    #[test]
    fn test_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.txt");
        fs::write(&path, "Take me\nto the river\n").unwrap();

        let result = extract_file(&path).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.word_count(), 5);
        assert_eq!(result.words[2], ("to".to_string(), 8));
        assert!(result.kvs.is_empty());
        assert_eq!(result.doc_type, DocumentType::Normal);
    }

    #[test]
    fn test_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.json");
        fs::write(&path, r#"{"title": "river song", "plays": 3}"#).unwrap();

        let result = extract_file(&path).unwrap();
        assert_eq!(result.doc_type, DocumentType::Json);
        assert!(result.words.iter().any(|(w, _)| w == "river"));
        assert_eq!(
            result.kvs.get(&Key::parse("plays").unwrap()),
            Some(&Value::Number(3.0))
        );
    }

    #[test]
    fn test_malformed_json_keeps_words() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"title": "half"#).unwrap();

        let result = extract_file(&path).unwrap();
        assert!(result.kvs.is_empty());
        assert!(result.words.iter().any(|(w, _)| w == "half"));
    }

    #[test]
    fn test_blank_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "\n \n\t\n").unwrap();
        assert!(!extract_file(&path).unwrap().is_valid());
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(extract_file(&dir.path().join("gone.txt")).is_err());
    }
}
