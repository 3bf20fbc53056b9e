//! Indexed documents and snippet extraction.
//!
//! ## Architecture
//!
//! A `Document` is shared as `Arc<Document>` between the store, the
//! executors and any caller holding a search result. Its identity (id,
//! path, info) is immutable. The metadata map, comments and ratings each sit
//! behind their own lock so that annotating one document never contends on
//! the store's map locks or on another document.

use crate::codec::{Decode, Encode, ReadBuffer, WriteBuffer};
use crate::error::Result;
use crate::types::{now_seconds, DocId, DocumentType};
use crate::value::{Key, Value};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Key/value metadata of one document.
pub type KvMap = BTreeMap<Key, Value>;

/// Returned instead of a snippet whose bytes cannot be decoded as UTF-8.
pub const UNDECODABLE_TEXT: &str = "<unable to decode text>";

/// A repaired snippet shorter than this is replaced by [`UNDECODABLE_TEXT`].
const MIN_REPAIRED_LEN: usize = 8;

/// Immutable facts captured when the document was indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub doc_type: DocumentType,
    /// File mtime at index time, whole seconds
    pub modify_time: NaiveDateTime,
    pub word_count: u64,
}

/// A user's comment on a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub at: NaiveDateTime,
    pub text: String,
}

pub struct Document {
    id: DocId,
    origin_path: PathBuf,
    info: DocumentInfo,
    kvs: RwLock<KvMap>,
    comments: RwLock<BTreeMap<String, Comment>>,
    ratings: RwLock<BTreeMap<String, f64>>,
}

impl Document {
    pub fn new(id: DocId, origin_path: impl Into<PathBuf>, info: DocumentInfo, kvs: KvMap) -> Self {
        Document {
            id,
            origin_path: origin_path.into(),
            info,
            kvs: RwLock::new(kvs),
            comments: RwLock::new(BTreeMap::new()),
            ratings: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.origin_path
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn word_count(&self) -> u64 {
        self.info.word_count
    }

    pub fn modify_time(&self) -> NaiveDateTime {
        self.info.modify_time
    }

    pub fn doc_type(&self) -> DocumentType {
        self.info.doc_type
    }

    /// Snapshot of the metadata map.
    pub fn kvs(&self) -> KvMap {
        self.kvs.read().clone()
    }

    /// Run `f` against the metadata map without copying it.
    pub fn with_kvs<R>(&self, f: impl FnOnce(&KvMap) -> R) -> R {
        f(&self.kvs.read())
    }

    pub fn value(&self, key: &Key) -> Option<Value> {
        self.kvs.read().get(key).cloned()
    }

    /// Add or replace `user`'s comment, stamped with the current time.
    pub fn add_comment(&self, user: impl Into<String>, text: impl Into<String>) {
        self.comments.write().insert(
            user.into(),
            Comment {
                at: now_seconds(),
                text: text.into(),
            },
        );
    }

    pub fn remove_comment(&self, user: &str) -> bool {
        self.comments.write().remove(user).is_some()
    }

    pub fn comments(&self) -> BTreeMap<String, Comment> {
        self.comments.read().clone()
    }

    pub fn set_rating(&self, user: impl Into<String>, score: f64) {
        self.ratings.write().insert(user.into(), score);
    }

    pub fn ratings(&self) -> BTreeMap<String, f64> {
        self.ratings.read().clone()
    }

    /// Number of raters and their mean score (0 when nobody rated).
    pub fn rating_stat(&self) -> (usize, f64) {
        let ratings = self.ratings.read();
        if ratings.is_empty() {
            return (0, 0.0);
        }
        let total: f64 = ratings.values().sum();
        (ratings.len(), total / ratings.len() as f64)
    }

    /// Current size of the backing file.
    pub fn file_size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.origin_path)?.len())
    }

    /// Read `res_len` bytes of context around the match at `offset`.
    ///
    /// When `res_len <= len` only the match itself is returned. Otherwise the
    /// extra width is split evenly between both sides, and whichever side
    /// runs into a file boundary hands its share to the other.
    pub fn snippet(&self, offset: u64, len: usize, res_len: usize) -> Result<String> {
        let mut file = File::open(&self.origin_path)?;
        let file_len = file.metadata()?.len();
        let left = left_context(offset, len as u64, res_len as u64, file_len);

        file.seek(SeekFrom::Start(offset - left))?;
        let want = res_len.max(len) as u64;
        let mut buf = Vec::with_capacity(want as usize);
        file.take(want).read_to_end(&mut buf)?;

        Ok(repair_utf8(&buf))
    }
}

/// Bytes of context to take before the match.
fn left_context(offset: u64, len: u64, res_len: u64, file_len: u64) -> u64 {
    if res_len <= len {
        return 0;
    }
    let extra = res_len - len;
    let (half_left, half_right) = (extra / 2, (extra + 1) / 2);
    let after_offset = file_len.saturating_sub(offset);

    if half_left > offset {
        offset
    } else if half_right + len > after_offset {
        res_len.saturating_sub(after_offset).min(offset)
    } else {
        half_left
    }
}

/// Trim a cut-out byte range to valid UTF-8.
///
/// Leading continuation bytes and an incomplete trailing sequence are
/// dropped. Invalid bytes in the middle cannot be trimmed away.
fn repair_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let start = bytes
        .iter()
        .take(4)
        .position(|b| b & 0xC0 != 0x80)
        .unwrap_or(bytes.len());
    let rest = &bytes[start..];
    let valid = match std::str::from_utf8(rest) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => "",
    };

    if valid.len() >= MIN_REPAIRED_LEN {
        valid.to_string()
    } else {
        UNDECODABLE_TEXT.to_string()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("path", &self.origin_path)
            .field("type", &self.info.doc_type)
            .field("word_count", &self.info.word_count)
            .field("kvs", &self.kvs.read().len())
            .finish()
    }
}

impl Encode for Document {
    fn encode(&self, w: &mut WriteBuffer) {
        self.id.encode(w);
        w.write_str(&self.origin_path.to_string_lossy());

        let kvs = self.kvs.read();
        w.write_len(kvs.len());
        for (key, value) in kvs.iter() {
            key.encode(w);
            value.encode(w);
        }

        w.write_u8(self.info.doc_type.as_u8());
        w.write_datetime(&self.info.modify_time);
        w.write_u64(self.info.word_count);

        let comments = self.comments.read();
        w.write_len(comments.len());
        for (user, comment) in comments.iter() {
            w.write_str(user);
            w.write_datetime(&comment.at);
            w.write_str(&comment.text);
        }

        let ratings = self.ratings.read();
        w.write_len(ratings.len());
        for (user, score) in ratings.iter() {
            w.write_str(user);
            w.write_f64(*score);
        }
    }
}

impl Decode for Document {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        let id = DocId::decode(r)?;
        let path = PathBuf::from(r.read_string()?);

        let kv_count = r.read_len()?;
        let mut kvs = KvMap::new();
        for _ in 0..kv_count {
            let key = Key::decode(r)?;
            let value = Value::decode(r)?;
            kvs.insert(key, value);
        }

        let info = DocumentInfo {
            doc_type: DocumentType::from_u8(r.read_u8()?)?,
            modify_time: r.read_datetime()?,
            word_count: r.read_u64()?,
        };
        let doc = Document::new(id, path, info, kvs);

        let comment_count = r.read_len()?;
        {
            let mut comments = doc.comments.write();
            for _ in 0..comment_count {
                let user = r.read_string()?;
                let at = r.read_datetime()?;
                let text = r.read_string()?;
                comments.insert(user, Comment { at, text });
            }
        }

        let rating_count = r.read_len()?;
        {
            let mut ratings = doc.ratings.write();
            for _ in 0..rating_count {
                let user = r.read_string()?;
                let score = r.read_f64()?;
                ratings.insert(user, score);
            }
        }

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_datetime;
    use tempfile::TempDir;

    fn make_doc(dir: &TempDir, content: &str) -> Document {
        let path = dir.path().join("doc.txt");
        fs::write(&path, content).unwrap();
        let info = DocumentInfo {
            doc_type: DocumentType::Normal,
            modify_time: parse_datetime("2022-01-01 00:00:00").unwrap(),
            word_count: 4,
        };
        Document::new(DocId(1), path, info, KvMap::new())
    }

    #[test]
    fn test_snippet_exact_match() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "hello brave new world");
        assert_eq!(doc.snippet(6, 5, 3).unwrap(), "brave");
        assert_eq!(doc.snippet(6, 5, 5).unwrap(), "brave");
    }

    #[test]
    fn test_snippet_centered() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "hello brave new world");
        // 4 extra bytes, 2 on each side
        assert_eq!(doc.snippet(6, 5, 9).unwrap(), "o brave n");
    }

    #[test]
    fn test_snippet_start_of_file() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "hello brave new world");
        assert_eq!(doc.snippet(0, 5, 9).unwrap(), "hello bra");
    }

    #[test]
    fn test_snippet_end_of_file() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "hello brave new world");
        assert_eq!(doc.snippet(16, 5, 9).unwrap(), "new world");
    }

    #[test]
    fn test_snippet_wider_than_file() {
        let dir = TempDir::new().unwrap();
        let content = "hello brave new world";
        let doc = make_doc(&dir, content);
        assert_eq!(doc.snippet(6, 5, 500).unwrap(), content);
        assert_eq!(doc.snippet(16, 5, 500).unwrap(), content);
    }

    #[test]
    fn test_snippet_repairs_utf8() {
        let dir = TempDir::new().unwrap();
        // the window starts at byte 1, inside the two-byte "é"
        let doc = make_doc(&dir, "é is an accented letter, ü too");
        let s = doc.snippet(10, 4, 22).unwrap();
        assert_eq!(s, " is an accented lette");
    }

    #[test]
    fn test_repair_utf8() {
        assert_eq!(repair_utf8(b"plain"), "plain");
        let mut bytes = "ab€cdefghij".as_bytes().to_vec();
        bytes.remove(0);
        bytes.remove(0);
        assert_eq!(&bytes[..1], &[0xe2][..]);
        // now starts with the continuation bytes of '€'
        bytes.remove(0);
        assert_eq!(repair_utf8(&bytes), "cdefghij");

        let bytes = [0xffu8, 0xfe, 0xfd, b'a'];
        assert_eq!(repair_utf8(&bytes), UNDECODABLE_TEXT);
    }

    #[test]
    fn test_left_context() {
        assert_eq!(left_context(10, 4, 4, 100), 0);
        assert_eq!(left_context(10, 4, 10, 100), 3);
        assert_eq!(left_context(1, 4, 10, 100), 1);
        assert_eq!(left_context(95, 4, 10, 100), 5);
    }

    #[test]
    fn test_comments_and_ratings() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "text");
        assert_eq!(doc.rating_stat(), (0, 0.0));

        doc.set_rating("alice", 4.0);
        doc.set_rating("bob", 2.0);
        doc.set_rating("alice", 5.0);
        assert_eq!(doc.rating_stat(), (2, 3.5));

        doc.add_comment("bob", "useful");
        assert_eq!(doc.comments()["bob"].text, "useful");
        assert!(doc.remove_comment("bob"));
        assert!(!doc.remove_comment("bob"));
    }

    #[test]
    fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let doc = make_doc(&dir, "four");
        assert_eq!(doc.file_size().unwrap(), 4);
        fs::remove_file(doc.path()).unwrap();
        assert!(doc.file_size().is_err());
    }

    #[test]
    fn test_codec_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");
        let mut kvs = KvMap::new();
        kvs.insert(Key::parse("a.b").unwrap(), Value::Number(2.0));
        kvs.insert(Key::parse("tags").unwrap(), Value::Strings(vec!["x".into()]));
        let info = DocumentInfo {
            doc_type: DocumentType::Json,
            modify_time: parse_datetime("2022-02-02 10:00:00").unwrap(),
            word_count: 12,
        };
        let doc = Document::new(DocId(9), &path, info.clone(), kvs.clone());
        doc.add_comment("carol", "nice");
        doc.set_rating("carol", 4.5);

        let mut w = WriteBuffer::new();
        doc.encode(&mut w);
        let bytes = w.into_inner();
        let decoded = Document::decode(&mut ReadBuffer::new(&bytes)).unwrap();

        assert_eq!(decoded.id(), DocId(9));
        assert_eq!(decoded.path(), path.as_path());
        assert_eq!(decoded.info(), &info);
        assert_eq!(decoded.kvs(), kvs);
        assert_eq!(decoded.comments(), doc.comments());
        assert_eq!(decoded.ratings(), doc.ratings());
    }
}
