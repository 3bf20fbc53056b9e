//! Core data types shared across the store, executors and daemon.

use crate::error::{QuarryError, Result};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Identifier of an indexed document.
///
/// Ids are allocated from 1 upwards by the store and never reused, so an id
/// doubles as a bit position in the terms executor's bitsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    /// Create a new document ID
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// Coarse classification of a document's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DocumentType {
    /// Natural language text
    #[default]
    Normal,
    Csv,
    Json,
    /// Opaque formats such as pdf or spreadsheets
    Blob,
    Unknown,
}

impl DocumentType {
    pub fn as_u8(self) -> u8 {
        match self {
            DocumentType::Normal => 0,
            DocumentType::Csv => 1,
            DocumentType::Json => 2,
            DocumentType::Blob => 3,
            DocumentType::Unknown => 4,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => DocumentType::Normal,
            1 => DocumentType::Csv,
            2 => DocumentType::Json,
            3 => DocumentType::Blob,
            4 => DocumentType::Unknown,
            other => {
                return Err(QuarryError::corrupted(format!(
                    "unknown document type tag {}",
                    other
                )))
            }
        })
    }

    /// Guess the type from a lowercased file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "json" => DocumentType::Json,
            "csv" | "tsv" => DocumentType::Csv,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => DocumentType::Blob,
            _ => DocumentType::Normal,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Normal => write!(f, "normal"),
            DocumentType::Csv => write!(f, "csv"),
            DocumentType::Json => write!(f, "json"),
            DocumentType::Blob => write!(f, "blob"),
            DocumentType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Textual datetime format used by values, document info and the codec.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a datetime as `YYYY-MM-DD HH:MM:SS`.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM:SS` string.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, DATETIME_FORMAT).map_err(|_| {
        QuarryError::InvalidDateTime {
            input: input.to_string(),
        }
    })
}

/// Convert a filesystem timestamp to local time at whole-second precision.
///
/// Document modify times are persisted as formatted strings, so anything
/// finer than a second would not survive a round trip and would make every
/// reloaded document look stale.
pub fn to_local_seconds(time: SystemTime) -> NaiveDateTime {
    let local: DateTime<Local> = time.into();
    let naive = local.naive_local();
    naive.with_nanosecond(0).unwrap_or(naive)
}

/// Current local time at whole-second precision.
pub fn now_seconds() -> NaiveDateTime {
    to_local_seconds(SystemTime::now())
}
