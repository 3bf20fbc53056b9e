//! Splitting lines into words with their byte offsets.

use super::reader::{is_trimmable, Line, LineSource};
use crate::error::Result;
use tracing::trace;

/// Word separators for plain text.
pub const DEFAULT_SEPARATORS: &[u8] = b" ,.\t\n";

/// Word separators for JSON text, which also break on structural characters.
pub const JSON_SEPARATORS: &[u8] = b" \"{}:,.\t\n";

/// A word and the file offset of its first byte.
pub type Word = (String, u64);

/// Split one line into words.
///
/// Each token between separators is trimmed of whitespace and control
/// bytes. Empty tokens are dropped, as are tokens that are not valid UTF-8.
pub fn split_line(line: &Line, separators: &[u8], out: &mut Vec<Word>) {
    let bytes = &line.bytes;
    let mut start = 0;
    while start <= bytes.len() {
        let end = bytes[start..]
            .iter()
            .position(|b| separators.contains(b))
            .map_or(bytes.len(), |p| start + p);

        let token = &bytes[start..end];
        let left = token.iter().take_while(|b| is_trimmable(**b)).count();
        let right = token[left..]
            .iter()
            .rev()
            .take_while(|b| is_trimmable(**b))
            .count();
        let trimmed = &token[left..token.len() - right];

        if !trimmed.is_empty() {
            match std::str::from_utf8(trimmed) {
                Ok(word) => out.push((word.to_string(), line.offset + (start + left) as u64)),
                Err(_) => trace!(offset = line.offset + start as u64, "Skipping non-UTF-8 token"),
            }
        }
        start = end + 1;
    }
}

/// Read every line from `source` and collect its words in file order.
pub fn extract_words(source: &mut impl LineSource, separators: &[u8]) -> Result<Vec<Word>> {
    source.reset()?;
    let mut words = Vec::new();
    while let Some(line) = source.next_line()? {
        split_line(&line, separators, &mut words);
    }
    Ok(words)
}
