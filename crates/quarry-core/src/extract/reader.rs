//! Line-oriented file reading with byte offsets.

use crate::error::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// One non-blank line with surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Byte offset in the file of the first byte of `bytes`
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Source of trimmed lines for the extractors.
pub trait LineSource {
    /// Rewind to the start of the input.
    fn reset(&mut self) -> Result<()>;

    /// Read the next non-blank line, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<Line>>;

    /// File offset of the start of the most recently returned line.
    fn offset(&self) -> u64;
}

/// Reads newline-delimited lines, skipping blank ones.
pub struct LineReader<R> {
    inner: BufReader<R>,
    /// Offset of the next unread byte
    position: u64,
    last_offset: u64,
    buf: Vec<u8>,
}

impl LineReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(LineReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader {
            inner: BufReader::new(inner),
            position: 0,
            last_offset: 0,
            buf: Vec::new(),
        }
    }
}

impl<R: Read + Seek> LineSource for LineReader<R> {
    fn reset(&mut self) -> Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.position = 0;
        self.last_offset = 0;
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<Line>> {
        loop {
            self.buf.clear();
            let read = self.inner.read_until(b'\n', &mut self.buf)?;
            if read == 0 {
                return Ok(None);
            }
            let line_start = self.position;
            self.position += read as u64;

            let left = self.buf.iter().take_while(|b| is_trimmable(**b)).count();
            if left == self.buf.len() {
                continue;
            }
            let right = self.buf.iter().rev().take_while(|b| is_trimmable(**b)).count();

            self.last_offset = line_start + left as u64;
            return Ok(Some(Line {
                offset: self.last_offset,
                bytes: self.buf[left..self.buf.len() - right].to_vec(),
            }));
        }
    }

    fn offset(&self) -> u64 {
        self.last_offset
    }
}

/// Whitespace and ASCII control characters.
pub(crate) fn is_trimmable(b: u8) -> bool {
    b <= b' ' || b == 0x7f
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines(text: &str) -> Vec<(u64, String)> {
        let mut reader = LineReader::new(Cursor::new(text.as_bytes().to_vec()));
        let mut out = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            assert_eq!(reader.offset(), line.offset);
            out.push((line.offset, String::from_utf8(line.bytes).unwrap()));
        }
        out
    }

    #[test]
    fn test_offsets_and_trimming() {
        let got = lines("first line\n\n   second\t\n\r\n  \n last");
        assert_eq!(
            got,
            vec![
                (0, "first line".to_string()),
                (15, "second".to_string()),
                (29, "last".to_string()),
            ]
        );
    }

    #[test]
    fn test_reset() {
        let mut reader = LineReader::new(Cursor::new(b"a\nb\n".to_vec()));
        assert_eq!(reader.next_line().unwrap().unwrap().bytes, b"a");
        assert_eq!(reader.next_line().unwrap().unwrap().bytes, b"b");
        assert!(reader.next_line().unwrap().is_none());

        reader.reset().unwrap();
        let line = reader.next_line().unwrap().unwrap();
        assert_eq!((line.offset, line.bytes), (0, b"a".to_vec()));
    }

    #[test]
    fn test_empty_input() {
        assert!(lines("").is_empty());
        assert!(lines("\n \n\t").is_empty());
    }
}
