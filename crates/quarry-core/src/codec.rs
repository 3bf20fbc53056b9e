//! Binary buffer codec used by the store's metadata file.
//!
//! ## Format
//!
//! - Fixed-width numbers are written verbatim in native byte order, so a
//!   metadata file is only readable on the architecture that wrote it.
//! - Strings are a `u64` byte length followed by UTF-8 bytes.
//! - Datetimes are strings in `YYYY-MM-DD HH:MM:SS` form.
//! - Containers are a `u64` element count followed by the elements.
//!
//! There is no framing beyond that: a truncated buffer fails with
//! [`QuarryError::OutOfRange`] and everything after the truncation is lost.

use crate::error::{QuarryError, Result};
use crate::types::{format_datetime, parse_datetime, DocId};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

/// Growable output buffer.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: Vec<u8>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_ne_bytes());
    }

    pub fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_datetime(&mut self, dt: &NaiveDateTime) {
        self.write_str(&format_datetime(dt));
    }

    /// Write a length-prefixed sequence of encodable elements.
    pub fn write_seq<'a, T, I>(&mut self, items: I)
    where
        T: Encode + 'a,
        I: IntoIterator<Item = &'a T>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = items.into_iter();
        self.write_len(iter.len());
        for item in iter {
            item.encode(self);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input buffer.
#[derive(Debug)]
pub struct ReadBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ReadBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ReadBuffer { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(QuarryError::OutOfRange {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_ne_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_ne_bytes(self.take_array()?))
    }

    /// Read a length prefix, refusing lengths that could not possibly fit in
    /// the rest of the buffer.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_u64()?;
        let len = usize::try_from(len)
            .map_err(|_| QuarryError::corrupted(format!("length {} overflows usize", len)))?;
        if len > self.remaining() {
            return Err(QuarryError::OutOfRange {
                needed: len,
                remaining: self.remaining(),
            });
        }
        Ok(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| QuarryError::corrupted(format!("string is not UTF-8: {}", e)))
    }

    pub fn read_datetime(&mut self) -> Result<NaiveDateTime> {
        let s = self.read_string()?;
        parse_datetime(&s).map_err(|_| QuarryError::corrupted(format!("bad datetime {:?}", s)))
    }

    pub fn read_vec<T: Decode>(&mut self) -> Result<Vec<T>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::decode(self)?);
        }
        Ok(out)
    }

    pub fn read_set<T: Decode + Ord>(&mut self) -> Result<BTreeSet<T>> {
        let len = self.read_len()?;
        let mut out = BTreeSet::new();
        for _ in 0..len {
            out.insert(T::decode(self)?);
        }
        Ok(out)
    }
}

/// Types with a binary encoding.
pub trait Encode {
    fn encode(&self, w: &mut WriteBuffer);
}

/// Types that can be read back from their binary encoding.
pub trait Decode: Sized {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self>;
}

impl Encode for u64 {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_u64()
    }
}

impl Encode for f64 {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_f64(*self);
    }
}

impl Decode for f64 {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_f64()
    }
}

impl Encode for String {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_str(self);
    }
}

impl Decode for String {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_string()
    }
}

impl Encode for NaiveDateTime {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_datetime(self);
    }
}

impl Decode for NaiveDateTime {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_datetime()
    }
}

impl Encode for DocId {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_u64(self.0);
    }
}

impl Decode for DocId {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        Ok(DocId(r.read_u64()?))
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_seq(self.iter());
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_set()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut WriteBuffer) {
        w.write_seq(self.iter());
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(r: &mut ReadBuffer<'_>) -> Result<Self> {
        r.read_vec()
    }
}
