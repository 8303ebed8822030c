//! Page construction.
//!
//! A page is the smallest unit of data in a chunk. Plain data chunks
//! interleave a time buffer and a value buffer per page; aligned chunks
//! split them, with one time page stream and one value page stream per
//! measurement. Value pages carry a validity bitmap so null rows occupy
//! no value bytes.

use crate::data::{Bitmap, Value};
use crate::error::Result;
use crate::tsfile::encoding::{encode_timestamp, encode_value};
use crate::tsfile::io::write_var_u32;
use crate::tsfile::stats::Statistics;

/// An encoded page awaiting chunk serialization.
///
/// The body is uncompressed; compression is applied when the owning
/// chunk is serialized, once the single/multi page framing is known.
#[derive(Debug, Clone)]
pub struct SealedPage {
    /// Time range and point count of the page. Value pages count
    /// non-null cells only.
    pub statistics: Statistics,
    /// Encoded page body.
    pub body: Vec<u8>,
}

impl SealedPage {
    /// A zero-point page: no statistics, no body, framed as `0, 0`.
    pub fn empty() -> Self {
        Self {
            statistics: Statistics::new(),
            body: Vec::new(),
        }
    }

    /// Whether this is a zero-point page.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Builds pages for a plain (non-aligned) data chunk.
///
/// Body layout: `varint(time_buf_len)`, time buffer, value buffer.
#[derive(Debug, Default)]
pub struct PageWriter {
    time_buf: Vec<u8>,
    value_buf: Vec<u8>,
    statistics: Statistics,
}

impl PageWriter {
    /// Creates an empty page writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one point.
    pub fn write(&mut self, timestamp: i64, value: &Value) -> Result<()> {
        encode_timestamp(timestamp, &mut self.time_buf)?;
        encode_value(value, &mut self.value_buf)?;
        self.statistics.update(timestamp);
        Ok(())
    }

    /// Number of points buffered.
    pub fn point_count(&self) -> u32 {
        self.statistics.count as u32
    }

    /// Encoded bytes buffered so far.
    pub fn size_in_bytes(&self) -> usize {
        self.time_buf.len() + self.value_buf.len()
    }

    /// Seals the buffered points into a page and resets for the next
    /// one.
    pub fn seal(&mut self) -> Result<SealedPage> {
        let mut body = Vec::with_capacity(self.size_in_bytes() + 5);
        write_var_u32(self.time_buf.len() as u32, &mut body)?;
        body.extend_from_slice(&self.time_buf);
        body.extend_from_slice(&self.value_buf);
        let statistics = self.statistics;
        self.time_buf.clear();
        self.value_buf.clear();
        self.statistics = Statistics::new();
        Ok(SealedPage { statistics, body })
    }
}

/// Builds pages for the shared time column of an aligned chunk.
///
/// Body layout: the raw time buffer, count × i64.
#[derive(Debug, Default)]
pub struct TimePageWriter {
    time_buf: Vec<u8>,
    statistics: Statistics,
}

impl TimePageWriter {
    /// Creates an empty time page writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one timestamp.
    pub fn write(&mut self, timestamp: i64) -> Result<()> {
        encode_timestamp(timestamp, &mut self.time_buf)?;
        self.statistics.update(timestamp);
        Ok(())
    }

    /// Number of timestamps buffered.
    pub fn point_count(&self) -> u32 {
        self.statistics.count as u32
    }

    /// Encoded bytes buffered so far.
    pub fn size_in_bytes(&self) -> usize {
        self.time_buf.len()
    }

    /// Seals the buffered timestamps into a page and resets.
    pub fn seal(&mut self) -> SealedPage {
        let statistics = self.statistics;
        let body = std::mem::take(&mut self.time_buf);
        self.statistics = Statistics::new();
        SealedPage { statistics, body }
    }
}

/// Builds pages for one value column of an aligned chunk.
///
/// Body layout: `varint(row_count)`, validity bitmap
/// (`ceil(row_count / 8)` bytes), then the non-null values in row
/// order. A page whose rows are all null seals to [`SealedPage::empty`]
/// so the slot stays framable without spending bytes on it.
#[derive(Debug)]
pub struct ValuePageWriter {
    value_buf: Vec<u8>,
    bitmap: Bitmap,
    row_count: u32,
    statistics: Statistics,
}

impl ValuePageWriter {
    /// Creates a value page writer holding up to `capacity` rows per
    /// page.
    pub fn new(capacity: usize) -> Self {
        Self {
            value_buf: Vec::new(),
            bitmap: Bitmap::with_capacity(capacity),
            row_count: 0,
            statistics: Statistics::new(),
        }
    }

    /// Appends one row, null when `value` is `None`.
    pub fn write(&mut self, timestamp: i64, value: Option<&Value>) -> Result<()> {
        if let Some(value) = value {
            encode_value(value, &mut self.value_buf)?;
            self.bitmap.set(self.row_count as usize);
            self.statistics.update(timestamp);
        }
        self.row_count += 1;
        Ok(())
    }

    /// Number of rows buffered, nulls included.
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Encoded bytes buffered so far.
    pub fn size_in_bytes(&self) -> usize {
        self.value_buf.len() + (self.row_count as usize).div_ceil(8)
    }

    /// Seals the buffered rows into a page and resets.
    ///
    /// An all-null run seals to an empty page.
    pub fn seal(&mut self) -> Result<SealedPage> {
        let rows = self.row_count as usize;
        let statistics = self.statistics;
        self.row_count = 0;
        self.statistics = Statistics::new();
        if statistics.is_empty() {
            self.value_buf.clear();
            self.bitmap.clear_all();
            return Ok(SealedPage::empty());
        }
        let mut body = Vec::with_capacity(self.value_buf.len() + rows / 8 + 5);
        write_var_u32(rows as u32, &mut body)?;
        body.extend_from_slice(self.bitmap.bytes_for(rows));
        body.extend_from_slice(&self.value_buf);
        self.value_buf.clear();
        self.bitmap.clear_all();
        Ok(SealedPage { statistics, body })
    }
}
