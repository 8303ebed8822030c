//! Time-range statistics attached to pages, chunks, and series.

use crate::error::Result;
use std::io::{Read, Write};

/// Serialized size of [`Statistics`] in bytes.
pub const STATISTICS_SIZE: usize = 24;

/// Point count and timestamp range of a run of data.
///
/// An empty run keeps the inverted sentinel range (`min > max`) so that
/// merging it into another statistics value is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Number of points covered.
    pub count: u64,
    /// Smallest timestamp covered, `i64::MAX` when empty.
    pub min_timestamp: i64,
    /// Largest timestamp covered, `i64::MIN` when empty.
    pub max_timestamp: i64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            count: 0,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
        }
    }
}

impl Statistics {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one timestamp into the range.
    pub fn update(&mut self, timestamp: i64) {
        self.count += 1;
        self.min_timestamp = self.min_timestamp.min(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);
    }

    /// Folds another statistics value into this one.
    pub fn merge(&mut self, other: &Statistics) {
        self.count += other.count;
        self.min_timestamp = self.min_timestamp.min(other.min_timestamp);
        self.max_timestamp = self.max_timestamp.max(other.max_timestamp);
    }

    /// Whether any points are covered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Serializes to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Count (8 bytes)
        writer.write_all(&self.count.to_le_bytes())?;
        // Min timestamp (8 bytes)
        writer.write_all(&self.min_timestamp.to_le_bytes())?;
        // Max timestamp (8 bytes)
        writer.write_all(&self.max_timestamp.to_le_bytes())?;
        Ok(())
    }

    /// Deserializes from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; STATISTICS_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            count: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            min_timestamp: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            max_timestamp: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
        })
    }
}
