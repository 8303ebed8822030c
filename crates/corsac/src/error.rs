//! Error and Result types for Corsac file operations.

use crate::data::DataType;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for Corsac operations.
pub type Result<T> = std::result::Result<T, TsFileError>;

/// The error type for Corsac file operations.
#[derive(Debug, Error)]
pub enum TsFileError {
    /// Invalid magic bytes in the file header or footer.
    #[error("Invalid magic bytes: expected ACTF, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// File checksum does not match expected value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// Row or column index beyond buffer capacity, or an unknown column.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Value type does not match the column's declared data type.
    #[error("Type mismatch for measurement {measurement}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Measurement whose declared type was violated.
        measurement: String,
        /// Declared data type of the column.
        expected: DataType,
        /// Runtime type of the rejected value.
        actual: DataType,
    },

    /// Measurement name collision within one tablet or device.
    #[error("Duplicate measurement schema: {0}")]
    DuplicateSchema(String),

    /// Timestamp not strictly greater than the series high-water mark.
    #[error("Out-of-order write in timeseries {series}, time must be at least {min_timestamp}")]
    OutOfOrderWrite {
        /// Full series path (`device.measurement`) that rejected the write.
        series: String,
        /// Minimum acceptable timestamp (last accepted + 1).
        min_timestamp: i64,
    },

    /// New measurement registered or written after the device was flushed.
    #[error(
        "Chunk group already flushed, cannot add new measurement {measurement} to device {device}"
    )]
    SchemaFrozenViolation {
        /// Device whose schema is frozen.
        device: String,
        /// Offending measurement name.
        measurement: String,
    },

    /// Aligned and non-aligned registration mixed for one device.
    #[error("Aligned/non-aligned mismatch for device {0}")]
    AlignmentMismatch(String),

    /// Metadata index deserialization encountered an inconsistent node.
    #[error("Malformed metadata index: {0}")]
    MalformedIndex(String),

    /// Corrupt or inconsistent bytes outside the metadata index.
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
