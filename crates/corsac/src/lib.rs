//! Corsac - Alopex Columnar Time-Series File Format
//!
//! This crate provides a self-describing columnar file format for
//! device/measurement time series, with a multi-level metadata index
//! tree for log-time series location.
//!
//! # Components
//!
//! - [`Tablet`]: typed, null-aware columnar write batch
//! - [`TsFileWriter`]: ordered ingestion, chunk group flushing, file
//!   finalization
//! - [`TsFileReader`]: footer validation, index descent, point reads
//! - [`MetadataIndexNode`]: serialized index tree nodes with floor and
//!   exact search
//!
//! # Example
//!
//! ```rust,ignore
//! use corsac::{MeasurementSchema, Record, TsFileWriter, TsFileReader, DataType};
//!
//! // Write a file.
//! let mut writer = TsFileWriter::new("data.ctf")?;
//! writer.register_timeseries("root.sg.d1", MeasurementSchema::new("s1", DataType::Int64))?;
//! for ts in 0..1000 {
//!     writer.write_record(&Record::new("root.sg.d1", ts).with_point("s1", ts * 10))?;
//! }
//! let stats = writer.close()?;
//!
//! // Read it back.
//! let reader = TsFileReader::open("data.ctf")?;
//! let points = reader.read_points("root.sg.d1", "s1")?.unwrap();
//! assert_eq!(points.len(), 1000);
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod data;
pub mod error;
pub mod tsfile;

pub use config::TsFileConfig;
pub use data::{Bitmap, DataType, MeasurementSchema, Record, Tablet, Timestamp, Value};
pub use error::{Result, TsFileError};
pub use tsfile::encoding::{CompressionType, EncodingType};
pub use tsfile::{TsFileReader, TsFileStats, TsFileWriter};
