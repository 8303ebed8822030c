//! On-disk columnar time-series file format.
//!
//! A file is a sequence of chunk groups followed by a metadata section
//! and a fixed-size footer:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header: magic "ACTF" + version u16           │
//! ├──────────────────────────────────────────────┤
//! │ Chunk group (one device, one flush)          │
//! │   ├─ Chunk (one measurement)                 │
//! │   │    ├─ Page                               │
//! │   │    └─ Page ...                           │
//! │   └─ Chunk ...                               │
//! │ Chunk group ...                              │
//! ├──────────────────────────────────────────────┤
//! │ Series metadata blobs (sorted)               │
//! │ Metadata index tree (root last)              │
//! │ Bloom filter over series paths               │
//! ├──────────────────────────────────────────────┤
//! │ Footer: region offsets, CRC32, "FTCA"        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Aligned devices replace the per-measurement chunks of a group with
//! one shared time chunk plus one value chunk per measurement, sealed
//! in lockstep so pages pair positionally on read.

pub mod chunk;
pub mod encoding;
pub mod file;
pub mod group;
pub mod index;
pub mod io;
pub mod page;
pub mod reader;
pub mod stats;
pub mod writer;

pub use chunk::{ChunkHeader, ChunkMetadata, SeriesMetadata};
pub use file::{FileFooter, TSFILE_MAGIC, TSFILE_MAGIC_REVERSE, TSFILE_VERSION};
pub use index::{MetadataIndexEntry, MetadataIndexNode, MetadataIndexNodeType};
pub use reader::TsFileReader;
pub use stats::Statistics;
pub use writer::{TsFileStats, TsFileWriter};
