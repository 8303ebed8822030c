//! Chunk group construction.
//!
//! A chunk group buffers one device's data between flushes. Plain
//! devices hold one independent chunk per measurement. Aligned devices
//! hold one shared time chunk plus one value chunk per measurement,
//! sealed in lockstep so page `i` of every value chunk covers exactly
//! the rows of page `i` of the time chunk.

use crate::data::{DataType, MeasurementSchema, Value};
use crate::error::Result;
use crate::tsfile::chunk::{ChunkMetadata, ChunkWriter, TimeChunkWriter, ValueChunkWriter};
use crate::tsfile::io::{read_var_str, read_var_u32, write_var_str, write_var_u32, PositionedWriter};
use crate::TsFileConfig;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::debug;

/// Marker byte opening a chunk group header.
pub const CHUNK_GROUP_MARKER: u8 = 0x00;

/// Header written before a chunk group's chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroupHeader {
    /// Device the group belongs to.
    pub device_id: String,
    /// Number of chunks that follow.
    pub chunk_count: u32,
}

impl ChunkGroupHeader {
    /// Serializes the header, marker byte included.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[CHUNK_GROUP_MARKER])?;
        write_var_str(&self.device_id, writer)?;
        write_var_u32(self.chunk_count, writer)?;
        Ok(())
    }

    /// Deserializes the fields after an already-consumed marker byte.
    pub fn read_after_marker<R: Read>(reader: &mut R) -> Result<Self> {
        let device_id = read_var_str(reader)?;
        let chunk_count = read_var_u32(reader)?;
        Ok(Self {
            device_id,
            chunk_count,
        })
    }
}

/// Location record for one chunk written during a group flush.
#[derive(Debug, Clone)]
pub struct FlushedChunk {
    /// Measurement the chunk stores, empty for an aligned time chunk.
    pub measurement: String,
    /// Value type of the chunk.
    pub data_type: DataType,
    /// Chunk location and statistics.
    pub metadata: ChunkMetadata,
}

/// Buffers chunks for a plain device.
#[derive(Debug)]
pub struct NonAlignedChunkGroupWriter {
    device_id: String,
    chunks: BTreeMap<String, ChunkWriter>,
    config: TsFileConfig,
}

impl NonAlignedChunkGroupWriter {
    /// Creates an empty group for `device_id`.
    pub fn new(device_id: impl Into<String>, config: TsFileConfig) -> Self {
        Self {
            device_id: device_id.into(),
            chunks: BTreeMap::new(),
            config,
        }
    }

    /// Appends one point to the measurement's chunk, creating the chunk
    /// on first write.
    pub fn write(&mut self, schema: &MeasurementSchema, timestamp: i64, value: &Value) -> Result<()> {
        let chunk = self
            .chunks
            .entry(schema.name.clone())
            .or_insert_with(|| ChunkWriter::new(schema.clone(), &self.config));
        chunk.write(timestamp, value)
    }

    /// Estimated serialized size of all buffered chunks.
    pub fn buffered_size(&self) -> usize {
        self.chunks.values().map(ChunkWriter::buffered_size).sum()
    }

    /// Writes the group header and chunks, returning the flushed chunk
    /// locations.
    pub fn serialize_to<W: Write>(self, out: &mut PositionedWriter<W>) -> Result<Vec<FlushedChunk>> {
        let header = ChunkGroupHeader {
            device_id: self.device_id,
            chunk_count: self.chunks.len() as u32,
        };
        header.write_to(out)?;
        let mut flushed = Vec::with_capacity(self.chunks.len());
        for (measurement, chunk) in self.chunks {
            let data_type = chunk.data_type();
            let metadata = chunk.serialize_to(out)?;
            flushed.push(FlushedChunk {
                measurement,
                data_type,
                metadata,
            });
        }
        Ok(flushed)
    }
}

/// Buffers the shared time chunk and value chunks for an aligned
/// device.
#[derive(Debug)]
pub struct AlignedChunkGroupWriter {
    device_id: String,
    time: TimeChunkWriter,
    values: Vec<ValueChunkWriter>,
}

impl AlignedChunkGroupWriter {
    /// Creates an empty group with one value column per schema, in
    /// schema order.
    pub fn new(
        device_id: impl Into<String>,
        schemas: &[MeasurementSchema],
        config: &TsFileConfig,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            time: TimeChunkWriter::new(config),
            values: schemas
                .iter()
                .map(|s| ValueChunkWriter::new(s.clone(), config))
                .collect(),
        }
    }

    /// Appends one row across all columns. `values` is positional in
    /// schema order; `None` cells are null.
    ///
    /// When the shared time page reaches a sealing threshold, every
    /// column's page seals with it.
    pub fn write_row(&mut self, timestamp: i64, values: &[Option<&Value>]) -> Result<()> {
        self.time.write(timestamp)?;
        for (column, value) in self.values.iter_mut().zip(values.iter()) {
            column.write(timestamp, *value)?;
        }
        // Columns the row does not cover are null.
        for column in self.values.iter_mut().skip(values.len()) {
            column.write(timestamp, None)?;
        }
        if self.time.page_is_full() {
            self.seal_current_pages()?;
        }
        Ok(())
    }

    /// Seals the in-progress time page and, in lockstep, one page per
    /// value column. All-null column pages seal to empty page slots.
    pub fn seal_current_pages(&mut self) -> Result<()> {
        if self.time.current_page_points() == 0 {
            return Ok(());
        }
        debug!(
            "sealed aligned page window for {}: {} rows, {} columns",
            self.device_id,
            self.time.current_page_points(),
            self.values.len()
        );
        self.time.seal_current_page();
        for column in &mut self.values {
            column.seal_current_page()?;
        }
        Ok(())
    }

    /// Estimated serialized size of all buffered chunks.
    pub fn buffered_size(&self) -> usize {
        self.time.buffered_size()
            + self
                .values
                .iter()
                .map(ValueChunkWriter::buffered_size)
                .sum::<usize>()
    }

    /// Writes the group header, time chunk, and value chunks, returning
    /// the flushed chunk locations. The time chunk is listed first with
    /// an empty measurement name.
    pub fn serialize_to<W: Write>(
        mut self,
        out: &mut PositionedWriter<W>,
    ) -> Result<Vec<FlushedChunk>> {
        self.seal_current_pages()?;
        let header = ChunkGroupHeader {
            device_id: self.device_id,
            chunk_count: 1 + self.values.len() as u32,
        };
        header.write_to(out)?;

        let mut flushed = Vec::with_capacity(1 + self.values.len());
        let time_metadata = self.time.serialize_to(out)?;
        flushed.push(FlushedChunk {
            measurement: String::new(),
            data_type: DataType::Int64,
            metadata: time_metadata,
        });
        for column in self.values {
            let measurement = column.measurement().to_string();
            let data_type = column.data_type();
            let metadata = column.serialize_to(out)?;
            flushed.push(FlushedChunk {
                measurement,
                data_type,
                metadata,
            });
        }
        Ok(flushed)
    }
}

/// A device's active chunk group, plain or aligned.
#[derive(Debug)]
pub enum ChunkGroupWriter {
    /// Independent chunk per measurement.
    NonAligned(NonAlignedChunkGroupWriter),
    /// Shared time chunk plus value chunks.
    Aligned(AlignedChunkGroupWriter),
}

impl ChunkGroupWriter {
    /// Estimated serialized size of all buffered chunks.
    pub fn buffered_size(&self) -> usize {
        match self {
            ChunkGroupWriter::NonAligned(group) => group.buffered_size(),
            ChunkGroupWriter::Aligned(group) => group.buffered_size(),
        }
    }

    /// Writes the group, returning the flushed chunk locations.
    pub fn serialize_to<W: Write>(self, out: &mut PositionedWriter<W>) -> Result<Vec<FlushedChunk>> {
        match self {
            ChunkGroupWriter::NonAligned(group) => group.serialize_to(out),
            ChunkGroupWriter::Aligned(group) => group.serialize_to(out),
        }
    }
}
