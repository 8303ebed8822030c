//! Chunk construction and chunk-level metadata.
//!
//! A chunk holds one measurement's pages within a chunk group. Aligned
//! devices split a chunk group into one time chunk carrying the shared
//! timestamps and one value chunk per measurement, flagged in the chunk
//! marker byte.

use crate::data::{DataType, MeasurementSchema, Value};
use crate::error::{Result, TsFileError};
use crate::tsfile::encoding::{compress, CompressionType, EncodingType};
use crate::tsfile::io::{read_var_str, read_var_u32, write_var_str, write_var_u32, PositionedWriter};
use crate::tsfile::page::{PageWriter, SealedPage, TimePageWriter, ValuePageWriter};
use crate::tsfile::stats::Statistics;
use crate::TsFileConfig;
use std::io::{Read, Write};
use tracing::debug;

/// Marker low bits: all pages of the chunk share one implicit header.
pub const CHUNK_SINGLE_PAGE: u8 = 0x01;
/// Marker low bits: every non-empty page embeds its own statistics.
pub const CHUNK_MULTI_PAGE: u8 = 0x02;
/// Marker flag for the shared time chunk of an aligned device.
pub const CHUNK_TIME_FLAG: u8 = 0x80;
/// Marker flag for a value chunk of an aligned device.
pub const CHUNK_VALUE_FLAG: u8 = 0x40;

/// Serialized size of [`ChunkMetadata`] in bytes.
pub const CHUNK_METADATA_SIZE: usize = 32;

const PAGE_FRAME_OVERHEAD: usize = 34;

/// Header written before a chunk's page data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Marker byte: page mode in the low two bits, aligned role flags
    /// in the high bits.
    pub marker: u8,
    /// Measurement name, empty for an aligned time chunk.
    pub measurement: String,
    /// Value type of the chunk.
    pub data_type: DataType,
    /// Page body encoding.
    pub encoding: EncodingType,
    /// Page body compression.
    pub compression: CompressionType,
    /// Total size of the page frames that follow, in bytes.
    pub data_size: u32,
}

impl ChunkHeader {
    /// Whether the marker flags this as an aligned time chunk.
    pub fn is_time_chunk(&self) -> bool {
        self.marker & CHUNK_TIME_FLAG != 0
    }

    /// Whether the marker flags this as an aligned value chunk.
    pub fn is_value_chunk(&self) -> bool {
        self.marker & CHUNK_VALUE_FLAG != 0
    }

    /// Whether page frames embed per-page statistics.
    pub fn is_multi_page(&self) -> bool {
        self.marker & 0x03 == CHUNK_MULTI_PAGE
    }

    /// Serializes the header, marker byte included.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Marker (1 byte)
        writer.write_all(&[self.marker])?;
        // Measurement name
        write_var_str(&self.measurement, writer)?;
        // Data type, encoding, compression (1 byte each)
        writer.write_all(&[self.data_type as u8, self.encoding as u8, self.compression as u8])?;
        // Page data size
        write_var_u32(self.data_size, writer)?;
        Ok(())
    }

    /// Deserializes the fields after an already-consumed marker byte.
    pub fn read_after_marker<R: Read>(reader: &mut R, marker: u8) -> Result<Self> {
        let page_mode = marker & 0x03;
        if page_mode != CHUNK_SINGLE_PAGE && page_mode != CHUNK_MULTI_PAGE {
            return Err(TsFileError::InvalidFormat(format!(
                "invalid chunk marker {marker:#04x}"
            )));
        }
        let measurement = read_var_str(reader)?;
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf)?;
        let data_type = DataType::from_u8(buf[0]).ok_or_else(|| {
            TsFileError::InvalidFormat(format!("unknown data type code {}", buf[0]))
        })?;
        let encoding = EncodingType::from_u8(buf[1]).ok_or_else(|| {
            TsFileError::InvalidFormat(format!("unknown encoding code {}", buf[1]))
        })?;
        let compression = CompressionType::from_u8(buf[2]).ok_or_else(|| {
            TsFileError::InvalidFormat(format!("unknown compression code {}", buf[2]))
        })?;
        let data_size = read_var_u32(reader)?;
        Ok(Self {
            marker,
            measurement,
            data_type,
            encoding,
            compression,
            data_size,
        })
    }
}

/// Location and statistics of one serialized chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// File offset of the chunk header.
    pub offset: u64,
    /// Statistics over the chunk's points.
    pub statistics: Statistics,
}

impl ChunkMetadata {
    /// Serializes to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.offset.to_le_bytes())?;
        self.statistics.write_to(writer)?;
        Ok(())
    }

    /// Deserializes from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let offset = u64::from_le_bytes(buf);
        let statistics = Statistics::read_from(reader)?;
        Ok(Self { offset, statistics })
    }
}

/// Metadata blob for one timeseries: its type, aggregate statistics,
/// and the chunks holding its data.
///
/// The index tree's measurement leaves point into the region these
/// blobs are serialized to.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetadata {
    /// Measurement name, empty for the shared time column of an
    /// aligned device.
    pub measurement: String,
    /// Value type of the series.
    pub data_type: DataType,
    /// Statistics merged over all chunks.
    pub statistics: Statistics,
    /// Chunk locations in write order.
    pub chunks: Vec<ChunkMetadata>,
}

impl SeriesMetadata {
    /// Creates an empty blob for a series.
    pub fn new(measurement: impl Into<String>, data_type: DataType) -> Self {
        Self {
            measurement: measurement.into(),
            data_type,
            statistics: Statistics::new(),
            chunks: Vec::new(),
        }
    }

    /// Records one flushed chunk.
    pub fn push_chunk(&mut self, chunk: ChunkMetadata) {
        self.statistics.merge(&chunk.statistics);
        self.chunks.push(chunk);
    }

    /// Serializes to a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_var_str(&self.measurement, writer)?;
        writer.write_all(&[self.data_type as u8])?;
        self.statistics.write_to(writer)?;
        write_var_u32(self.chunks.len() as u32, writer)?;
        for chunk in &self.chunks {
            chunk.write_to(writer)?;
        }
        Ok(())
    }

    /// Deserializes from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let measurement = read_var_str(reader)?;
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        let data_type = DataType::from_u8(buf[0]).ok_or_else(|| {
            TsFileError::InvalidFormat(format!("unknown data type code {}", buf[0]))
        })?;
        let statistics = Statistics::read_from(reader)?;
        let chunk_count = read_var_u32(reader)? as usize;
        let mut chunks = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            chunks.push(ChunkMetadata::read_from(reader)?);
        }
        Ok(Self {
            measurement,
            data_type,
            statistics,
            chunks,
        })
    }
}

fn write_page_frame(
    buf: &mut Vec<u8>,
    page: SealedPage,
    multi_page: bool,
    compression: CompressionType,
) -> Result<()> {
    if page.is_empty() {
        write_var_u32(0, buf)?;
        write_var_u32(0, buf)?;
        return Ok(());
    }
    let statistics = page.statistics;
    let uncompressed_size = page.body.len() as u32;
    let compressed = compress(compression, page.body)?;
    write_var_u32(uncompressed_size, buf)?;
    write_var_u32(compressed.len() as u32, buf)?;
    if multi_page {
        statistics.write_to(buf)?;
    }
    buf.extend_from_slice(&compressed);
    Ok(())
}

fn serialize_chunk<W: Write>(
    out: &mut PositionedWriter<W>,
    base_marker: u8,
    measurement: &str,
    data_type: DataType,
    encoding: EncodingType,
    compression: CompressionType,
    pages: Vec<SealedPage>,
    statistics: Statistics,
) -> Result<ChunkMetadata> {
    let multi_page = pages.len() > 1;
    let mut pages_buf = Vec::new();
    for page in pages {
        write_page_frame(&mut pages_buf, page, multi_page, compression)?;
    }
    let marker = base_marker
        | if multi_page {
            CHUNK_MULTI_PAGE
        } else {
            CHUNK_SINGLE_PAGE
        };
    let header = ChunkHeader {
        marker,
        measurement: measurement.to_string(),
        data_type,
        encoding,
        compression,
        data_size: pages_buf.len() as u32,
    };
    let offset = out.offset();
    header.write_to(out)?;
    out.write_all(&pages_buf)?;
    Ok(ChunkMetadata { offset, statistics })
}

/// Buffers one measurement's points for a plain (non-aligned) device.
///
/// Pages seal automatically at the configured point-count or byte
/// thresholds.
#[derive(Debug)]
pub struct ChunkWriter {
    schema: MeasurementSchema,
    page: PageWriter,
    sealed: Vec<SealedPage>,
    statistics: Statistics,
    max_page_points: u32,
    max_page_bytes: usize,
}

impl ChunkWriter {
    /// Creates a chunk writer for `schema`.
    pub fn new(schema: MeasurementSchema, config: &TsFileConfig) -> Self {
        Self {
            schema,
            page: PageWriter::new(),
            sealed: Vec::new(),
            statistics: Statistics::new(),
            max_page_points: config.max_page_points,
            max_page_bytes: config.max_page_bytes,
        }
    }

    /// Value type of the chunk.
    pub fn data_type(&self) -> DataType {
        self.schema.data_type
    }

    /// Appends one point, sealing the current page when it fills.
    pub fn write(&mut self, timestamp: i64, value: &Value) -> Result<()> {
        self.page.write(timestamp, value)?;
        if self.page.point_count() >= self.max_page_points
            || self.page.size_in_bytes() >= self.max_page_bytes
        {
            self.seal_current_page()?;
        }
        Ok(())
    }

    /// Seals the in-progress page if it holds any points.
    pub fn seal_current_page(&mut self) -> Result<()> {
        if self.page.point_count() == 0 {
            return Ok(());
        }
        let page = self.page.seal()?;
        debug!(
            "sealed page for {}: {} points, {} bytes",
            self.schema.name,
            page.statistics.count,
            page.body.len()
        );
        self.statistics.merge(&page.statistics);
        self.sealed.push(page);
        Ok(())
    }

    /// Estimated serialized size of the buffered data.
    pub fn buffered_size(&self) -> usize {
        self.sealed
            .iter()
            .map(|p| p.body.len() + PAGE_FRAME_OVERHEAD)
            .sum::<usize>()
            + self.page.size_in_bytes()
    }

    /// Writes the chunk and returns its location and statistics.
    pub fn serialize_to<W: Write>(mut self, out: &mut PositionedWriter<W>) -> Result<ChunkMetadata> {
        self.seal_current_page()?;
        serialize_chunk(
            out,
            0,
            &self.schema.name,
            self.schema.data_type,
            self.schema.encoding,
            self.schema.compression,
            self.sealed,
            self.statistics,
        )
    }
}

/// Buffers the shared time column of an aligned device.
///
/// Page sealing is driven by the owning group writer so every value
/// chunk seals in lockstep with the time chunk.
#[derive(Debug)]
pub struct TimeChunkWriter {
    page: TimePageWriter,
    sealed: Vec<SealedPage>,
    statistics: Statistics,
    max_page_points: u32,
    max_page_bytes: usize,
}

impl TimeChunkWriter {
    /// Creates a time chunk writer.
    pub fn new(config: &TsFileConfig) -> Self {
        Self {
            page: TimePageWriter::new(),
            sealed: Vec::new(),
            statistics: Statistics::new(),
            max_page_points: config.max_page_points,
            max_page_bytes: config.max_page_bytes,
        }
    }

    /// Appends one timestamp.
    pub fn write(&mut self, timestamp: i64) -> Result<()> {
        self.page.write(timestamp)
    }

    /// Whether the in-progress page has hit a sealing threshold.
    pub fn page_is_full(&self) -> bool {
        self.page.point_count() >= self.max_page_points
            || self.page.size_in_bytes() >= self.max_page_bytes
    }

    /// Timestamps in the in-progress page.
    pub fn current_page_points(&self) -> u32 {
        self.page.point_count()
    }

    /// Seals the in-progress page.
    pub fn seal_current_page(&mut self) {
        let page = self.page.seal();
        self.statistics.merge(&page.statistics);
        self.sealed.push(page);
    }

    /// Estimated serialized size of the buffered data.
    pub fn buffered_size(&self) -> usize {
        self.sealed
            .iter()
            .map(|p| p.body.len() + PAGE_FRAME_OVERHEAD)
            .sum::<usize>()
            + self.page.size_in_bytes()
    }

    /// Writes the time chunk and returns its location and statistics.
    pub fn serialize_to<W: Write>(self, out: &mut PositionedWriter<W>) -> Result<ChunkMetadata> {
        serialize_chunk(
            out,
            CHUNK_TIME_FLAG,
            "",
            DataType::Int64,
            EncodingType::default(),
            CompressionType::default(),
            self.sealed,
            self.statistics,
        )
    }
}

/// Buffers one value column of an aligned device.
#[derive(Debug)]
pub struct ValueChunkWriter {
    schema: MeasurementSchema,
    page: ValuePageWriter,
    sealed: Vec<SealedPage>,
    statistics: Statistics,
}

impl ValueChunkWriter {
    /// Creates a value chunk writer for `schema`.
    pub fn new(schema: MeasurementSchema, config: &TsFileConfig) -> Self {
        Self {
            schema,
            page: ValuePageWriter::new(config.max_page_points as usize),
            sealed: Vec::new(),
            statistics: Statistics::new(),
        }
    }

    /// Measurement this column stores.
    pub fn measurement(&self) -> &str {
        &self.schema.name
    }

    /// Value type of the column.
    pub fn data_type(&self) -> DataType {
        self.schema.data_type
    }

    /// Appends one row, null when `value` is `None`.
    pub fn write(&mut self, timestamp: i64, value: Option<&Value>) -> Result<()> {
        self.page.write(timestamp, value)
    }

    /// Seals the in-progress page, keeping the positional slot even
    /// when every row in it was null.
    pub fn seal_current_page(&mut self) -> Result<()> {
        let page = self.page.seal()?;
        self.statistics.merge(&page.statistics);
        self.sealed.push(page);
        Ok(())
    }

    /// Estimated serialized size of the buffered data.
    pub fn buffered_size(&self) -> usize {
        self.sealed
            .iter()
            .map(|p| p.body.len() + PAGE_FRAME_OVERHEAD)
            .sum::<usize>()
            + self.page.size_in_bytes()
    }

    /// Writes the value chunk and returns its location and statistics.
    pub fn serialize_to<W: Write>(self, out: &mut PositionedWriter<W>) -> Result<ChunkMetadata> {
        serialize_chunk(
            out,
            CHUNK_VALUE_FLAG,
            &self.schema.name,
            self.schema.data_type,
            self.schema.encoding,
            self.schema.compression,
            self.sealed,
            self.statistics,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunk_header_roundtrip() {
        let header = ChunkHeader {
            marker: CHUNK_MULTI_PAGE | CHUNK_VALUE_FLAG,
            measurement: "s1".to_string(),
            data_type: DataType::Double,
            encoding: EncodingType::Plain,
            compression: CompressionType::Uncompressed,
            data_size: 4096,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        let mut marker = [0u8; 1];
        std::io::Read::read_exact(&mut cursor, &mut marker).unwrap();
        let decoded = ChunkHeader::read_after_marker(&mut cursor, marker[0]).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_value_chunk());
        assert!(!decoded.is_time_chunk());
        assert!(decoded.is_multi_page());
    }

    #[test]
    fn test_chunk_header_bad_marker() {
        let buf = [0x03u8];
        let result = ChunkHeader::read_after_marker(&mut Cursor::new(&buf[1..]), buf[0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_metadata_roundtrip() {
        let mut stats = Statistics::new();
        stats.update(7);
        let meta = ChunkMetadata {
            offset: 0xDEAD_BEEF,
            statistics: stats,
        };
        let mut buf = Vec::new();
        meta.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), CHUNK_METADATA_SIZE);
        let decoded = ChunkMetadata::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_series_metadata_roundtrip() {
        let mut series = SeriesMetadata::new("s1", DataType::Int64);
        for offset in [100u64, 2000] {
            let mut stats = Statistics::new();
            stats.update(offset as i64);
            series.push_chunk(ChunkMetadata {
                offset,
                statistics: stats,
            });
        }
        assert_eq!(series.statistics.count, 2);

        let mut buf = Vec::new();
        series.write_to(&mut buf).unwrap();
        let decoded = SeriesMetadata::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, series);
    }

    #[test]
    fn test_chunk_writer_seals_pages_by_point_count() {
        let config = TsFileConfig::default().with_max_page_points(100);
        let schema = MeasurementSchema::new("s1", DataType::Int64);
        let mut chunk = ChunkWriter::new(schema, &config);
        for ts in 0..250i64 {
            chunk.write(ts, &Value::Int64(ts * 2)).unwrap();
        }
        // Two full pages sealed, 50 points still in progress.
        assert_eq!(chunk.sealed.len(), 2);
        assert_eq!(chunk.page.point_count(), 50);

        let mut out = PositionedWriter::new(Vec::new());
        let meta = chunk.serialize_to(&mut out).unwrap();
        assert_eq!(meta.offset, 0);
        assert_eq!(meta.statistics.count, 250);
        assert_eq!(meta.statistics.min_timestamp, 0);
        assert_eq!(meta.statistics.max_timestamp, 249);

        let buf = out.into_inner();
        let mut cursor = Cursor::new(&buf);
        let mut marker = [0u8; 1];
        std::io::Read::read_exact(&mut cursor, &mut marker).unwrap();
        let header = ChunkHeader::read_after_marker(&mut cursor, marker[0]).unwrap();
        assert!(header.is_multi_page());
        assert_eq!(header.measurement, "s1");
        assert_eq!(buf.len() as u64, cursor.position() + header.data_size as u64);
    }

    #[test]
    fn test_single_page_chunk_marker() {
        let config = TsFileConfig::default();
        let schema = MeasurementSchema::new("s1", DataType::Boolean);
        let mut chunk = ChunkWriter::new(schema, &config);
        chunk.write(1, &Value::Boolean(true)).unwrap();

        let mut out = PositionedWriter::new(Vec::new());
        chunk.serialize_to(&mut out).unwrap();
        let buf = out.into_inner();
        assert_eq!(buf[0] & 0x03, CHUNK_SINGLE_PAGE);
        assert_eq!(buf[0] & (CHUNK_TIME_FLAG | CHUNK_VALUE_FLAG), 0);
    }

    #[test]
    fn test_value_chunk_keeps_empty_page_slot() {
        let config = TsFileConfig::default();
        let schema = MeasurementSchema::new("s2", DataType::Int32);
        let mut chunk = ValueChunkWriter::new(schema, &config);

        chunk.write(0, Some(&Value::Int32(1))).unwrap();
        chunk.seal_current_page().unwrap();
        chunk.write(1, None).unwrap();
        chunk.write(2, None).unwrap();
        chunk.seal_current_page().unwrap();

        assert_eq!(chunk.sealed.len(), 2);
        assert!(!chunk.sealed[0].is_empty());
        assert!(chunk.sealed[1].is_empty());
        assert_eq!(chunk.statistics.count, 1);
    }
}
