//! File reader: footer validation, index descent, and point
//! reconstruction.

use crate::data::{Bitmap, Value};
use crate::error::{Result, TsFileError};
use crate::tsfile::chunk::{ChunkHeader, SeriesMetadata};
use crate::tsfile::encoding::{decode_timestamps, decode_values, decompress};
use crate::tsfile::file::{read_file_header, BloomFilter, FileFooter, FOOTER_SIZE, HEADER_SIZE};
use crate::tsfile::group::CHUNK_GROUP_MARKER;
use crate::tsfile::index::{MetadataIndexNode, MetadataIndexNodeType};
use crate::tsfile::io::read_var_u32;
use crate::tsfile::stats::Statistics;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index descent depth limit, guards against cyclic offsets in a
/// corrupt index.
const MAX_INDEX_DEPTH: usize = 64;

/// Reads a closed file.
///
/// Opening validates the header magic, version, footer, and file CRC,
/// and loads the index root and bloom filter. Data reads reopen the
/// file, so a reader is cheap to keep around.
#[derive(Debug)]
pub struct TsFileReader {
    path: PathBuf,
    footer: FileFooter,
    root: MetadataIndexNode,
    bloom: BloomFilter,
}

impl TsFileReader {
    /// Opens and validates the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE + FOOTER_SIZE {
            return Err(TsFileError::InvalidFormat(format!(
                "file is {size} bytes, smaller than header plus footer"
            )));
        }

        read_file_header(&mut file)?;
        file.seek(SeekFrom::Start(size - FOOTER_SIZE))?;
        let footer = FileFooter::read_from(&mut file)?;

        file.seek(SeekFrom::Start(0))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = (&mut file).take(size - FOOTER_SIZE);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let read = remaining.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let actual = hasher.finalize();
        if actual != footer.file_crc32 {
            return Err(TsFileError::ChecksumMismatch {
                expected: footer.file_crc32,
                actual,
            });
        }

        let data_end = size - FOOTER_SIZE;
        if footer.meta_offset < HEADER_SIZE
            || footer.index_root_offset < footer.meta_offset
            || footer.bloom_offset < footer.index_root_offset
            || footer.bloom_offset >= data_end
        {
            return Err(TsFileError::InvalidFormat(
                "footer offsets out of bounds".to_string(),
            ));
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(footer.index_root_offset))?;
        let root = MetadataIndexNode::read_from(&mut reader)?;
        if !root.node_type().is_device_level() {
            return Err(TsFileError::MalformedIndex(
                "index root is not a device-level node".to_string(),
            ));
        }
        reader.seek(SeekFrom::Start(footer.bloom_offset))?;
        let bloom = BloomFilter::read_from(&mut reader)?;

        debug!("opened tsfile {} ({} bytes)", path.display(), size);
        Ok(Self {
            path,
            footer,
            root,
            bloom,
        })
    }

    /// The validated file footer.
    pub fn footer(&self) -> FileFooter {
        self.footer
    }

    /// Locates the metadata blob region covering a series.
    ///
    /// Returns the `[start, end)` byte range of the leaf region holding
    /// the series metadata, or `None` if the series does not exist.
    pub fn lookup(&self, device: &str, measurement: &str) -> Result<Option<(u64, u64)>> {
        // The empty name is reserved for the internal time column of an
        // aligned device and is never exposed as a series.
        if measurement.is_empty() {
            return Ok(None);
        }
        if !self.bloom.maybe_contains(&format!("{device}.{measurement}")) {
            return Ok(None);
        }
        Ok(self
            .find_series(device, measurement)?
            .map(|(_, region)| region))
    }

    /// Reads the metadata blob for a series, or `None` if absent.
    pub fn series_metadata(&self, device: &str, measurement: &str) -> Result<Option<SeriesMetadata>> {
        if measurement.is_empty() {
            return Ok(None);
        }
        if !self.bloom.maybe_contains(&format!("{device}.{measurement}")) {
            return Ok(None);
        }
        Ok(self.find_series(device, measurement)?.map(|(blob, _)| blob))
    }

    /// All device names in the file, in sorted order.
    pub fn devices(&self) -> Result<Vec<String>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        collect_devices(&mut file, &self.root, &mut out, 0)?;
        Ok(out)
    }

    /// Reads every point of one series in timestamp order, or `None`
    /// if the series does not exist.
    ///
    /// For aligned series the shared time chunk is re-paired with the
    /// value chunk page by page, skipping empty page slots and null
    /// rows.
    pub fn read_points(&self, device: &str, measurement: &str) -> Result<Option<Vec<(i64, Value)>>> {
        if measurement.is_empty() {
            return Ok(None);
        }
        if !self.bloom.maybe_contains(&format!("{device}.{measurement}")) {
            return Ok(None);
        }
        let blob = match self.find_series(device, measurement)? {
            Some((blob, _)) => blob,
            None => return Ok(None),
        };

        let mut points = Vec::new();
        if blob.chunks.is_empty() {
            return Ok(Some(points));
        }

        let mut file = BufReader::new(File::open(&self.path)?);

        let (first_header, first_data) = read_chunk(&mut file, blob.chunks[0].offset)?;
        if first_header.is_value_chunk() {
            let time_blob = match self.find_series(device, "")? {
                Some((blob, _)) => blob,
                None => {
                    return Err(TsFileError::MalformedIndex(format!(
                        "aligned series {device}.{measurement} has no time column"
                    )))
                }
            };
            if time_blob.chunks.len() != blob.chunks.len() {
                return Err(TsFileError::MalformedIndex(format!(
                    "series {device}.{measurement}: {} value chunks but {} time chunks",
                    blob.chunks.len(),
                    time_blob.chunks.len()
                )));
            }
            let (time_header, time_data) = read_chunk(&mut file, time_blob.chunks[0].offset)?;
            parse_aligned_pair(&time_header, &time_data, &first_header, &first_data, &mut points)?;
            for (value_meta, time_meta) in blob.chunks[1..]
                .iter()
                .zip(time_blob.chunks[1..].iter())
            {
                let (time_header, time_data) = read_chunk(&mut file, time_meta.offset)?;
                let (value_header, value_data) = read_chunk(&mut file, value_meta.offset)?;
                parse_aligned_pair(&time_header, &time_data, &value_header, &value_data, &mut points)?;
            }
        } else {
            parse_plain_chunk(&first_header, &first_data, &mut points)?;
            for chunk_meta in &blob.chunks[1..] {
                let (header, data) = read_chunk(&mut file, chunk_meta.offset)?;
                if header.is_value_chunk() || header.is_time_chunk() {
                    return Err(TsFileError::InvalidFormat(format!(
                        "series {device}.{measurement} mixes aligned and plain chunks"
                    )));
                }
                parse_plain_chunk(&header, &data, &mut points)?;
            }
        }
        Ok(Some(points))
    }

    /// Descends the index tree for one series, returning its metadata
    /// blob and the leaf region it was found in.
    fn find_series(
        &self,
        device: &str,
        measurement: &str,
    ) -> Result<Option<(SeriesMetadata, (u64, u64))>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let mut node = self.root.clone();
        for _ in 0..MAX_INDEX_DEPTH {
            let key = if node.node_type().is_device_level() {
                device
            } else {
                measurement
            };
            // Only the device leaf is exact: a floor miss below it is
            // resolved by scanning the leaf region.
            let exact = node.node_type() == MetadataIndexNodeType::LeafDevice;
            let (entry, end_offset) = match node.get_child_index_entry(key, exact) {
                Some(found) => found,
                None => return Ok(None),
            };
            let offset = entry.offset();
            if node.node_type() == MetadataIndexNodeType::LeafMeasurement {
                return scan_blob_region(&mut file, offset, end_offset, measurement);
            }
            file.seek(SeekFrom::Start(offset))?;
            node = MetadataIndexNode::read_from(&mut file)?;
        }
        Err(TsFileError::MalformedIndex(format!(
            "index deeper than {MAX_INDEX_DEPTH} levels"
        )))
    }
}

/// Scans a leaf blob region `[start, end)` for an exact measurement
/// match. The region is sorted, so the scan stops at the first key past
/// the target.
fn scan_blob_region(
    file: &mut BufReader<File>,
    start: u64,
    end: u64,
    measurement: &str,
) -> Result<Option<(SeriesMetadata, (u64, u64))>> {
    if end < start {
        return Err(TsFileError::MalformedIndex(format!(
            "blob region {start}..{end} is inverted"
        )));
    }
    let len = (end - start) as usize;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut buf)?;
    let mut cursor = Cursor::new(&buf[..]);
    while (cursor.position() as usize) < len {
        let blob = SeriesMetadata::read_from(&mut cursor)?;
        match blob.measurement.as_str().cmp(measurement) {
            Ordering::Equal => return Ok(Some((blob, (start, end)))),
            Ordering::Greater => return Ok(None),
            Ordering::Less => {}
        }
    }
    Ok(None)
}

fn collect_devices(
    file: &mut BufReader<File>,
    node: &MetadataIndexNode,
    out: &mut Vec<String>,
    depth: usize,
) -> Result<()> {
    if depth >= MAX_INDEX_DEPTH {
        return Err(TsFileError::MalformedIndex(format!(
            "index deeper than {MAX_INDEX_DEPTH} levels"
        )));
    }
    match node.node_type() {
        MetadataIndexNodeType::LeafDevice => {
            for entry in node.children() {
                out.push(entry.compare_key().to_string());
            }
        }
        MetadataIndexNodeType::InternalDevice => {
            for entry in node.children() {
                file.seek(SeekFrom::Start(entry.offset()))?;
                let child = MetadataIndexNode::read_from(file)?;
                collect_devices(file, &child, out, depth + 1)?;
            }
        }
        _ => {
            return Err(TsFileError::MalformedIndex(
                "measurement node reached from the device level".to_string(),
            ))
        }
    }
    Ok(())
}

fn read_chunk(file: &mut BufReader<File>, offset: u64) -> Result<(ChunkHeader, Vec<u8>)> {
    file.seek(SeekFrom::Start(offset))?;
    let mut marker = [0u8; 1];
    file.read_exact(&mut marker)?;
    if marker[0] == CHUNK_GROUP_MARKER {
        return Err(TsFileError::InvalidFormat(format!(
            "chunk offset {offset} points at a group header"
        )));
    }
    let header = ChunkHeader::read_after_marker(file, marker[0])?;
    let mut data = vec![0u8; header.data_size as usize];
    file.read_exact(&mut data)?;
    Ok((header, data))
}

/// Reads one page frame, returning its decompressed body. Empty page
/// slots return an empty body.
fn read_page_body(cursor: &mut Cursor<&[u8]>, header: &ChunkHeader) -> Result<Vec<u8>> {
    let uncompressed_size = read_var_u32(cursor)? as usize;
    let compressed_size = read_var_u32(cursor)? as usize;
    if uncompressed_size == 0 && compressed_size == 0 {
        return Ok(Vec::new());
    }
    if header.is_multi_page() {
        Statistics::read_from(cursor)?;
    }
    let mut data = vec![0u8; compressed_size];
    cursor.read_exact(&mut data)?;
    decompress(header.compression, data, uncompressed_size)
}

fn parse_plain_chunk(
    header: &ChunkHeader,
    data: &[u8],
    points: &mut Vec<(i64, Value)>,
) -> Result<()> {
    let mut cursor = Cursor::new(data);
    while (cursor.position() as usize) < data.len() {
        let body = read_page_body(&mut cursor, header)?;
        if body.is_empty() {
            continue;
        }
        let mut body_cursor = Cursor::new(&body[..]);
        let time_len = read_var_u32(&mut body_cursor)? as usize;
        if time_len % 8 != 0 {
            return Err(TsFileError::InvalidFormat(format!(
                "page time buffer of {time_len} bytes is not a whole number of timestamps"
            )));
        }
        let count = time_len / 8;
        let timestamps = decode_timestamps(&mut body_cursor, count)?;
        let values = decode_values(&mut body_cursor, header.data_type, count)?;
        points.extend(timestamps.into_iter().zip(values));
    }
    Ok(())
}

/// Re-pairs one time chunk with one value chunk, window by window.
fn parse_aligned_pair(
    time_header: &ChunkHeader,
    time_data: &[u8],
    value_header: &ChunkHeader,
    value_data: &[u8],
    points: &mut Vec<(i64, Value)>,
) -> Result<()> {
    if !time_header.is_time_chunk() {
        return Err(TsFileError::InvalidFormat(
            "aligned pair starts with a non-time chunk".to_string(),
        ));
    }

    let mut windows = Vec::new();
    let mut time_cursor = Cursor::new(time_data);
    while (time_cursor.position() as usize) < time_data.len() {
        let body = read_page_body(&mut time_cursor, time_header)?;
        if body.len() % 8 != 0 {
            return Err(TsFileError::InvalidFormat(format!(
                "time page of {} bytes is not a whole number of timestamps",
                body.len()
            )));
        }
        let count = body.len() / 8;
        windows.push(decode_timestamps(&mut Cursor::new(&body[..]), count)?);
    }

    let mut value_cursor = Cursor::new(value_data);
    for window in &windows {
        let body = read_page_body(&mut value_cursor, value_header)?;
        if body.is_empty() {
            // The whole window is null for this column.
            continue;
        }
        let mut body_cursor = Cursor::new(&body[..]);
        let row_count = read_var_u32(&mut body_cursor)? as usize;
        if row_count != window.len() {
            return Err(TsFileError::InvalidFormat(format!(
                "value page covers {row_count} rows but its time page has {}",
                window.len()
            )));
        }
        let mut bitmap_bytes = vec![0u8; row_count.div_ceil(8)];
        body_cursor.read_exact(&mut bitmap_bytes)?;
        let bitmap = Bitmap::from_bytes(&bitmap_bytes, row_count);
        let non_null = bitmap.count_set(row_count);
        let values = decode_values(&mut body_cursor, value_header.data_type, non_null)?;
        let mut values = values.into_iter();
        for (row, timestamp) in window.iter().enumerate() {
            if bitmap.is_set(row) {
                let value = values.next().ok_or_else(|| {
                    TsFileError::InvalidFormat(
                        "value page holds fewer values than its bitmap marks".to_string(),
                    )
                })?;
                points.push((*timestamp, value));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.ctf");
        std::fs::write(&path, b"ACTF").unwrap();
        let result = TsFileReader::open(&path);
        assert!(matches!(result, Err(TsFileError::InvalidFormat(_))));
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.ctf");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[0u8; 128]).unwrap();
        let result = TsFileReader::open(&path);
        assert!(matches!(result, Err(TsFileError::InvalidMagic(_))));
    }
}
