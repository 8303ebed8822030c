//! File-level framing: magic bytes, header, footer, and the series
//! bloom filter.

use crate::error::{Result, TsFileError};
use std::io::{Read, Write};
use xxhash_rust::xxh64::xxh64;

/// Magic bytes opening every file.
pub const TSFILE_MAGIC: [u8; 4] = *b"ACTF";

/// Magic bytes closing every file, the header magic reversed.
pub const TSFILE_MAGIC_REVERSE: [u8; 4] = *b"FTCA";

/// Current format version.
pub const TSFILE_VERSION: u16 = 1;

/// Size of the file header in bytes: magic plus version.
pub const HEADER_SIZE: u64 = 6;

/// Size of the file footer in bytes.
pub const FOOTER_SIZE: u64 = 40;

/// Writes the file header.
pub fn write_file_header<W: Write>(writer: &mut W) -> Result<()> {
    // Magic (4 bytes)
    writer.write_all(&TSFILE_MAGIC)?;
    // Version (2 bytes)
    writer.write_all(&TSFILE_VERSION.to_le_bytes())?;
    Ok(())
}

/// Reads and validates the file header, returning the format version.
pub fn read_file_header<R: Read>(reader: &mut R) -> Result<u16> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != TSFILE_MAGIC {
        return Err(TsFileError::InvalidMagic(magic));
    }
    let mut version_buf = [0u8; 2];
    reader.read_exact(&mut version_buf)?;
    let version = u16::from_le_bytes(version_buf);
    if version != TSFILE_VERSION {
        return Err(TsFileError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Fixed-size footer closing the file.
///
/// The footer is the entry point for readers: it locates the metadata
/// region, the index root, and the bloom filter, and carries the CRC of
/// everything before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFooter {
    /// Offset of the first series metadata blob.
    pub meta_offset: u64,
    /// Offset of the index tree root node.
    pub index_root_offset: u64,
    /// Offset of the bloom filter.
    pub bloom_offset: u64,
    /// CRC32 of all bytes before the footer.
    pub file_crc32: u32,
}

impl FileFooter {
    /// Serializes the footer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Metadata region offset (8 bytes)
        writer.write_all(&self.meta_offset.to_le_bytes())?;
        // Index root offset (8 bytes)
        writer.write_all(&self.index_root_offset.to_le_bytes())?;
        // Bloom filter offset (8 bytes)
        writer.write_all(&self.bloom_offset.to_le_bytes())?;
        // File CRC (4 bytes)
        writer.write_all(&self.file_crc32.to_le_bytes())?;
        // Reserved (8 bytes)
        writer.write_all(&[0u8; 8])?;
        // Reverse magic (4 bytes)
        writer.write_all(&TSFILE_MAGIC_REVERSE)?;
        Ok(())
    }

    /// Deserializes and validates the footer.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; FOOTER_SIZE as usize];
        reader.read_exact(&mut buf)?;
        if buf[36..40] != TSFILE_MAGIC_REVERSE {
            return Err(TsFileError::InvalidFormat(
                "file tail missing reverse magic".to_string(),
            ));
        }
        Ok(Self {
            meta_offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            index_root_offset: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            bloom_offset: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            file_crc32: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }
}

const BLOOM_BITS_PER_KEY: usize = 10;
const BLOOM_HASH_COUNT: u32 = 3;

/// Bloom filter over full series paths.
///
/// Sized at roughly ten bits per key with three hash probes, giving
/// around a 1% false positive rate. Lookups consult it before touching
/// the index tree so absent series miss without any node reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hash_count: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_keys` entries.
    pub fn new(expected_keys: usize) -> Self {
        let num_bits = (expected_keys * BLOOM_BITS_PER_KEY).max(64);
        Self {
            bits: vec![0; num_bits.div_ceil(64)],
            hash_count: BLOOM_HASH_COUNT,
        }
    }

    /// Inserts a series path.
    pub fn insert(&mut self, path: &str) {
        let num_bits = (self.bits.len() * 64) as u64;
        if num_bits == 0 {
            return;
        }
        for seed in 0..self.hash_count {
            let bit = xxh64(path.as_bytes(), seed as u64) % num_bits;
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// Whether the path may have been inserted. False means definitely
    /// absent.
    pub fn maybe_contains(&self, path: &str) -> bool {
        let num_bits = (self.bits.len() * 64) as u64;
        if num_bits == 0 {
            return false;
        }
        (0..self.hash_count).all(|seed| {
            let bit = xxh64(path.as_bytes(), seed as u64) % num_bits;
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    /// Serializes the filter.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Word count (4 bytes)
        writer.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        // Hash count (1 byte) + reserved (3 bytes)
        writer.write_all(&[self.hash_count as u8, 0, 0, 0])?;
        // Bit words (8 bytes each)
        for word in &self.bits {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Deserializes a filter.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let word_count = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let hash_count = header[4] as u32;
        if hash_count == 0 {
            return Err(TsFileError::InvalidFormat(
                "bloom filter with zero hashes".to_string(),
            ));
        }
        let mut bits = Vec::with_capacity(word_count);
        let mut word = [0u8; 8];
        for _ in 0..word_count {
            reader.read_exact(&mut word)?;
            bits.push(u64::from_le_bytes(word));
        }
        Ok(Self { bits, hash_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_roundtrip() {
        let mut buf = Vec::new();
        write_file_header(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_SIZE);
        assert_eq!(read_file_header(&mut Cursor::new(&buf)).unwrap(), 1);
    }

    #[test]
    fn test_header_bad_magic() {
        let buf = *b"JUNK\x01\x00";
        let result = read_file_header(&mut Cursor::new(&buf));
        assert!(matches!(result, Err(TsFileError::InvalidMagic(_))));
    }

    #[test]
    fn test_header_bad_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&TSFILE_MAGIC);
        buf.extend_from_slice(&99u16.to_le_bytes());
        let result = read_file_header(&mut Cursor::new(&buf));
        assert!(matches!(result, Err(TsFileError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = FileFooter {
            meta_offset: 1000,
            index_root_offset: 2000,
            bloom_offset: 3000,
            file_crc32: 0xCAFE_F00D,
        };
        let mut buf = Vec::new();
        footer.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, FOOTER_SIZE);
        let decoded = FileFooter::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_footer_missing_reverse_magic() {
        let buf = [0u8; FOOTER_SIZE as usize];
        let result = FileFooter::read_from(&mut Cursor::new(&buf));
        assert!(result.is_err());
    }

    #[test]
    fn test_bloom_no_false_negatives() {
        let keys: Vec<String> = (0..500).map(|i| format!("root.sg.d{}.s{}", i % 20, i)).collect();
        let mut filter = BloomFilter::new(keys.len());
        for key in &keys {
            filter.insert(key);
        }
        for key in &keys {
            assert!(filter.maybe_contains(key));
        }
    }

    #[test]
    fn test_bloom_misses_most_absent_keys() {
        let mut filter = BloomFilter::new(100);
        for i in 0..100 {
            filter.insert(&format!("root.sg.d1.s{i}"));
        }
        let misses = (0..1000)
            .filter(|i| !filter.maybe_contains(&format!("root.other.d9.x{i}")))
            .count();
        // ~1% false positive rate; be generous to avoid flakiness.
        assert!(misses > 900);
    }

    #[test]
    fn test_bloom_roundtrip() {
        let mut filter = BloomFilter::new(10);
        filter.insert("root.sg.d1.s1");
        let mut buf = Vec::new();
        filter.write_to(&mut buf).unwrap();
        let decoded = BloomFilter::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, filter);
        assert!(decoded.maybe_contains("root.sg.d1.s1"));
        assert!(!decoded.maybe_contains("root.sg.d1.s2"));
    }
}
