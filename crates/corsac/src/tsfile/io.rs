//! Low-level serialization utilities for the on-disk format.
//!
//! Variable-length unsigned integers use the 7-bits-per-byte encoding with
//! a 0x80 continuation flag, least-significant group first. Strings are
//! varint-length-prefixed UTF-8.

use crate::error::{Result, TsFileError};
use std::io::{self, Read, Write};

/// Writes an unsigned varint, returning the number of bytes written.
pub fn write_var_u32<W: Write>(mut value: u32, writer: &mut W) -> Result<usize> {
    let mut written = 1usize;
    while value & 0xFFFF_FF80 != 0 {
        writer.write_all(&[((value & 0x7F) | 0x80) as u8])?;
        value >>= 7;
        written += 1;
    }
    writer.write_all(&[(value & 0x7F) as u8])?;
    Ok(written)
}

/// Reads an unsigned varint.
///
/// # Errors
///
/// Returns `TsFileError::InvalidFormat` if the encoding runs past the
/// 5 bytes a u32 can occupy.
pub fn read_var_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut value = 0u32;
    let mut byte = [0u8; 1];
    for group in 0..5u32 {
        reader.read_exact(&mut byte)?;
        value |= ((byte[0] & 0x7F) as u32) << (group * 7);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(TsFileError::InvalidFormat(
        "varint exceeds 5 bytes".to_string(),
    ))
}

/// Writes a varint-length-prefixed UTF-8 string.
pub fn write_var_str<W: Write>(value: &str, writer: &mut W) -> Result<usize> {
    let bytes = value.as_bytes();
    let prefix = write_var_u32(bytes.len() as u32, writer)?;
    writer.write_all(bytes)?;
    Ok(prefix + bytes.len())
}

/// Reads a varint-length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns `TsFileError::InvalidFormat` on invalid UTF-8.
pub fn read_var_str<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_var_u32(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| TsFileError::InvalidFormat(format!("invalid UTF-8 in string: {}", e)))
}

/// A sequential output sink that tracks its own byte offset.
///
/// Everything written through it advances [`PositionedWriter::offset`],
/// so structures serialized during a flush can record the exact file
/// offsets the index tree will later point at.
#[derive(Debug)]
pub struct PositionedWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> PositionedWriter<W> {
    /// Wraps a writer, starting the offset at zero.
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Current byte offset from the start of the stream.
    pub fn offset(&self) -> u64 {
        self.position
    }

    /// Consumes the wrapper, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for PositionedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_var_u32_single_byte() {
        for value in [0u32, 1, 42, 127] {
            let mut buf = Vec::new();
            assert_eq!(write_var_u32(value, &mut buf).unwrap(), 1);
            assert_eq!(read_var_u32(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_var_u32_multi_byte() {
        let cases = [
            (128u32, 2usize),
            (300, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_152, 4),
            (u32::MAX, 5),
        ];
        for (value, expected_len) in cases {
            let mut buf = Vec::new();
            assert_eq!(write_var_u32(value, &mut buf).unwrap(), expected_len);
            assert_eq!(buf.len(), expected_len);
            assert_eq!(read_var_u32(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_var_u32_known_encoding() {
        // 300 = 0b10_0101100: low group 0x2C with continuation, high group 0x02.
        let mut buf = Vec::new();
        write_var_u32(300, &mut buf).unwrap();
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_var_u32_overlong_rejected() {
        let buf = [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let result = read_var_u32(&mut Cursor::new(&buf));
        assert!(result.is_err());
    }

    #[test]
    fn test_var_u32_truncated() {
        let buf = [0x80u8];
        assert!(read_var_u32(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn test_var_str_roundtrip() {
        for value in ["", "s1", "root.sg.d1", "温度"] {
            let mut buf = Vec::new();
            write_var_str(value, &mut buf).unwrap();
            assert_eq!(read_var_str(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_var_str_invalid_utf8() {
        let buf = [0x02u8, 0xFF, 0xFE];
        assert!(read_var_str(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn test_positioned_writer_tracks_offset() {
        let mut out = PositionedWriter::new(Vec::new());
        assert_eq!(out.offset(), 0);
        out.write_all(b"ACTF").unwrap();
        assert_eq!(out.offset(), 4);
        write_var_u32(300, &mut out).unwrap();
        assert_eq!(out.offset(), 6);
        assert_eq!(out.into_inner().len(), 6);
    }
}
