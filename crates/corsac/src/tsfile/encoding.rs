//! Page-level value encoding and compression.
//!
//! Version 1 of the format ships a single encoding (PLAIN, fixed-width
//! little-endian with varint-prefixed byte payloads) and a single
//! compression (none). Both are tagged per chunk in the chunk header so
//! later versions can add codecs without a layout change.

use crate::data::{DataType, Value};
use crate::error::{Result, TsFileError};
use crate::tsfile::io::{read_var_u32, write_var_u32};
use std::io::{Read, Write};

/// Encoding applied to page bodies before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncodingType {
    /// Values serialized verbatim, fixed width for numerics and
    /// varint-length-prefixed for byte payloads.
    #[default]
    Plain = 0,
}

impl EncodingType {
    /// Parses an encoding tag from its on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EncodingType::Plain),
            _ => None,
        }
    }
}

/// Compression applied to encoded page bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Page bodies stored as-is.
    #[default]
    Uncompressed = 0,
}

impl CompressionType {
    /// Parses a compression tag from its on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::Uncompressed),
            _ => None,
        }
    }
}

/// Compresses an encoded page body.
pub fn compress(compression: CompressionType, data: Vec<u8>) -> Result<Vec<u8>> {
    match compression {
        CompressionType::Uncompressed => Ok(data),
    }
}

/// Reverses [`compress`], checking the recovered length.
pub fn decompress(
    compression: CompressionType,
    data: Vec<u8>,
    uncompressed_size: usize,
) -> Result<Vec<u8>> {
    match compression {
        CompressionType::Uncompressed => {
            if data.len() != uncompressed_size {
                return Err(TsFileError::InvalidFormat(format!(
                    "uncompressed page size mismatch: header says {}, body is {}",
                    uncompressed_size,
                    data.len()
                )));
            }
            Ok(data)
        }
    }
}

/// Appends one PLAIN-encoded value to a page body.
pub fn encode_value<W: Write>(value: &Value, writer: &mut W) -> Result<()> {
    match value {
        Value::Boolean(v) => writer.write_all(&[u8::from(*v)])?,
        Value::Int32(v) | Value::Date(v) => writer.write_all(&v.to_le_bytes())?,
        Value::Int64(v) => writer.write_all(&v.to_le_bytes())?,
        Value::Float(v) => writer.write_all(&v.to_le_bytes())?,
        Value::Double(v) => writer.write_all(&v.to_le_bytes())?,
        Value::Text(v) | Value::String(v) => {
            write_var_u32(v.len() as u32, writer)?;
            writer.write_all(v.as_bytes())?;
        }
        Value::Blob(v) => {
            write_var_u32(v.len() as u32, writer)?;
            writer.write_all(v)?;
        }
    }
    Ok(())
}

/// Decodes `count` PLAIN-encoded values of one type from a page body.
pub fn decode_values<R: Read>(
    reader: &mut R,
    data_type: DataType,
    count: usize,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(decode_value(reader, data_type)?);
    }
    Ok(values)
}

fn decode_value<R: Read>(reader: &mut R, data_type: DataType) -> Result<Value> {
    let value = match data_type {
        DataType::Boolean => {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf)?;
            Value::Boolean(buf[0] != 0)
        }
        DataType::Int32 => Value::Int32(read_i32(reader)?),
        DataType::Date => Value::Date(read_i32(reader)?),
        DataType::Int64 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Value::Int64(i64::from_le_bytes(buf))
        }
        DataType::Float => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            Value::Float(f32::from_le_bytes(buf))
        }
        DataType::Double => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Value::Double(f64::from_le_bytes(buf))
        }
        DataType::Text => Value::Text(read_utf8(reader)?),
        DataType::String => Value::String(read_utf8(reader)?),
        DataType::Blob => {
            let len = read_var_u32(reader)? as usize;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            Value::Blob(bytes)
        }
    };
    Ok(value)
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_utf8<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_var_u32(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| TsFileError::InvalidFormat(format!("invalid UTF-8 in page body: {}", e)))
}

/// Appends one timestamp to a time page body.
pub fn encode_timestamp<W: Write>(timestamp: i64, writer: &mut W) -> Result<()> {
    writer.write_all(&timestamp.to_le_bytes())?;
    Ok(())
}

/// Decodes `count` timestamps from a time page body.
pub fn decode_timestamps<R: Read>(reader: &mut R, count: usize) -> Result<Vec<i64>> {
    let mut timestamps = Vec::with_capacity(count);
    let mut buf = [0u8; 8];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        timestamps.push(i64::from_le_bytes(buf));
    }
    Ok(timestamps)
}
