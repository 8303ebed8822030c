//! Per-measurement schema description.

use crate::data::DataType;
use crate::tsfile::encoding::{CompressionType, EncodingType};

/// Describes one measurement of a device: its name, value type, and the
/// codec tags its chunks are written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSchema {
    /// Measurement name, unique within its device.
    pub name: String,
    /// Type every value of this measurement must carry.
    pub data_type: DataType,
    /// Encoding applied to page bodies.
    pub encoding: EncodingType,
    /// Compression applied to encoded page bodies.
    pub compression: CompressionType,
}

impl MeasurementSchema {
    /// Creates a schema with the default encoding and compression.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            encoding: EncodingType::default(),
            compression: CompressionType::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_codecs() {
        let schema = MeasurementSchema::new("s1", DataType::Double);
        assert_eq!(schema.name, "s1");
        assert_eq!(schema.data_type, DataType::Double);
        assert_eq!(schema.encoding, EncodingType::Plain);
        assert_eq!(schema.compression, CompressionType::Uncompressed);
    }
}
