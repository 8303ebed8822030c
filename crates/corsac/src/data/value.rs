//! Data types and runtime values for measurement columns.

/// Declared data type of a measurement column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    /// Boolean values.
    Boolean = 0,
    /// 32-bit signed integers.
    Int32 = 1,
    /// 64-bit signed integers.
    #[default]
    Int64 = 2,
    /// 32-bit floating point values.
    Float = 3,
    /// 64-bit floating point values.
    Double = 4,
    /// UTF-8 text.
    Text = 5,
    /// Calendar dates stored as a 32-bit day number.
    Date = 6,
    /// Raw binary values.
    Blob = 7,
    /// UTF-8 strings (distinct column type from [`DataType::Text`]).
    String = 8,
}

impl DataType {
    /// Creates a DataType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Boolean),
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Float),
            4 => Some(Self::Double),
            5 => Some(Self::Text),
            6 => Some(Self::Date),
            7 => Some(Self::Blob),
            8 => Some(Self::String),
            _ => None,
        }
    }
}

/// A runtime value carrying its own type tag.
///
/// Writes are type-checked by comparing [`Value::data_type`] against the
/// column's declared [`DataType`]; there is no coercion between types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean value.
    Boolean(bool),
    /// A 32-bit integer value.
    Int32(i32),
    /// A 64-bit integer value.
    Int64(i64),
    /// A 32-bit float value.
    Float(f32),
    /// A 64-bit float value.
    Double(f64),
    /// A text value.
    Text(String),
    /// A date value as a day number.
    Date(i32),
    /// A binary value.
    Blob(Vec<u8>),
    /// A string value.
    String(String),
}

impl Value {
    /// Returns the data type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Text(_) => DataType::Text,
            Value::Date(_) => DataType::Date,
            Value::Blob(_) => DataType::Blob,
            Value::String(_) => DataType::String,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_codes_roundtrip() {
        for code in 0..=8u8 {
            let ty = DataType::from_u8(code).unwrap();
            assert_eq!(ty as u8, code);
        }
        assert!(DataType::from_u8(9).is_none());
        assert!(DataType::from_u8(255).is_none());
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Boolean(true).data_type(), DataType::Boolean);
        assert_eq!(Value::Int32(1).data_type(), DataType::Int32);
        assert_eq!(Value::Int64(1).data_type(), DataType::Int64);
        assert_eq!(Value::Float(1.0).data_type(), DataType::Float);
        assert_eq!(Value::Double(1.0).data_type(), DataType::Double);
        assert_eq!(Value::Text("a".into()).data_type(), DataType::Text);
        assert_eq!(Value::Date(20240101).data_type(), DataType::Date);
        assert_eq!(Value::Blob(vec![1]).data_type(), DataType::Blob);
        assert_eq!(Value::String("a".into()).data_type(), DataType::String);
    }

    #[test]
    fn test_from_primitives() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(5i32), Value::Int32(5));
        assert_eq!(Value::from(5i64), Value::Int64(5));
        assert_eq!(Value::from(1.5f32), Value::Float(1.5));
        assert_eq!(Value::from(1.5f64), Value::Double(1.5));
    }
}
