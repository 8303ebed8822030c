//! Single-row write unit.

use crate::data::Value;

/// One row of data for one device: a timestamp plus measurement/value
/// pairs. Records are validated and applied atomically by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Device the row belongs to.
    pub device_id: String,
    /// Timestamp shared by every point in the row.
    pub timestamp: i64,
    /// Measurement name and value pairs.
    pub points: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record for `device_id` at `timestamp`.
    pub fn new(device_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            points: Vec::new(),
        }
    }

    /// Appends one measurement/value pair.
    pub fn with_point(mut self, measurement: impl Into<String>, value: impl Into<Value>) -> Self {
        self.points.push((measurement.into(), value.into()));
        self
    }
}
