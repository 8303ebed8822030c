//! Batched columnar write buffer.
//!
//! A [`Tablet`] holds up to `capacity` rows for one device: a shared
//! timestamp column plus one typed value column per measurement, each
//! paired with a [`Bitmap`] marking which rows actually carry a value.
//! Cells never written stay null and are skipped at flush time, so a
//! tablet can be sparse without sentinel values.

use crate::data::{Bitmap, DataType, MeasurementSchema, Value};
use crate::error::{Result, TsFileError};
use std::collections::HashMap;

/// A fixed-capacity column of one value type.
///
/// Storage is pre-sized at construction so writes are plain index
/// assignments. Which cells are meaningful is tracked by the tablet's
/// bitmaps, not by the column itself.
#[derive(Debug, Clone)]
pub enum TypedColumn {
    /// Boolean cells.
    Boolean(Vec<bool>),
    /// 32-bit integer cells.
    Int32(Vec<i32>),
    /// 64-bit integer cells.
    Int64(Vec<i64>),
    /// 32-bit float cells.
    Float(Vec<f32>),
    /// 64-bit float cells.
    Double(Vec<f64>),
    /// Text cells.
    Text(Vec<String>),
    /// Date cells, days since the epoch.
    Date(Vec<i32>),
    /// Binary cells.
    Blob(Vec<Vec<u8>>),
    /// String cells.
    String(Vec<String>),
}

impl TypedColumn {
    /// Allocates a column of `capacity` default-initialized cells.
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Boolean => TypedColumn::Boolean(vec![false; capacity]),
            DataType::Int32 => TypedColumn::Int32(vec![0; capacity]),
            DataType::Int64 => TypedColumn::Int64(vec![0; capacity]),
            DataType::Float => TypedColumn::Float(vec![0.0; capacity]),
            DataType::Double => TypedColumn::Double(vec![0.0; capacity]),
            DataType::Text => TypedColumn::Text(vec![String::new(); capacity]),
            DataType::Date => TypedColumn::Date(vec![0; capacity]),
            DataType::Blob => TypedColumn::Blob(vec![Vec::new(); capacity]),
            DataType::String => TypedColumn::String(vec![String::new(); capacity]),
        }
    }

    /// The type of value this column stores.
    pub fn data_type(&self) -> DataType {
        match self {
            TypedColumn::Boolean(_) => DataType::Boolean,
            TypedColumn::Int32(_) => DataType::Int32,
            TypedColumn::Int64(_) => DataType::Int64,
            TypedColumn::Float(_) => DataType::Float,
            TypedColumn::Double(_) => DataType::Double,
            TypedColumn::Text(_) => DataType::Text,
            TypedColumn::Date(_) => DataType::Date,
            TypedColumn::Blob(_) => DataType::Blob,
            TypedColumn::String(_) => DataType::String,
        }
    }

    /// Stores `value` at `row`.
    ///
    /// # Errors
    ///
    /// Returns `(expected, actual)` types if `value` does not match the
    /// column type. The caller has already range-checked `row`.
    pub fn set(&mut self, row: usize, value: &Value) -> std::result::Result<(), (DataType, DataType)> {
        match (&mut *self, value) {
            (TypedColumn::Boolean(cells), Value::Boolean(v)) => cells[row] = *v,
            (TypedColumn::Int32(cells), Value::Int32(v)) => cells[row] = *v,
            (TypedColumn::Int64(cells), Value::Int64(v)) => cells[row] = *v,
            (TypedColumn::Float(cells), Value::Float(v)) => cells[row] = *v,
            (TypedColumn::Double(cells), Value::Double(v)) => cells[row] = *v,
            (TypedColumn::Text(cells), Value::Text(v)) => cells[row] = v.clone(),
            (TypedColumn::Date(cells), Value::Date(v)) => cells[row] = *v,
            (TypedColumn::Blob(cells), Value::Blob(v)) => cells[row] = v.clone(),
            (TypedColumn::String(cells), Value::String(v)) => cells[row] = v.clone(),
            (column, value) => return Err((column.data_type(), value.data_type())),
        }
        Ok(())
    }

    /// Reads the cell at `row` back as a [`Value`].
    pub fn value_at(&self, row: usize) -> Value {
        match self {
            TypedColumn::Boolean(cells) => Value::Boolean(cells[row]),
            TypedColumn::Int32(cells) => Value::Int32(cells[row]),
            TypedColumn::Int64(cells) => Value::Int64(cells[row]),
            TypedColumn::Float(cells) => Value::Float(cells[row]),
            TypedColumn::Double(cells) => Value::Double(cells[row]),
            TypedColumn::Text(cells) => Value::Text(cells[row].clone()),
            TypedColumn::Date(cells) => Value::Date(cells[row]),
            TypedColumn::Blob(cells) => Value::Blob(cells[row].clone()),
            TypedColumn::String(cells) => Value::String(cells[row].clone()),
        }
    }
}

/// A fixed-capacity batch of rows for one device.
#[derive(Debug, Clone)]
pub struct Tablet {
    device_id: String,
    schemas: Vec<MeasurementSchema>,
    column_index: HashMap<String, usize>,
    timestamps: Vec<i64>,
    columns: Vec<TypedColumn>,
    bitmaps: Vec<Bitmap>,
    capacity: usize,
    row_count: usize,
}

impl Tablet {
    /// Creates an empty tablet for `device_id` with one column per schema.
    ///
    /// # Errors
    ///
    /// Returns `TsFileError::DuplicateSchema` if two schemas share a
    /// measurement name.
    pub fn new(
        device_id: impl Into<String>,
        schemas: Vec<MeasurementSchema>,
        capacity: usize,
    ) -> Result<Self> {
        let mut column_index = HashMap::with_capacity(schemas.len());
        for (idx, schema) in schemas.iter().enumerate() {
            if column_index.insert(schema.name.clone(), idx).is_some() {
                return Err(TsFileError::DuplicateSchema(schema.name.clone()));
            }
        }
        let columns = schemas
            .iter()
            .map(|s| TypedColumn::with_capacity(s.data_type, capacity))
            .collect();
        let bitmaps = schemas.iter().map(|_| Bitmap::with_capacity(capacity)).collect();
        Ok(Self {
            device_id: device_id.into(),
            timestamps: vec![0; capacity],
            columns,
            bitmaps,
            schemas,
            column_index,
            capacity,
            row_count: 0,
        })
    }

    /// Device the batch belongs to.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Column schemas in declaration order.
    pub fn schemas(&self) -> &[MeasurementSchema] {
        &self.schemas
    }

    /// Maximum number of rows the tablet can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of rows currently populated.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Timestamps of the populated rows.
    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps[..self.row_count]
    }

    /// Sets the timestamp of `row`, growing the populated row count to
    /// cover it.
    ///
    /// # Errors
    ///
    /// Returns `TsFileError::OutOfRange` if `row` is at or past the
    /// capacity.
    pub fn add_timestamp(&mut self, row: usize, timestamp: i64) -> Result<()> {
        self.check_row(row)?;
        self.timestamps[row] = timestamp;
        self.row_count = self.row_count.max(row + 1);
        Ok(())
    }

    /// Sets the value of `measurement` at `row` and marks the cell
    /// non-null.
    ///
    /// # Errors
    ///
    /// Returns `TsFileError::OutOfRange` if `row` is at or past the
    /// capacity or the measurement has no column, and
    /// `TsFileError::TypeMismatch` if the value type does not match the
    /// column.
    pub fn add_value(&mut self, row: usize, measurement: &str, value: &Value) -> Result<()> {
        self.check_row(row)?;
        let column = *self.column_index.get(measurement).ok_or_else(|| {
            TsFileError::OutOfRange(format!(
                "no column {} in tablet for device {}",
                measurement, self.device_id
            ))
        })?;
        self.add_value_at(row, column, value)
    }

    /// Sets the value of column `column` at `row` and marks the cell
    /// non-null.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Tablet::add_value`], with the column
    /// addressed by index.
    pub fn add_value_at(&mut self, row: usize, column: usize, value: &Value) -> Result<()> {
        self.check_row(row)?;
        if column >= self.columns.len() {
            return Err(TsFileError::OutOfRange(format!(
                "column index {} out of {} columns",
                column,
                self.columns.len()
            )));
        }
        self.columns[column]
            .set(row, value)
            .map_err(|(expected, actual)| TsFileError::TypeMismatch {
                measurement: self.schemas[column].name.clone(),
                expected,
                actual,
            })?;
        self.bitmaps[column].set(row);
        Ok(())
    }

    /// Reads back the value of column `column` at `row`, or `None` if
    /// the cell is null.
    pub fn value_at(&self, row: usize, column: usize) -> Option<Value> {
        if row >= self.row_count || column >= self.columns.len() {
            return None;
        }
        if !self.bitmaps[column].is_set(row) {
            return None;
        }
        Some(self.columns[column].value_at(row))
    }

    /// Whether the cell at (`row`, `column`) holds a value.
    pub fn is_set(&self, row: usize, column: usize) -> bool {
        column < self.bitmaps.len() && self.bitmaps[column].is_set(row)
    }

    /// Clears the tablet for reuse, keeping its allocations.
    pub fn reset(&mut self) {
        self.row_count = 0;
        for bitmap in &mut self.bitmaps {
            bitmap.clear_all();
        }
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.capacity {
            return Err(TsFileError::OutOfRange(format!(
                "row {} exceeds tablet capacity {}",
                row, self.capacity
            )));
        }
        Ok(())
    }
}
