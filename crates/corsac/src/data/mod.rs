//! In-memory data model: values, schemas, and write batches.

mod bitmap;
mod record;
mod schema;
mod tablet;
mod value;

pub use bitmap::Bitmap;
pub use record::Record;
pub use schema::MeasurementSchema;
pub use tablet::{Tablet, TypedColumn};
pub use value::{DataType, Value};

/// Timestamp type used throughout the format, milliseconds by
/// convention but uninterpreted by the file layer.
pub type Timestamp = i64;
