use polars::prelude::*;

pub const TS_COLUMN: &str = "ts_event";
pub const OPEN_COLUMN: &str = "open";
pub const HIGH_COLUMN: &str = "high";
pub const LOW_COLUMN: &str = "low";
pub const CLOSE_COLUMN: &str = "close";
pub const VOLUME_COLUMN: &str = "volume";

/// Approximate encoded size of one row: i64 timestamp, four f64 prices, u64 volume.
pub const APPROX_ROW_BYTES: u64 = 48;

/// Expected schema for stored bar files.
///
/// Instrument and granularity are not columns: the directory a file lives in
/// determines both.
pub struct BarSchema;

impl BarSchema {
    /// Get the canonical bar schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(TS_COLUMN.into(), DataType::Int64),
            Field::new(OPEN_COLUMN.into(), DataType::Float64),
            Field::new(HIGH_COLUMN.into(), DataType::Float64),
            Field::new(LOW_COLUMN.into(), DataType::Float64),
            Field::new(CLOSE_COLUMN.into(), DataType::Float64),
            Field::new(VOLUME_COLUMN.into(), DataType::UInt64),
        ])
    }

    /// Validate a decoded DataFrame: required columns, exact types, at least one row.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        if df.height() == 0 {
            return Err(SchemaError::Empty);
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("file has no rows")]
    Empty,
}
