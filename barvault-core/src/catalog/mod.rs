//! Local bar catalog: Parquet store, availability index, quarantine and gaps.

pub mod builder;
pub mod error;
pub mod gaps;
pub mod index;
pub mod quarantine;
pub mod schema;
pub mod store;

pub use builder::IndexBuilder;
pub use error::StoreError;
pub use gaps::detect_gaps;
pub use index::{AvailabilityIndex, AvailabilityRecord};
pub use quarantine::{Quarantine, QuarantinedFile, QUARANTINE_DIR};
pub use schema::{BarSchema, SchemaError, APPROX_ROW_BYTES};
pub use store::{BarStore, CorruptFile, RangeRead, StoredFile, INSTRUMENTS_DIR};
