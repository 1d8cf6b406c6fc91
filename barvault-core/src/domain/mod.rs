//! Domain types: bars, granularities, instruments and UTC time ranges.

pub mod bar;
pub mod granularity;
pub mod instrument;
pub mod time;

pub use bar::{sort_and_dedup, Bar};
pub use granularity::{BarKey, BarUnit, Granularity, ParseError, PriceType, EXTERNAL_SUFFIX};
pub use instrument::{AssetClass, Instrument};
pub use time::{
    decode_stamp, encode_stamp, parse_range_file_name, range_file_name, IntoUtc, TimeRange,
};
