//! Bar granularity (`1-DAY-LAST`, `5-MINUTE-MID`, ...) and the index key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Suffix marking a store directory as externally-sourced data.
pub const EXTERNAL_SUFFIX: &str = "-EXTERNAL";

/// Errors from parsing granularities, keys and filename stamps.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid granularity '{0}' (expected STEP-UNIT[-PRICE], e.g. 1-DAY-LAST)")]
    Granularity(String),

    #[error("invalid bar key '{0}'")]
    BarKey(String),

    #[error("invalid timestamp stamp '{0}'")]
    Stamp(String),

    #[error("invalid file name '{0}' (expected <start>_<end>.parquet)")]
    FileName(String),
}

/// Time unit of a bar's aggregation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl BarUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarUnit::Second => "SECOND",
            BarUnit::Minute => "MINUTE",
            BarUnit::Hour => "HOUR",
            BarUnit::Day => "DAY",
            BarUnit::Week => "WEEK",
            BarUnit::Month => "MONTH",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "SECOND" => Some(BarUnit::Second),
            "MINUTE" => Some(BarUnit::Minute),
            "HOUR" => Some(BarUnit::Hour),
            "DAY" => Some(BarUnit::Day),
            "WEEK" => Some(BarUnit::Week),
            "MONTH" => Some(BarUnit::Month),
            _ => None,
        }
    }
}

/// Which price the bar aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    Bid,
    Ask,
    Mid,
    Last,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Bid => "BID",
            PriceType::Ask => "ASK",
            PriceType::Mid => "MID",
            PriceType::Last => "LAST",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "BID" => Some(PriceType::Bid),
            "ASK" => Some(PriceType::Ask),
            "MID" => Some(PriceType::Mid),
            "LAST" => Some(PriceType::Last),
            _ => None,
        }
    }
}

/// Aggregation description of a bar: step size, time unit and price type.
///
/// Canonical text form is `STEP-UNIT-PRICE`. Parsing also accepts `STEP-UNIT`
/// and defaults the price type to `LAST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Granularity {
    pub step: u32,
    pub unit: BarUnit,
    pub price_type: PriceType,
}

impl Granularity {
    pub fn new(step: u32, unit: BarUnit, price_type: PriceType) -> Self {
        Self {
            step,
            unit,
            price_type,
        }
    }

    /// `1-DAY-LAST`
    pub fn daily() -> Self {
        Self::new(1, BarUnit::Day, PriceType::Last)
    }

    /// `1-MINUTE-LAST`
    pub fn minute() -> Self {
        Self::new(1, BarUnit::Minute, PriceType::Last)
    }

    /// Day, week and month bars are compared by calendar date, never by time of day.
    pub fn is_daily_or_coarser(&self) -> bool {
        matches!(self.unit, BarUnit::Day | BarUnit::Week | BarUnit::Month)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.step,
            self.unit.as_str(),
            self.price_type.as_str()
        )
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::Granularity(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        let (step, unit, price_type) = match parts.as_slice() {
            [step, unit] => (*step, *unit, PriceType::Last),
            [step, unit, price] => (
                *step,
                *unit,
                PriceType::parse(&price.to_ascii_uppercase()).ok_or_else(err)?,
            ),
            _ => return Err(err()),
        };
        let step: u32 = step.parse().map_err(|_| err())?;
        if step == 0 {
            return Err(err());
        }
        let unit = BarUnit::parse(&unit.to_ascii_uppercase()).ok_or_else(err)?;
        Ok(Self::new(step, unit, price_type))
    }
}

impl TryFrom<String> for Granularity {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Granularity> for String {
    fn from(value: Granularity) -> Self {
        value.to_string()
    }
}

/// Availability index key: one instrument at one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BarKey {
    pub instrument_id: String,
    pub granularity: Granularity,
}

impl BarKey {
    pub fn new(instrument_id: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            granularity,
        }
    }

    /// Store sub-directory name: `{instrument_id}-{granularity}-EXTERNAL`.
    pub fn dir_name(&self) -> String {
        format!("{self}{EXTERNAL_SUFFIX}")
    }

    /// Inverse of [`BarKey::dir_name`].
    ///
    /// Splits from the right, so instrument ids may contain dashes
    /// (`BTC-USD.X-1-MINUTE-LAST-EXTERNAL`).
    pub fn from_dir_name(name: &str) -> Result<Self, ParseError> {
        let err = || ParseError::BarKey(name.to_string());
        let stem = name.strip_suffix(EXTERNAL_SUFFIX).ok_or_else(err)?;
        let mut parts = stem.rsplitn(4, '-');
        let price = parts.next().ok_or_else(err)?;
        let unit = parts.next().ok_or_else(err)?;
        let step = parts.next().ok_or_else(err)?;
        let instrument_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(err)?;
        let granularity: Granularity = format!("{step}-{unit}-{price}")
            .parse()
            .map_err(|_| err())?;
        Ok(Self::new(instrument_id, granularity))
    }
}

impl fmt::Display for BarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.instrument_id, self.granularity)
    }
}
