use serde::{Deserialize, Serialize};

/// Descriptive metadata for an instrument, as supplied by the remote provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub instrument_id: String,
    pub currency: String,
    pub asset_class: AssetClass,
    pub tick_size: f64,
    pub lot_size: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetClass {
    Equity,
    Future,
    Forex,
    Crypto,
    Index,
    Fund,
    Other,
}

impl AssetClass {
    /// Map a provider's free-form instrument type (`EQUITY`, `ETF`, `CRYPTOCURRENCY`, ...).
    pub fn from_provider_type(kind: &str) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "EQUITY" | "STOCK" => AssetClass::Equity,
            "FUTURE" | "FUTURES" => AssetClass::Future,
            "CURRENCY" | "FX" | "FOREX" => AssetClass::Forex,
            "CRYPTOCURRENCY" | "CRYPTO" => AssetClass::Crypto,
            "INDEX" => AssetClass::Index,
            "ETF" | "MUTUALFUND" | "FUND" => AssetClass::Fund,
            _ => AssetClass::Other,
        }
    }
}

impl Instrument {
    pub fn new(
        instrument_id: impl Into<String>,
        currency: impl Into<String>,
        asset_class: AssetClass,
        tick_size: f64,
        lot_size: f64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            currency: currency.into(),
            asset_class,
            tick_size,
            lot_size,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
