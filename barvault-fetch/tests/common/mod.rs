//! Shared test doubles: a scripted market-data client and a recording sleeper.

#![allow(dead_code)]

use async_trait::async_trait;
use barvault_core::domain::{AssetClass, Bar, Granularity, Instrument};
use barvault_fetch::{
    Catalog, CatalogConfig, FetchedBars, MarketDataClient, ProviderError, Sleeper,
};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake answers `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Up,
    Refused,
    Unreachable,
    /// `connect` never completes.
    Hangs,
}

/// How the fake answers `fetch_bars`.
#[derive(Debug, Clone)]
pub enum Script {
    /// Return these bars (filtered to the requested range).
    Bars(Vec<Bar>),
    /// Return these bars whatever range was asked for.
    Unfiltered(Vec<Bar>),
    /// Fail this many times, then return the bars.
    FailThen(u32, Vec<Bar>),
    AlwaysFail,
    Empty,
}

pub struct FakeClient {
    reachability: Reachability,
    script: Script,
    instrument: Option<Instrument>,
    connected: AtomicBool,
    pub fetch_calls: AtomicU32,
    pub connect_calls: AtomicU32,
}

impl FakeClient {
    pub fn new(script: Script) -> Self {
        Self {
            reachability: Reachability::Up,
            script,
            instrument: None,
            connected: AtomicBool::new(false),
            fetch_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
        }
    }

    pub fn with_reachability(mut self, reachability: Reachability) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, bars: &[Bar], start: DateTime<Utc>, end: DateTime<Utc>) -> FetchedBars {
        let (first, last) = (start.date_naive(), end.date_naive());
        FetchedBars {
            bars: bars
                .iter()
                .filter(|b| (first..=last).contains(&b.ts.date_naive()))
                .cloned()
                .collect(),
            instrument: self.instrument.clone(),
        }
    }
}

#[async_trait]
impl MarketDataClient for FakeClient {
    fn name(&self) -> &str {
        "fake"
    }

    async fn connect(&self, _timeout: Duration) -> Result<bool, ProviderError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.reachability {
            Reachability::Up => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Reachability::Refused => Ok(false),
            Reachability::Unreachable => {
                Err(ProviderError::NetworkUnreachable("no route to host".into()))
            }
            Reachability::Hangs => std::future::pending().await,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch_bars(
        &self,
        _instrument_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _granularity: &Granularity,
    ) -> Result<FetchedBars, ProviderError> {
        let n = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Bars(bars) => Ok(self.respond(bars, start, end)),
            Script::Unfiltered(bars) => Ok(FetchedBars {
                bars: bars.clone(),
                instrument: self.instrument.clone(),
            }),
            Script::FailThen(failures, bars) if n >= *failures => {
                Ok(self.respond(bars, start, end))
            }
            Script::FailThen(..) | Script::AlwaysFail => {
                Err(ProviderError::NetworkUnreachable("connection reset by peer".into()))
            }
            Script::Empty => Ok(FetchedBars {
                bars: Vec::new(),
                instrument: self.instrument.clone(),
            }),
        }
    }
}

/// Records requested sleeps instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// Daily bars on weekdays in `[start, end]`, skipping `holidays`, priced by a
/// seeded random walk.
pub fn trading_days(
    instrument_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    holidays: &[NaiveDate],
) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut price = 100.0_f64;
    let mut bars = Vec::new();
    let mut date = start;
    while date <= end {
        let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if !weekend && !holidays.contains(&date) {
            let change: f64 = rng.gen_range(-0.02..0.02);
            let open = price;
            let close = price * (1.0 + change);
            bars.push(Bar {
                instrument_id: instrument_id.to_string(),
                granularity: Granularity::daily(),
                ts: Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()),
                open,
                high: open.max(close) * 1.005,
                low: open.min(close) * 0.995,
                close,
                volume: rng.gen_range(1_000_000..5_000_000),
            });
            price = close;
        }
        date += ChronoDuration::days(1);
    }
    bars
}

/// The 21 sessions of January 2024 (New Year's Day and MLK Day closed).
pub fn january_2024(instrument_id: &str) -> Vec<Bar> {
    let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
    trading_days(instrument_id, d(1), d(31), &[d(1), d(15)])
}

pub fn aapl() -> Instrument {
    Instrument::new("AAPL.X", "USD", AssetClass::Equity, 0.01, 1.0).with_description("Apple Inc.")
}

/// A catalog over `root` with a recording sleeper.
pub fn open_catalog(
    root: &Path,
    client: Arc<FakeClient>,
) -> (Catalog, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let catalog = Catalog::open(CatalogConfig::new(root), client)
        .unwrap()
        .with_sleeper(sleeper.clone());
    (catalog, sleeper)
}
