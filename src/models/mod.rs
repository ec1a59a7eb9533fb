use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat id of a notification subscriber
pub type RecipientId = i64;

/// An exchange-traded instrument from the scan universe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub ticker: String,
    pub figi: String, // Broker-side instrument id
}

impl Instrument {
    pub fn new(ticker: impl Into<String>, figi: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            figi: figi.into(),
        }
    }
}

/// OHLCV candlestick data
///
/// Series are always ordered by ascending timestamp with one candle per timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle timeframe requested from the market data source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CandleInterval {
    /// Monitoring timeframe for active signals
    OneMinute,
    /// Scan timeframe for breakout and retest detection
    Hour,
}

impl CandleInterval {
    /// Interval name used by the broker REST gateway
    pub fn wire_name(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "CANDLE_INTERVAL_1_MIN",
            CandleInterval::Hour => "CANDLE_INTERVAL_HOUR",
        }
    }
}

/// Extract closing prices from candles
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}
