pub mod telegram;
pub mod tinkoff;

pub use telegram::{TelegramClient, Update};
pub use tinkoff::TinkoffClient;

use crate::models::{Candle, CandleInterval, Instrument, RecipientId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
    #[error("{service} rejected the request: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },
}

/// Market data transport returning OHLCV series
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch candles covering the last `lookback_days`, oldest first
    ///
    /// An empty series means no data yet and is not an error.
    async fn fetch_candles(
        &self,
        instrument: &Instrument,
        interval: CandleInterval,
        lookback_days: i64,
    ) -> Result<Vec<Candle>, ApiError>;
}

/// Delivery channel for notification text
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, recipient: RecipientId, text: &str) -> Result<(), ApiError>;
}
