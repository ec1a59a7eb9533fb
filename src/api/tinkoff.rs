use super::{ApiError, CandleSource};
use crate::models::{Candle, CandleInterval, Instrument};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TINKOFF_API_BASE: &str = "https://invest-public-api.tinkoff.ru/rest";
const MARKET_DATA_SERVICE: &str = "tinkoff.public.invest.api.contract.v1.MarketDataService";
const INSTRUMENTS_SERVICE: &str = "tinkoff.public.invest.api.contract.v1.InstrumentsService";
const MAX_RETRIES: u32 = 3;
const SERVICE: &str = "Tinkoff";
const PREFERRED_CLASS_CODE: &str = "TQBR"; // MOEX main board

// Type alias for the rate limiter to simplify signatures
type PacingRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the broker's REST market data gateway
///
/// Cloneable; all clones share the same pacing limiter so the scan never
/// exceeds one request per configured interval.
#[derive(Clone)]
pub struct TinkoffClient {
    client: Client,
    base_url: String,
    token: String,
    rate_limiter: Arc<PacingRateLimiter>,
}

/// int64 values arrive as JSON strings, older gateways send numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Text(String),
    Number(i64),
}

impl Int64Repr {
    fn value(&self) -> Result<i64, ApiError> {
        match self {
            Int64Repr::Number(n) => Ok(*n),
            Int64Repr::Text(s) => s.parse().map_err(|e| ApiError::Decode {
                service: SERVICE,
                reason: format!("invalid int64 {:?}: {}", s, e),
            }),
        }
    }
}

/// Fixed-point price: units plus billionths
#[derive(Debug, Deserialize)]
struct Quotation {
    units: Int64Repr,
    #[serde(default)]
    nano: i32,
}

impl Quotation {
    fn to_f64(&self) -> Result<f64, ApiError> {
        Ok(self.units.value()? as f64 + self.nano as f64 / 1e9)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetCandlesRequest<'a> {
    figi: &'a str,
    from: String,
    to: String,
    interval: &'static str,
}

#[derive(Debug, Deserialize)]
struct GetCandlesResponse {
    #[serde(default)]
    candles: Vec<HistoricCandle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoricCandle {
    open: Quotation,
    high: Quotation,
    low: Quotation,
    close: Quotation,
    volume: Int64Repr,
    time: DateTime<Utc>,
}

impl HistoricCandle {
    fn into_candle(self) -> Result<Candle, ApiError> {
        Ok(Candle {
            timestamp: self.time,
            open: self.open.to_f64()?,
            high: self.high.to_f64()?,
            low: self.low.to_f64()?,
            close: self.close.to_f64()?,
            volume: self.volume.value()? as f64,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharesRequest {
    instrument_status: &'static str,
}

#[derive(Debug, Deserialize)]
struct SharesResponse {
    #[serde(default)]
    instruments: Vec<Share>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Share {
    figi: String,
    ticker: String,
    #[serde(default)]
    class_code: String,
}

impl TinkoffClient {
    /// Create a client pacing requests to one per `request_interval`
    pub fn new(
        token: impl Into<String>,
        base_url: impl Into<String>,
        request_interval: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::with_period(request_interval)
            .context("Request interval must be greater than zero")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Make a paced gateway call with retry logic
    async fn call<B, R>(&self, service: &str, method: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, service, method);
        let mut attempt = 1;

        loop {
            self.rate_limiter.until_ready().await;

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(body)
                .send()
                .await;

            let backoff = std::time::Duration::from_secs(2u64.pow(attempt));
            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response.text().await?;
                        return serde_json::from_str(&text).map_err(|e| ApiError::Decode {
                            service: SERVICE,
                            reason: e.to_string(),
                        });
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < MAX_RETRIES {
                        tracing::warn!(
                            "{} {} returned {}, retrying in {}s (attempt {}/{})",
                            SERVICE,
                            method,
                            status,
                            backoff.as_secs(),
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(ApiError::Status {
                        service: SERVICE,
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error calling {}: {}, retrying in {}s (attempt {}/{})",
                        method,
                        e,
                        backoff.as_secs(),
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(ApiError::Http(e)),
            }
        }
    }

    /// Resolve tickers to FIGIs, keeping the universe order
    ///
    /// Tickers listed on several boards resolve to the MOEX main board when
    /// available. Unknown tickers are logged and skipped.
    pub async fn resolve_instruments(&self, tickers: &[String]) -> Result<Vec<Instrument>, ApiError> {
        let response: SharesResponse = self
            .call(
                INSTRUMENTS_SERVICE,
                "Shares",
                &SharesRequest {
                    instrument_status: "INSTRUMENT_STATUS_BASE",
                },
            )
            .await?;

        Ok(select_instruments(tickers, &response.instruments))
    }

    /// Fetch candles for a FIGI between two instants
    pub async fn get_candles(
        &self,
        figi: &str,
        interval: CandleInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ApiError> {
        tracing::debug!("Fetching {} candles for {}", interval.wire_name(), figi);

        let response: GetCandlesResponse = self
            .call(
                MARKET_DATA_SERVICE,
                "GetCandles",
                &GetCandlesRequest {
                    figi,
                    from: from.to_rfc3339(),
                    to: to.to_rfc3339(),
                    interval: interval.wire_name(),
                },
            )
            .await?;

        let mut candles = response
            .candles
            .into_iter()
            .map(HistoricCandle::into_candle)
            .collect::<Result<Vec<_>, _>>()?;
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        Ok(candles)
    }
}

fn select_instruments(tickers: &[String], shares: &[Share]) -> Vec<Instrument> {
    let mut instruments = Vec::new();

    for ticker in tickers {
        let mut candidates = shares.iter().filter(|s| &s.ticker == ticker);
        let preferred = shares
            .iter()
            .find(|s| &s.ticker == ticker && s.class_code == PREFERRED_CLASS_CODE);

        match preferred.or_else(|| candidates.next()) {
            Some(share) => {
                tracing::info!("✓ {} → {}", ticker, share.figi);
                instruments.push(Instrument::new(ticker.clone(), share.figi.clone()));
            }
            None => {
                tracing::warn!("✗ {} not found among broker shares, skipping", ticker);
            }
        }
    }

    instruments
}

#[async_trait]
impl CandleSource for TinkoffClient {
    async fn fetch_candles(
        &self,
        instrument: &Instrument,
        interval: CandleInterval,
        lookback_days: i64,
    ) -> Result<Vec<Candle>, ApiError> {
        let to = Utc::now();
        let from = to - Duration::days(lookback_days);
        self.get_candles(&instrument.figi, interval, from, to).await
    }
}
