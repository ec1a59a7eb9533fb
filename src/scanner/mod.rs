pub mod analysis;

pub use analysis::evaluate_instrument;

use crate::api::CandleSource;
use crate::config::ScannerConfig;
use crate::models::{Candle, CandleInterval, Instrument};
use crate::notify::{format_error, format_event, Broadcaster};
use crate::strategy::StrategyConfig;
use crate::tracker::{LifecycleEvent, LifecycleTracker};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("market data unavailable for all {0} instruments")]
    SourceUnavailable(usize),
}

/// Counters for one scan/monitor/sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub scanned: usize,
    pub fetch_failures: usize,
    pub monitored: usize,
    pub events: usize,
    pub messages_sent: usize,
}

/// Drives the per-cycle pipeline over the instrument universe
pub struct Scanner {
    source: Arc<dyn CandleSource>,
    tracker: Arc<RwLock<LifecycleTracker>>,
    broadcaster: Broadcaster,
    instruments: Vec<Instrument>,
    config: ScannerConfig,
    strategy: StrategyConfig,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn CandleSource>,
        tracker: Arc<RwLock<LifecycleTracker>>,
        broadcaster: Broadcaster,
        instruments: Vec<Instrument>,
        config: ScannerConfig,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            source,
            tracker,
            broadcaster,
            instruments,
            config,
            strategy,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary, ScanError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Scan for setups, monitor active signals, then sweep expired entries
    ///
    /// A failing instrument is logged and skipped. When no instrument could be
    /// fetched at all, monitoring and the expiry sweep still run before the
    /// cycle reports the failure.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleSummary, ScanError> {
        let mut summary = CycleSummary::default();
        let mut events = Vec::new();

        for instrument in &self.instruments {
            if self.tracker.read().await.signal(&instrument.ticker).is_some() {
                continue;
            }

            let Some(candles) = self
                .fetch(instrument, CandleInterval::Hour, self.config.scan_lookback_days)
                .await
            else {
                summary.fetch_failures += 1;
                continue;
            };
            summary.scanned += 1;

            if candles.is_empty() {
                tracing::debug!(symbol = %instrument.ticker, "No hourly candles");
                continue;
            }

            let mut tracker = self.tracker.write().await;
            events.extend(evaluate_instrument(
                &mut tracker,
                &instrument.ticker,
                &candles,
                now,
                &self.strategy,
            ));
        }

        let source_unavailable = summary.scanned == 0 && summary.fetch_failures > 0;

        let active: Vec<String> = self
            .tracker
            .read()
            .await
            .signals()
            .iter()
            .map(|s| s.symbol.clone())
            .collect();

        for symbol in active {
            let Some(instrument) = self.instruments.iter().find(|i| i.ticker == symbol) else {
                continue;
            };
            let Some(candles) = self
                .fetch(instrument, CandleInterval::OneMinute, self.config.monitor_lookback_days)
                .await
            else {
                continue;
            };
            let Some(last) = candles.last() else {
                tracing::debug!(symbol = %symbol, "No minute candles");
                continue;
            };
            summary.monitored += 1;

            match self.tracker.write().await.advance(&symbol, last, now) {
                Ok(transitions) => events.extend(transitions),
                Err(e) => tracing::debug!(symbol = %symbol, "{}", e),
            }
        }

        events.extend(self.tracker.write().await.expire(now));

        summary.events = events.len();
        for event in &events {
            log_event(event);
            if let Some(text) = format_event(event) {
                summary.messages_sent += self.broadcaster.broadcast(&text).await;
            }
        }

        if source_unavailable {
            return Err(ScanError::SourceUnavailable(summary.fetch_failures));
        }
        Ok(summary)
    }

    async fn fetch(
        &self,
        instrument: &Instrument,
        interval: CandleInterval,
        lookback_days: i64,
    ) -> Option<Vec<Candle>> {
        match self
            .source
            .fetch_candles(instrument, interval, lookback_days)
            .await
        {
            Ok(candles) => Some(candles),
            Err(e) => {
                tracing::warn!(symbol = %instrument.ticker, "⚠️  Failed to fetch candles: {}", e);
                None
            }
        }
    }

    /// Run cycles on a fixed cadence inside the trading window, forever
    pub async fn run(self) {
        tracing::info!(
            "🔄 Scanner starting: {} instruments, every {}s",
            self.instruments.len(),
            self.config.scan_interval_secs
        );

        let mut ticker = interval(Duration::from_secs(self.config.scan_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now();

            if !self.config.trading_hours.contains(now) {
                tracing::info!("😴 Market closed at {} UTC, waiting", now.format("%H:%M"));
                continue;
            }

            tracing::info!("🔍 [SCAN] Tick at {}", now.format("%H:%M:%S"));
            match self.run_cycle_at(now).await {
                Ok(summary) => tracing::info!(
                    "✅ Cycle done: {} scanned, {} failed, {} monitored, {} events, {} messages",
                    summary.scanned,
                    summary.fetch_failures,
                    summary.monitored,
                    summary.events,
                    summary.messages_sent
                ),
                Err(e) => {
                    tracing::error!("❌ Cycle failed: {}", e);
                    self.broadcaster.broadcast(&format_error(&e.to_string())).await;
                }
            }
        }
    }
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::BreakoutDetected { symbol, breakout } => tracing::info!(
            symbol = %symbol,
            "📈 Breakout at {:.2} over EMA {:.2}",
            breakout.price,
            breakout.ema
        ),
        LifecycleEvent::WatchExpired { watch } => {
            tracing::info!(symbol = %watch.symbol, "⌛ Breakout watch expired without retest")
        }
        LifecycleEvent::SignalIssued { signal } => tracing::info!(
            symbol = %signal.symbol,
            "🚀 New signal: entry {:.2}, SL {:.2}, TP3 {:.2}",
            signal.entry_price,
            signal.stop_loss,
            signal.take_profit_3
        ),
        LifecycleEvent::Triggered { signal, price } => {
            tracing::info!(symbol = %signal.symbol, "🔥 Triggered at {:.2}", price)
        }
        LifecycleEvent::TakeProfitHit {
            signal,
            level,
            price,
        } => tracing::info!(symbol = %signal.symbol, "🎯 {} hit at {:.2}", level.label(), price),
        LifecycleEvent::StoppedOut { signal, price } => {
            tracing::info!(symbol = %signal.symbol, "🛑 Stopped out at {:.2}", price)
        }
        LifecycleEvent::SignalExpired { signal } => {
            tracing::info!(symbol = %signal.symbol, "⌛ Signal expired")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::notify::testing::RecordingSink;
    use crate::notify::SubscriberSet;
    use crate::strategy::{calculate_levels, Breakout, SetupAnchors};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned series per (ticker, interval); unknown tickers fail
    #[derive(Default)]
    struct StubSource {
        series: Mutex<HashMap<(String, CandleInterval), Vec<Candle>>>,
    }

    impl StubSource {
        fn set(&self, ticker: &str, interval: CandleInterval, candles: Vec<Candle>) {
            self.series
                .lock()
                .unwrap()
                .insert((ticker.to_string(), interval), candles);
        }
    }

    #[async_trait]
    impl CandleSource for StubSource {
        async fn fetch_candles(
            &self,
            instrument: &Instrument,
            interval: CandleInterval,
            _lookback_days: i64,
        ) -> Result<Vec<Candle>, ApiError> {
            self.series
                .lock()
                .unwrap()
                .get(&(instrument.ticker.clone(), interval))
                .cloned()
                .ok_or_else(|| ApiError::Rejected {
                    service: "stub",
                    reason: "unknown instrument".to_string(),
                })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    fn flat(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: t0() - ChronoDuration::hours((n - i) as i64),
                open: 100.0,
                high: 100.2,
                low: 99.8,
                close: 100.0,
                volume: 1000.0,
            })
            .collect()
    }

    fn scanner(source: Arc<StubSource>, sink: Arc<RecordingSink>, tickers: &[&str]) -> Scanner {
        let subscribers = Arc::new(RwLock::new(SubscriberSet::new([7])));
        Scanner::new(
            source,
            Arc::new(RwLock::new(LifecycleTracker::default())),
            Broadcaster::new(sink, subscribers),
            tickers
                .iter()
                .map(|t| Instrument::new(*t, format!("FIGI-{}", t)))
                .collect(),
            ScannerConfig::default(),
            StrategyConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_failing_instrument_is_isolated() {
        let source = Arc::new(StubSource::default());
        source.set("SBER", CandleInterval::Hour, flat(60));
        let sink = Arc::new(RecordingSink::default());
        let scanner = scanner(source, sink.clone(), &["GAZP", "SBER"]);

        let summary = scanner.run_cycle_at(t0()).await.unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.events, 0);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_all_fetches_failing_is_an_error() {
        let source = Arc::new(StubSource::default());
        let scanner = scanner(source, Arc::new(RecordingSink::default()), &["GAZP", "SBER"]);

        let result = scanner.run_cycle_at(t0()).await;

        assert!(matches!(result, Err(ScanError::SourceUnavailable(2))));
    }

    #[tokio::test]
    async fn test_signals_still_monitored_when_scan_fetches_fail() {
        let source = Arc::new(StubSource::default());
        source.set("SBER", CandleInterval::OneMinute, flat(3));
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(RwLock::new(LifecycleTracker::default()));
        {
            let issued = t0() - ChronoDuration::hours(60);
            let anchors = SetupAnchors {
                local_high: 110.0,
                local_low: 104.0,
                ema_at_low: 105.0,
                current_price: 108.0,
            };
            let levels = calculate_levels(&anchors, &StrategyConfig::default()).unwrap();
            let breakout = Breakout {
                index: 45,
                timestamp: issued - ChronoDuration::hours(6),
                price: 101.0,
                ema: 100.0,
            };
            let mut tracker = tracker.write().await;
            tracker.record_breakout("SBER", breakout, issued).unwrap();
            tracker.promote_to_signal("SBER", levels, anchors, issued).unwrap();
        }
        let scanner = Scanner::new(
            source,
            tracker.clone(),
            Broadcaster::new(sink.clone(), Arc::new(RwLock::new(SubscriberSet::new([7])))),
            vec![
                Instrument::new("GAZP", "FIGI-GAZP"),
                Instrument::new("SBER", "FIGI-SBER"),
            ],
            ScannerConfig::default(),
            StrategyConfig::default(),
        );

        // GAZP hourly fetch fails, SBER is skipped by the scan as it holds a signal
        let result = scanner.run_cycle_at(t0()).await;

        assert!(matches!(result, Err(ScanError::SourceUnavailable(1))));
        assert!(tracker.read().await.signal("SBER").is_none());
        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("SIGNAL EXPIRED"));
    }

    #[tokio::test]
    async fn test_empty_series_is_not_a_failure() {
        let source = Arc::new(StubSource::default());
        source.set("SBER", CandleInterval::Hour, Vec::new());
        let scanner = scanner(source, Arc::new(RecordingSink::default()), &["SBER"]);

        let summary = scanner.run_cycle_at(t0()).await.unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.fetch_failures, 0);
    }
}
