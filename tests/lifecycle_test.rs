use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use retestbot::api::{ApiError, CandleSource, MessageSink};
use retestbot::config::ScannerConfig;
use retestbot::notify::{Broadcaster, SubscriberSet};
use retestbot::scanner::Scanner;
use retestbot::strategy::StrategyConfig;
use retestbot::tracker::{LifecycleState, LifecycleTracker};
use retestbot::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// In-memory market: one series per (ticker, interval)
#[derive(Default)]
struct FakeMarket {
    series: Mutex<HashMap<(String, CandleInterval), Vec<Candle>>>,
}

impl FakeMarket {
    fn set(&self, ticker: &str, interval: CandleInterval, candles: Vec<Candle>) {
        self.series
            .lock()
            .unwrap()
            .insert((ticker.to_string(), interval), candles);
    }
}

#[async_trait]
impl CandleSource for FakeMarket {
    async fn fetch_candles(
        &self,
        instrument: &Instrument,
        interval: CandleInterval,
        _lookback_days: i64,
    ) -> std::result::Result<Vec<Candle>, ApiError> {
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(&(instrument.ticker.clone(), interval))
            .cloned()
            .unwrap_or_default())
    }
}

/// Records deliveries; chats in `blocked` always fail
#[derive(Default)]
struct FakeChat {
    sent: Mutex<Vec<(RecipientId, String)>>,
    blocked: Vec<RecipientId>,
}

#[async_trait]
impl MessageSink for FakeChat {
    async fn send_message(&self, recipient: RecipientId, text: &str) -> std::result::Result<(), ApiError> {
        if self.blocked.contains(&recipient) {
            return Err(ApiError::Rejected {
                service: "fake",
                reason: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
}

fn candle(timestamp: DateTime<Utc>, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp,
        open: close,
        high,
        low,
        close,
        volume,
    }
}

/// Flat market, a dip, a breakout on double volume, a rally to 104 and a
/// pullback to the average
fn hourly_breakout_and_retest() -> Vec<Candle> {
    let hour = |i: i64| start() + Duration::hours(i);
    let retest = [
        (101.0, 99.5, 100.5),
        (102.0, 100.0, 101.5),
        (104.0, 101.0, 103.0),
        (103.0, 101.8, 101.5),
        (102.0, 101.4, 101.0),
        (101.5, 101.0, 100.8),
        (102.0, 101.5, 101.5),
        (102.5, 102.0, 102.0),
    ];

    let mut candles: Vec<Candle> = (0..40)
        .map(|i| candle(hour(i), 100.2, 99.8, 100.0, 1000.0))
        .collect();
    candles.push(candle(hour(40), 100.0, 99.6, 99.8, 1000.0));
    candles.push(candle(hour(41), 100.5, 99.9, 100.4, 2000.0));
    for (i, (high, low, close)) in retest.into_iter().enumerate() {
        candles.push(candle(hour(42 + i as i64), high, low, close, 1000.0));
    }
    candles
}

fn minute(now: DateTime<Utc>, high: f64, close: f64) -> Vec<Candle> {
    vec![
        candle(now - Duration::minutes(2), 102.0, 101.5, 101.8, 300.0),
        candle(now - Duration::minutes(1), high, close.min(high), close, 500.0),
    ]
}

#[tokio::test]
async fn test_full_signal_lifecycle() {
    let _ = tracing_subscriber::fmt::try_init();

    println!("=== Starting Lifecycle Test ===\n");

    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat {
        blocked: vec![200],
        ..FakeChat::default()
    });
    let subscribers = Arc::new(RwLock::new(SubscriberSet::new([100, 200])));
    let tracker = Arc::new(RwLock::new(LifecycleTracker::default()));
    let scanner = Scanner::new(
        market.clone(),
        tracker.clone(),
        Broadcaster::new(chat.clone(), subscribers.clone()),
        vec![
            Instrument::new("GAZP", "BBG004730RP0"),
            Instrument::new("SBER", "BBG004730N88"),
        ],
        ScannerConfig::default(),
        StrategyConfig::default(),
    );

    let hourly = hourly_breakout_and_retest();
    let t0 = hourly[hourly.len() - 1].timestamp + Duration::minutes(5);

    // 1. SBER completes breakout and retest, GAZP only broke out so far
    println!("1. Scanning...");
    market.set("SBER", CandleInterval::Hour, hourly.clone());
    market.set("GAZP", CandleInterval::Hour, hourly[..45].to_vec());
    market.set("SBER", CandleInterval::OneMinute, minute(t0, 103.0, 102.5));

    let summary = tokio_test::assert_ok!(scanner.run_cycle_at(t0).await);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.monitored, 1);
    assert_eq!(summary.events, 3); // two breakouts and one signal

    {
        let tracker = tracker.read().await;
        assert_eq!(tracker.state_of("SBER"), LifecycleState::Signaled);
        assert_eq!(tracker.state_of("GAZP"), LifecycleState::Watching);
        let signal = tracker.signal("SBER").unwrap();
        assert!((signal.entry_price - 104.104).abs() < 1e-9);
        println!(
            "   ✓ SBER signal: entry {:.3}, stop {:.3}",
            signal.entry_price, signal.stop_loss
        );
    }

    // Blocked chat dropped after its first failed delivery
    assert_eq!(subscribers.read().await.recipients(), vec![100]);
    let sent = chat.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("NEW SIGNAL"));
    assert!(sent[0].1.contains("SBER"));

    // 2. Price trades through entry
    println!("\n2. Monitoring trigger...");
    let t1 = t0 + Duration::hours(1);
    market.set("SBER", CandleInterval::OneMinute, minute(t1, 104.2, 104.15));
    tokio_test::assert_ok!(scanner.run_cycle_at(t1).await);
    assert_eq!(tracker.read().await.state_of("SBER"), LifecycleState::Triggered);

    // 3. First take-profit
    println!("\n3. Monitoring TP1...");
    let t2 = t0 + Duration::hours(2);
    market.set("SBER", CandleInterval::OneMinute, minute(t2, 107.6, 107.5));
    tokio_test::assert_ok!(scanner.run_cycle_at(t2).await);
    assert_eq!(tracker.read().await.state_of("SBER"), LifecycleState::Tp1Done);

    // 4. Reversal through the stop closes the signal
    println!("\n4. Monitoring stop...");
    let t3 = t0 + Duration::hours(3);
    market.set("SBER", CandleInterval::OneMinute, minute(t3, 101.0, 100.5));
    market.set("SBER", CandleInterval::Hour, Vec::new());
    tokio_test::assert_ok!(scanner.run_cycle_at(t3).await);
    assert_eq!(tracker.read().await.state_of("SBER"), LifecycleState::Idle);

    // 5. GAZP never retested; its watch expires silently
    println!("\n5. Sweeping expired watches...");
    let t4 = t0 + Duration::hours(49);
    let summary = tokio_test::assert_ok!(scanner.run_cycle_at(t4).await);
    assert_eq!(summary.messages_sent, 0);
    assert_eq!(tracker.read().await.state_of("GAZP"), LifecycleState::Idle);

    let texts: Vec<String> = chat
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|(_, text)| text.clone())
        .collect();
    assert_eq!(texts.len(), 4);
    assert!(texts[1].contains("SIGNAL TRIGGERED"));
    assert!(texts[2].contains("TP1 REACHED"));
    assert!(texts[3].contains("STOP LOSS HIT"));

    println!("\n=== Lifecycle Test Complete ===");
}

#[tokio::test]
async fn test_untriggered_signal_expires_regardless_of_price() {
    let market = Arc::new(FakeMarket::default());
    let chat = Arc::new(FakeChat::default());
    let tracker = Arc::new(RwLock::new(LifecycleTracker::default()));
    let scanner = Scanner::new(
        market.clone(),
        tracker.clone(),
        Broadcaster::new(chat.clone(), Arc::new(RwLock::new(SubscriberSet::new([1])))),
        vec![Instrument::new("SBER", "BBG004730N88")],
        ScannerConfig::default(),
        StrategyConfig::default(),
    );

    let hourly = hourly_breakout_and_retest();
    let t0 = hourly[hourly.len() - 1].timestamp;
    market.set("SBER", CandleInterval::Hour, hourly);
    tokio_test::assert_ok!(scanner.run_cycle_at(t0).await);
    assert_eq!(tracker.read().await.state_of("SBER"), LifecycleState::Signaled);

    // Below the stop but never triggered: only expiry removes it
    let later = t0 + Duration::hours(48) + Duration::seconds(1);
    market.set("SBER", CandleInterval::Hour, Vec::new());
    market.set("SBER", CandleInterval::OneMinute, minute(later, 96.0, 95.0));
    tokio_test::assert_ok!(scanner.run_cycle_at(later).await);

    assert_eq!(tracker.read().await.state_of("SBER"), LifecycleState::Idle);
    let sent = chat.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].1.contains("SIGNAL EXPIRED"));
}
