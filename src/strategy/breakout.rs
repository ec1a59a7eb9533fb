use super::StrategyConfig;
use crate::indicators::{calculate_ema_series, is_volume_surge};
use crate::models::{closes, Candle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upward crossing of the close over its EMA with a volume surge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Breakout {
    pub index: usize, // Position in the analysed series
    pub timestamp: DateTime<Utc>,
    pub price: f64, // Close of the crossing candle
    pub ema: f64,
}

/// Find the earliest EMA breakout among the most recent candles
///
/// Scans the last `breakout_scan_depth` candles in chronological order. A
/// candle qualifies when the previous close was at or below its EMA, its own
/// close is above its EMA, and its volume beats the trailing average by the
/// surge multiplier. Returns `None` when the series is shorter than
/// `ema_period + 5` or nothing qualifies.
pub fn detect_breakout(candles: &[Candle], config: &StrategyConfig) -> Option<Breakout> {
    if candles.len() < config.min_candles_required() {
        return None;
    }

    let ema = calculate_ema_series(&closes(candles), config.ema_period);
    let start = candles.len().saturating_sub(config.breakout_scan_depth).max(1);

    (start..candles.len())
        .find(|&i| {
            candles[i - 1].close <= ema[i - 1]
                && candles[i].close > ema[i]
                && is_volume_surge(
                    candles,
                    i,
                    config.volume_lookback,
                    config.volume_surge_multiplier,
                )
        })
        .map(|i| Breakout {
            index: i,
            timestamp: candles[i].timestamp,
            price: candles[i].close,
            ema: ema[i],
        })
}
