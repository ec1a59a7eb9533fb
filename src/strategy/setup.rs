use super::StrategyConfig;
use crate::indicators::{calculate_ema_series, find_local_extremes};
use crate::models::{closes, Candle};
use serde::{Deserialize, Serialize};

/// Price anchors of a completed breakout-and-retest setup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SetupAnchors {
    pub local_high: f64,
    pub local_low: f64,
    pub ema_at_low: f64,
    pub current_price: f64, // Latest close of the analysed series
}

/// Why a watched breakout has not produced a setup yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    InsufficientCandles,
    NoQualifyingHigh,
    NoRetest,
    RetestBrokeAverage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupStatus {
    Ready(SetupAnchors),
    /// Keep watching; carries whatever anchors were found so far
    Waiting {
        reason: WaitReason,
        local_high: Option<f64>,
        local_low: Option<f64>,
    },
}

impl SetupStatus {
    fn waiting(reason: WaitReason, local_high: Option<f64>, local_low: Option<f64>) -> Self {
        SetupStatus::Waiting {
            reason,
            local_high,
            local_low,
        }
    }
}

/// Validate the retest that follows a recorded breakout
///
/// Works on the candles strictly after `breakout_index`:
/// 1. the first local high above `breakout_price * high_clearance`,
/// 2. then the first later local low within `retest_tolerance` of the EMA
///    (recomputed over the post-breakout closes),
/// 3. that low must not sit below `ema * retest_floor`.
///
/// Every failure is a `Waiting` outcome, never an error, so the caller keeps
/// the breakout under watch.
pub fn validate_setup(
    candles: &[Candle],
    breakout_index: usize,
    breakout_price: f64,
    config: &StrategyConfig,
) -> SetupStatus {
    let post = match candles.get(breakout_index + 1..) {
        Some(post) if post.len() >= config.min_post_breakout_candles => post,
        _ => return SetupStatus::waiting(WaitReason::InsufficientCandles, None, None),
    };

    let ema = calculate_ema_series(&closes(post), config.ema_period);
    let extremes = find_local_extremes(post, config.extremum_window);

    let high_threshold = breakout_price * config.high_clearance;
    let Some(high) = extremes.highs.iter().find(|h| h.value > high_threshold) else {
        return SetupStatus::waiting(WaitReason::NoQualifyingHigh, None, None);
    };

    let retest = extremes.lows.iter().find(|low| {
        let ema_at_low = ema[low.index];
        low.index > high.index
            && ema_at_low > 0.0
            && (low.value - ema_at_low).abs() / ema_at_low <= config.retest_tolerance
    });
    let Some(low) = retest else {
        return SetupStatus::waiting(WaitReason::NoRetest, Some(high.value), None);
    };

    let ema_at_low = ema[low.index];
    if low.value < ema_at_low * config.retest_floor {
        return SetupStatus::waiting(
            WaitReason::RetestBrokeAverage,
            Some(high.value),
            Some(low.value),
        );
    }

    // Non-empty: post holds at least min_post_breakout_candles
    let current_price = post.last().map(|c| c.close).unwrap_or(low.value);

    SetupStatus::Ready(SetupAnchors {
        local_high: high.value,
        local_low: low.value,
        ema_at_low,
        current_price,
    })
}
