use crate::models::Candle;
use crate::strategy::{accept_levels, detect_breakout, validate_setup, SetupStatus, StrategyConfig};
use crate::tracker::{LifecycleEvent, LifecycleTracker};
use chrono::{DateTime, Utc};

/// Analyse one instrument's hourly series and commit the outcome
///
/// Runs breakout detection when the instrument is idle, then validates the
/// retest of the watched breakout in the same pass. Instruments with an
/// active signal are left to the monitoring pass.
pub fn evaluate_instrument(
    tracker: &mut LifecycleTracker,
    symbol: &str,
    candles: &[Candle],
    now: DateTime<Utc>,
    config: &StrategyConfig,
) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();

    if tracker.signal(symbol).is_some() {
        return events;
    }

    if tracker.watch(symbol).is_none() {
        let Some(breakout) = detect_breakout(candles, config) else {
            return events;
        };
        match tracker.record_breakout(symbol, breakout, now) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::debug!(symbol, "Breakout not recorded: {}", e);
                return events;
            }
        }
    }

    let Some(watch) = tracker.watch(symbol) else {
        return events;
    };
    if watch.is_expired(now, tracker.expiry()) {
        tracing::debug!(symbol, "Breakout watch expired, leaving it to the sweep");
        return events;
    }
    let Some(breakout_index) = watch.locate_in(candles) else {
        tracing::debug!(symbol, "Breakout candle no longer in the scan window");
        return events;
    };
    let breakout_price = watch.breakout.price;

    match validate_setup(candles, breakout_index, breakout_price, config) {
        SetupStatus::Ready(anchors) => {
            if let Err(e) =
                tracker.note_setup_progress(symbol, Some(anchors.local_high), Some(anchors.local_low))
            {
                tracing::debug!(symbol, "{}", e);
            }

            match accept_levels(&anchors, config) {
                Ok(levels) => match tracker.promote_to_signal(symbol, levels, anchors, now) {
                    Ok(event) => events.push(event),
                    Err(e) => tracing::warn!(symbol, "Signal not issued: {}", e),
                },
                Err(e) => {
                    tracing::info!(symbol, "Setup found but levels rejected: {}", e);
                }
            }
        }
        SetupStatus::Waiting {
            reason,
            local_high,
            local_low,
        } => {
            tracing::debug!(symbol, ?reason, ?local_high, ?local_low, "Waiting for retest");
            if let Err(e) = tracker.note_setup_progress(symbol, local_high, local_low) {
                tracing::debug!(symbol, "{}", e);
            }
        }
    }

    events
}
