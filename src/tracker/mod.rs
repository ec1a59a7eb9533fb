// Lifecycle tracking of watched breakouts and active signals
pub mod signal;

pub use signal::{Signal, SignalStage, TakeProfitLevel};

use crate::models::Candle;
use crate::strategy::{Breakout, SetupAnchors, SignalLevels};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A breakout waiting for its retest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakoutWatch {
    pub symbol: String,
    pub detected_at: DateTime<Utc>,
    pub breakout: Breakout,
    pub local_high: Option<f64>,
    pub local_low: Option<f64>,
}

impl BreakoutWatch {
    /// Position of the breakout candle in a freshly fetched series
    ///
    /// The scan window slides between cycles, so the recorded index is only
    /// valid for the series it was detected in. Returns `None` once the
    /// breakout candle has scrolled out of the window.
    pub fn locate_in(&self, candles: &[Candle]) -> Option<usize> {
        candles
            .iter()
            .position(|c| c.timestamp == self.breakout.timestamp)
    }

    pub fn is_expired(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        now - self.detected_at > expiry
    }
}

/// Coarse per-instrument state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Watching,
    Signaled,
    Triggered,
    Tp1Done,
    Tp2Done,
}

/// A transition reported by the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    BreakoutDetected { symbol: String, breakout: Breakout },
    WatchExpired { watch: BreakoutWatch },
    SignalIssued { signal: Signal },
    Triggered { signal: Signal, price: f64 },
    TakeProfitHit { signal: Signal, level: TakeProfitLevel, price: f64 },
    StoppedOut { signal: Signal, price: f64 },
    SignalExpired { signal: Signal },
}

impl LifecycleEvent {
    pub fn symbol(&self) -> &str {
        match self {
            LifecycleEvent::BreakoutDetected { symbol, .. } => symbol,
            LifecycleEvent::WatchExpired { watch } => &watch.symbol,
            LifecycleEvent::SignalIssued { signal }
            | LifecycleEvent::Triggered { signal, .. }
            | LifecycleEvent::TakeProfitHit { signal, .. }
            | LifecycleEvent::StoppedOut { signal, .. }
            | LifecycleEvent::SignalExpired { signal } => &signal.symbol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("{0} already has a breakout under watch")]
    AlreadyWatching(String),
    #[error("{0} already has an active signal")]
    AlreadySignaled(String),
    #[error("{0} has no breakout under watch")]
    NotWatching(String),
    #[error("{0} has no active signal")]
    NoSignal(String),
    #[error("{0} breakout watch has expired")]
    WatchExpired(String),
}

/// Owns breakout watches and active signals, one of either per instrument
pub struct LifecycleTracker {
    watches: BTreeMap<String, BreakoutWatch>,
    signals: BTreeMap<String, Signal>,
    expiry: Duration,
}

impl LifecycleTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            watches: BTreeMap::new(),
            signals: BTreeMap::new(),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Start watching a fresh breakout (IDLE -> WATCHING)
    pub fn record_breakout(
        &mut self,
        symbol: &str,
        breakout: Breakout,
        now: DateTime<Utc>,
    ) -> Result<LifecycleEvent, TrackerError> {
        if self.signals.contains_key(symbol) {
            return Err(TrackerError::AlreadySignaled(symbol.to_string()));
        }
        if self.watches.contains_key(symbol) {
            return Err(TrackerError::AlreadyWatching(symbol.to_string()));
        }

        self.watches.insert(
            symbol.to_string(),
            BreakoutWatch {
                symbol: symbol.to_string(),
                detected_at: now,
                breakout: breakout.clone(),
                local_high: None,
                local_low: None,
            },
        );

        Ok(LifecycleEvent::BreakoutDetected {
            symbol: symbol.to_string(),
            breakout,
        })
    }

    /// Record anchors found so far for a watched breakout
    ///
    /// Anchors are only ever added, a `None` keeps the previous value.
    pub fn note_setup_progress(
        &mut self,
        symbol: &str,
        local_high: Option<f64>,
        local_low: Option<f64>,
    ) -> Result<(), TrackerError> {
        let watch = self
            .watches
            .get_mut(symbol)
            .ok_or_else(|| TrackerError::NotWatching(symbol.to_string()))?;

        if local_high.is_some() {
            watch.local_high = local_high;
        }
        if local_low.is_some() {
            watch.local_low = local_low;
        }
        Ok(())
    }

    /// Turn a watched breakout into an active signal (WATCHING -> SIGNALED)
    pub fn promote_to_signal(
        &mut self,
        symbol: &str,
        levels: SignalLevels,
        anchors: SetupAnchors,
        now: DateTime<Utc>,
    ) -> Result<LifecycleEvent, TrackerError> {
        if self.signals.contains_key(symbol) {
            return Err(TrackerError::AlreadySignaled(symbol.to_string()));
        }
        let watch = self
            .watches
            .get(symbol)
            .ok_or_else(|| TrackerError::NotWatching(symbol.to_string()))?;
        // Left in place for the sweep to report
        if watch.is_expired(now, self.expiry) {
            return Err(TrackerError::WatchExpired(symbol.to_string()));
        }
        self.watches.remove(symbol);

        let signal = Signal::new(symbol, levels, &anchors, now);
        self.signals.insert(symbol.to_string(), signal.clone());

        Ok(LifecycleEvent::SignalIssued { signal })
    }

    /// Evaluate one monitoring candle against an active signal
    ///
    /// Expiry is checked before price. Terminal transitions (TP3, stop-loss,
    /// expiry) remove the signal.
    pub fn advance(
        &mut self,
        symbol: &str,
        candle: &Candle,
        now: DateTime<Utc>,
    ) -> Result<Vec<LifecycleEvent>, TrackerError> {
        let signal = self
            .signals
            .get_mut(symbol)
            .ok_or_else(|| TrackerError::NoSignal(symbol.to_string()))?;

        if signal.is_expired(now, self.expiry) {
            let signal = self
                .signals
                .remove(symbol)
                .ok_or_else(|| TrackerError::NoSignal(symbol.to_string()))?;
            return Ok(vec![LifecycleEvent::SignalExpired { signal }]);
        }

        let (events, closed) = signal.evaluate(candle, now);
        if closed {
            self.signals.remove(symbol);
        }

        Ok(events)
    }

    /// Drop watches and signals older than the expiry window
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<LifecycleEvent> {
        let expiry = self.expiry;
        let mut events = Vec::new();

        let stale_watches: Vec<String> = self
            .watches
            .values()
            .filter(|w| w.is_expired(now, expiry))
            .map(|w| w.symbol.clone())
            .collect();
        for symbol in stale_watches {
            if let Some(watch) = self.watches.remove(&symbol) {
                events.push(LifecycleEvent::WatchExpired { watch });
            }
        }

        let stale_signals: Vec<String> = self
            .signals
            .values()
            .filter(|s| s.is_expired(now, expiry))
            .map(|s| s.symbol.clone())
            .collect();
        for symbol in stale_signals {
            if let Some(signal) = self.signals.remove(&symbol) {
                events.push(LifecycleEvent::SignalExpired { signal });
            }
        }

        events
    }

    pub fn watch(&self, symbol: &str) -> Option<&BreakoutWatch> {
        self.watches.get(symbol)
    }

    pub fn signal(&self, symbol: &str) -> Option<&Signal> {
        self.signals.get(symbol)
    }

    /// All watches ordered by symbol
    pub fn watches(&self) -> Vec<&BreakoutWatch> {
        self.watches.values().collect()
    }

    /// All active signals ordered by symbol
    pub fn signals(&self) -> Vec<&Signal> {
        self.signals.values().collect()
    }

    pub fn state_of(&self, symbol: &str) -> LifecycleState {
        if let Some(signal) = self.signals.get(symbol) {
            return match signal.stage {
                SignalStage::Pending => LifecycleState::Signaled,
                SignalStage::Triggered => LifecycleState::Triggered,
                SignalStage::Tp1Reached => LifecycleState::Tp1Done,
                SignalStage::Tp2Reached => LifecycleState::Tp2Done,
            };
        }
        if self.watches.contains_key(symbol) {
            LifecycleState::Watching
        } else {
            LifecycleState::Idle
        }
    }

}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new(Duration::hours(48))
    }
}
