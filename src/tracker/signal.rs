use super::LifecycleEvent;
use crate::models::Candle;
use crate::strategy::{SetupAnchors, SignalLevels};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of an active signal, ordered so it can only move forward
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalStage {
    Pending, // Waiting for price to reach entry
    Triggered,
    Tp1Reached,
    Tp2Reached,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TakeProfitLevel {
    Tp1,
    Tp2,
    Tp3,
}

impl TakeProfitLevel {
    pub fn label(&self) -> &'static str {
        match self {
            TakeProfitLevel::Tp1 => "TP1",
            TakeProfitLevel::Tp2 => "TP2",
            TakeProfitLevel::Tp3 => "TP3",
        }
    }
}

/// Trade signal emitted from a completed breakout-and-retest setup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    pub risk_reward_1: f64,
    pub risk_reward_2: f64,
    pub risk_reward_3: f64,
    pub signal_time: DateTime<Utc>,
    pub local_high: f64,
    pub local_low: f64,
    pub ema_at_low: f64,
    pub stage: SignalStage,
    pub triggered_at: Option<DateTime<Utc>>,
    pub tp1_at: Option<DateTime<Utc>>,
    pub tp2_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn new(
        symbol: &str,
        levels: SignalLevels,
        anchors: &SetupAnchors,
        signal_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            entry_price: levels.entry_price,
            stop_loss: levels.stop_loss,
            take_profit_1: levels.take_profit_1,
            take_profit_2: levels.take_profit_2,
            take_profit_3: levels.take_profit_3,
            risk_reward_1: levels.risk_reward_1,
            risk_reward_2: levels.risk_reward_2,
            risk_reward_3: levels.risk_reward_3,
            signal_time,
            local_high: anchors.local_high,
            local_low: anchors.local_low,
            ema_at_low: anchors.ema_at_low,
            stage: SignalStage::Pending,
            triggered_at: None,
            tp1_at: None,
            tp2_at: None,
        }
    }

    pub fn risk_distance(&self) -> f64 {
        self.entry_price - self.stop_loss
    }

    pub fn take_profit(&self, level: TakeProfitLevel) -> f64 {
        match level {
            TakeProfitLevel::Tp1 => self.take_profit_1,
            TakeProfitLevel::Tp2 => self.take_profit_2,
            TakeProfitLevel::Tp3 => self.take_profit_3,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, expiry: Duration) -> bool {
        now - self.signal_time > expiry
    }

    pub fn is_triggered(&self) -> bool {
        self.stage >= SignalStage::Triggered
    }

    /// Apply one monitoring candle
    ///
    /// Entry triggers on the candle high; stop-loss and take-profits use the
    /// close. Several levels may fire on the same candle. Returns the events
    /// in order and whether the signal reached a terminal state.
    pub(super) fn evaluate(
        &mut self,
        candle: &Candle,
        now: DateTime<Utc>,
    ) -> (Vec<LifecycleEvent>, bool) {
        let mut events = Vec::new();

        if self.stage == SignalStage::Pending && candle.high >= self.entry_price {
            self.stage = SignalStage::Triggered;
            self.triggered_at = Some(now);
            events.push(LifecycleEvent::Triggered {
                signal: self.clone(),
                price: candle.close,
            });
        }

        if !self.is_triggered() {
            return (events, false);
        }

        if candle.close <= self.stop_loss {
            events.push(LifecycleEvent::StoppedOut {
                signal: self.clone(),
                price: candle.close,
            });
            return (events, true);
        }

        if self.stage < SignalStage::Tp1Reached && candle.close >= self.take_profit_1 {
            self.stage = SignalStage::Tp1Reached;
            self.tp1_at = Some(now);
            events.push(self.take_profit_event(TakeProfitLevel::Tp1, candle.close));
        }

        if self.stage < SignalStage::Tp2Reached && candle.close >= self.take_profit_2 {
            self.stage = SignalStage::Tp2Reached;
            self.tp2_at = Some(now);
            events.push(self.take_profit_event(TakeProfitLevel::Tp2, candle.close));
        }

        // TP3 closes the signal
        if candle.close >= self.take_profit_3 {
            events.push(self.take_profit_event(TakeProfitLevel::Tp3, candle.close));
            return (events, true);
        }

        (events, false)
    }

    fn take_profit_event(&self, level: TakeProfitLevel, price: f64) -> LifecycleEvent {
        LifecycleEvent::TakeProfitHit {
            signal: self.clone(),
            level,
            price,
        }
    }
}
