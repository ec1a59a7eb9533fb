use super::{SetupAnchors, StrategyConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entry, stop and take-profit ladder derived from a setup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SignalLevels {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    pub risk_reward_1: f64,
    pub risk_reward_2: f64,
    pub risk_reward_3: f64,
}

impl SignalLevels {
    pub fn risk_distance(&self) -> f64 {
        self.entry_price - self.stop_loss
    }

    /// Risk as a fraction of the entry price
    pub fn risk_fraction(&self) -> f64 {
        self.risk_distance() / self.entry_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LevelError {
    #[error("stop {stop_loss:.4} is not below entry {entry_price:.4}")]
    NonPositiveRisk { entry_price: f64, stop_loss: f64 },
    #[error("price {current_price:.4} already at or above entry {entry_price:.4}")]
    EntryAlreadyCrossed { entry_price: f64, current_price: f64 },
    #[error("risk {risk_pct:.2}% exceeds the {max_pct:.2}% cap")]
    RiskTooWide { risk_pct: f64, max_pct: f64 },
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive trade levels from validated anchors
///
/// Entry sits just above the local high. The stop is the tighter of a buffer
/// under the retest low and a buffer under the EMA at that low. Take-profits
/// are placed at 1R, 2R and 3R from entry.
pub fn calculate_levels(
    anchors: &SetupAnchors,
    config: &StrategyConfig,
) -> Result<SignalLevels, LevelError> {
    let entry_price = anchors.local_high * config.entry_buffer;
    let stop_loss = (anchors.local_low * config.swing_stop_buffer)
        .max(anchors.ema_at_low * config.ema_stop_buffer);

    let risk_distance = entry_price - stop_loss;
    if !(risk_distance > 0.0) || !risk_distance.is_finite() {
        return Err(LevelError::NonPositiveRisk {
            entry_price,
            stop_loss,
        });
    }

    let take_profit_1 = entry_price + risk_distance;
    let take_profit_2 = entry_price + risk_distance * 2.0;
    let take_profit_3 = entry_price + risk_distance * 3.0;

    Ok(SignalLevels {
        entry_price,
        stop_loss,
        take_profit_1,
        take_profit_2,
        take_profit_3,
        risk_reward_1: round2((take_profit_1 - entry_price) / risk_distance),
        risk_reward_2: round2((take_profit_2 - entry_price) / risk_distance),
        risk_reward_3: round2((take_profit_3 - entry_price) / risk_distance),
    })
}

/// Derive levels and check they are still actionable at the current price
///
/// A signal is only worth emitting while the market has not traded through
/// the planned entry.
pub fn accept_levels(
    anchors: &SetupAnchors,
    config: &StrategyConfig,
) -> Result<SignalLevels, LevelError> {
    let levels = calculate_levels(anchors, config)?;

    if levels.entry_price <= anchors.current_price {
        return Err(LevelError::EntryAlreadyCrossed {
            entry_price: levels.entry_price,
            current_price: anchors.current_price,
        });
    }

    if let Some(max_fraction) = config.max_risk_fraction {
        if levels.risk_fraction() > max_fraction {
            return Err(LevelError::RiskTooWide {
                risk_pct: levels.risk_fraction() * 100.0,
                max_pct: max_fraction * 100.0,
            });
        }
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchors(local_high: f64, local_low: f64, ema_at_low: f64, current_price: f64) -> SetupAnchors {
        SetupAnchors {
            local_high,
            local_low,
            ema_at_low,
            current_price,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_reference_levels() {
        let levels =
            calculate_levels(&anchors(110.0, 104.0, 105.0, 108.0), &StrategyConfig::default())
                .unwrap();

        assert_close(levels.entry_price, 110.11);
        // max(104 * 0.998, 105 * 0.995) = max(103.792, 104.475)
        assert_close(levels.stop_loss, 104.475);
        assert_close(levels.risk_distance(), 5.635);
        assert_close(levels.take_profit_1, 115.745);
        assert_close(levels.take_profit_2, 121.38);
        assert_close(levels.take_profit_3, 127.015);
        assert_eq!(
            (levels.risk_reward_1, levels.risk_reward_2, levels.risk_reward_3),
            (1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_swing_stop_wins_when_tighter() {
        let levels =
            calculate_levels(&anchors(110.0, 106.0, 105.0, 108.0), &StrategyConfig::default())
                .unwrap();

        assert_close(levels.stop_loss, 106.0 * 0.998);
    }

    #[test]
    fn test_level_invariants() {
        let config = StrategyConfig::default();
        let cases = [
            (110.0, 104.0, 105.0),
            (250.5, 240.1, 241.0),
            (1.02, 0.97, 0.99),
            (5400.0, 5200.0, 5300.0),
        ];

        for (high, low, ema) in cases {
            let levels = calculate_levels(&anchors(high, low, ema, 0.0), &config).unwrap();
            let risk = levels.entry_price - levels.stop_loss;

            assert!(levels.entry_price > levels.stop_loss);
            assert!(levels.take_profit_1 < levels.take_profit_2);
            assert!(levels.take_profit_2 < levels.take_profit_3);
            for (tp, rr) in [
                (levels.take_profit_1, levels.risk_reward_1),
                (levels.take_profit_2, levels.risk_reward_2),
                (levels.take_profit_3, levels.risk_reward_3),
            ] {
                assert!(((tp - levels.entry_price) / risk - rr).abs() < 0.01);
            }
        }
    }

    #[test]
    fn test_non_positive_risk_rejected() {
        // Retest low above the high: stop would sit over the entry
        let result = calculate_levels(&anchors(100.0, 101.0, 101.0, 99.0), &StrategyConfig::default());
        assert!(matches!(result, Err(LevelError::NonPositiveRisk { .. })));
    }

    #[test]
    fn test_entry_already_crossed() {
        let result = accept_levels(&anchors(110.0, 104.0, 105.0, 110.2), &StrategyConfig::default());
        assert!(matches!(result, Err(LevelError::EntryAlreadyCrossed { .. })));
    }

    #[test]
    fn test_accepts_when_price_below_entry() {
        let result = accept_levels(&anchors(110.0, 104.0, 105.0, 109.0), &StrategyConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_risk_cap_when_configured() {
        let config = StrategyConfig {
            max_risk_fraction: Some(0.03),
            ..StrategyConfig::default()
        };

        // Risk 5.635 / 110.11 is about 5.1%
        let result = accept_levels(&anchors(110.0, 104.0, 105.0, 109.0), &config);
        assert!(matches!(result, Err(LevelError::RiskTooWide { .. })));
    }
}
