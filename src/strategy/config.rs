use serde::{Deserialize, Serialize};

/// Thresholds for breakout detection, retest validation and level placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub ema_period: usize,
    pub breakout_scan_depth: usize,   // How many trailing candles may hold the crossing
    pub volume_lookback: usize,       // Candles in the volume baseline
    pub volume_surge_multiplier: f64, // Multiple of baseline volume
    pub min_post_breakout_candles: usize,
    pub extremum_window: usize,
    pub high_clearance: f64,  // Local high must exceed breakout price by this factor
    pub retest_tolerance: f64, // Max |low - ema| / ema for a retest
    pub retest_floor: f64,    // Low below ema * floor breaks the retest
    pub entry_buffer: f64,
    pub swing_stop_buffer: f64, // Applied to the retest low
    pub ema_stop_buffer: f64,   // Applied to the EMA at the retest low
    pub expiry_hours: i64,      // Lifetime of watches and signals
    pub max_risk_fraction: Option<f64>, // Optional cap on risk / entry
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_period: 33,
            breakout_scan_depth: 10,
            volume_lookback: 10,
            volume_surge_multiplier: 1.2,
            min_post_breakout_candles: 5,
            extremum_window: 2,
            high_clearance: 1.003,   // +0.3%
            retest_tolerance: 0.02,  // within 2% of the EMA
            retest_floor: 0.995,     // no deeper than -0.5% under the EMA
            entry_buffer: 1.001,     // +0.1% above the local high
            swing_stop_buffer: 0.998,
            ema_stop_buffer: 0.995,
            expiry_hours: 48,
            max_risk_fraction: None,
        }
    }
}

impl StrategyConfig {
    /// Minimum hourly candles before a breakout can be evaluated
    ///
    /// # Example
    /// ```
    /// use retestbot::strategy::StrategyConfig;
    ///
    /// let config = StrategyConfig::default();
    /// assert_eq!(config.min_candles_required(), 38);
    /// ```
    pub fn min_candles_required(&self) -> usize {
        self.ema_period + 5
    }

    /// Lifetime of a watch or signal before it expires
    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.expiry_hours)
    }
}
