/// Volume analysis
///
/// Trailing volume averages and surge detection used to confirm breakouts

use super::moving_average::calculate_sma;
use crate::models::Candle;

/// Calculate average volume over a slice of candles
pub fn calculate_average_volume(candles: &[Candle]) -> Option<f64> {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    calculate_sma(&volumes, volumes.len())
}

/// Check if volume at `index` surged above the trailing average
///
/// Returns true if volume > multiplier * mean volume of the `lookback`
/// candles immediately before `index` (the candle itself is excluded).
/// Not enough history means no surge.
pub fn is_volume_surge(candles: &[Candle], index: usize, lookback: usize, multiplier: f64) -> bool {
    if lookback == 0 || index < lookback || index >= candles.len() {
        return false;
    }

    match calculate_average_volume(&candles[index - lookback..index]) {
        Some(avg_volume) => candles[index].volume > multiplier * avg_volume,
        None => false,
    }
}
