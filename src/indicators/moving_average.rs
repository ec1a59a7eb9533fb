/// Calculate Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the Exponential Moving Average (EMA) series
///
/// Span parameterisation with `alpha = 2 / (period + 1)` in the bias-adjusted
/// form: every output is the exponentially weighted mean of all prices seen so
/// far, so the first value equals the first price and no warm-up is dropped.
/// The result is parallel-indexed with `prices`.
pub fn calculate_ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let decay = 1.0 - alpha;

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    prices
        .iter()
        .map(|&price| {
            weighted_sum = price + decay * weighted_sum;
            weight_total = 1.0 + decay * weight_total;
            weighted_sum / weight_total
        })
        .collect()
}
