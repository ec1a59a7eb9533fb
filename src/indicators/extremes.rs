//! Local extremum search over candle highs and lows
//!
//! A candle is a local high when its `high` equals the maximum `high` of the
//! inclusive window `[i - window, i + window]`, and a local low when its `low`
//! equals the window minimum. Candles closer than `window` to either end of
//! the series are never tested.

use crate::models::Candle;

/// A local high or low at a position in the candle series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub index: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalExtremes {
    pub highs: Vec<Extremum>,
    pub lows: Vec<Extremum>,
}

/// Find local highs and lows in chronological order
///
/// Ties are kept: when several candles share the window maximum (or
/// minimum), each of them is reported.
pub fn find_local_extremes(candles: &[Candle], window: usize) -> LocalExtremes {
    let mut extremes = LocalExtremes::default();

    if candles.len() < 2 * window + 1 {
        return extremes;
    }

    for i in window..candles.len() - window {
        let neighbourhood = &candles[i - window..=i + window];

        let window_high = neighbourhood
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        if candles[i].high == window_high {
            extremes.highs.push(Extremum {
                index: i,
                value: candles[i].high,
            });
        }

        let window_low = neighbourhood
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min);
        if candles[i].low == window_low {
            extremes.lows.push(Extremum {
                index: i,
                value: candles[i].low,
            });
        }
    }

    extremes
}
