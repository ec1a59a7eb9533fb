// Technical indicators module
// Implements EMA, local extrema and volume analysis for breakout detection

pub mod extremes;
pub mod moving_average;
pub mod volume;

pub use extremes::{find_local_extremes, Extremum, LocalExtremes};
pub use moving_average::{calculate_ema_series, calculate_sma};
pub use volume::{calculate_average_volume, is_volume_surge};
