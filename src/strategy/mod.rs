// Breakout-and-retest strategy module
pub mod breakout;
pub mod config;
pub mod levels;
pub mod setup;

pub use breakout::{detect_breakout, Breakout};
pub use config::StrategyConfig;
pub use levels::{accept_levels, calculate_levels, LevelError, SignalLevels};
pub use setup::{validate_setup, SetupAnchors, SetupStatus, WaitReason};
