// Core modules
pub mod api;
pub mod commands;
pub mod config;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod scanner;
pub mod strategy;
pub mod tracker;

// Re-export commonly used types
pub use models::*;
pub use tracker::{LifecycleEvent, LifecycleTracker};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
