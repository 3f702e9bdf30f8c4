// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::ExchangeGateway;
pub use error::{BotError, Result};
pub use models::*;
