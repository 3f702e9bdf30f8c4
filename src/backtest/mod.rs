pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestReport, TradeOutcome};
pub use runner::{AmbiguousBarPolicy, BacktestParams, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
