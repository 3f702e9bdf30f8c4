pub mod moving_average;

pub use moving_average::{ema_series, sma_series, CrossPair};
