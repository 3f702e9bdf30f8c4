pub mod detector;

pub use detector::{DetectorConfig, SignalDetector};
