pub mod candle_window;
pub mod session;
pub mod tracker;

pub use candle_window::{CandleWindow, TickSmoother};
pub use session::{SessionConfig, TradeSession};
pub use tracker::{Position, PositionTracker, SellRequest, TrackerConfig};
