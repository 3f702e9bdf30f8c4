use rust_decimal::Decimal;

pub type Result<T> = std::result::Result<T, BotError>;

/// Errors surfaced by the trading core.
///
/// None of these are fatal to a session: the state machine stays in its
/// current state and keeps consuming ticks.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// The candle window is shorter than the requested average period.
    #[error("insufficient data: need {needed} values, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Available balance buys less than the exchange minimum notional.
    #[error("sizing rejected: notional {notional} below minimum {min_notional}")]
    SizingRejected {
        notional: Decimal,
        min_notional: Decimal,
    },

    /// The exchange rejected or failed a buy/sell order.
    #[error("order failed: {0}")]
    OrderFailed(String),

    /// Rejected at startup, before any order is placed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("exchange api error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("malformed exchange response: {0}")]
    Parse(String),
}
