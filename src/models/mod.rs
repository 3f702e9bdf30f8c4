use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A closed OHLC candle for one interval.
///
/// Immutable once built; the in-progress candle is represented by [`Tick`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// A live kline update, possibly mid-candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub event_time: DateTime<Utc>,
    /// Start time of the candle this tick belongs to.
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// True when this update closes the current candle.
    pub is_final: bool,
}

impl Tick {
    /// Build the closed candle a final tick represents.
    pub fn to_candle(&self) -> Candle {
        Candle {
            open_time: self.open_time,
            close_time: self.event_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// Confirmed execution from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Sizing result for a market buy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Quote {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Per-symbol trading constraints from the exchange info endpoint.
///
/// Read-only input to sizing and signal rounding; fetched once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub min_notional: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Decimal places implied by the price tick size.
    pub price_decimals: u32,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    /// Decimal places implied by the lot step size.
    pub qty_decimals: u32,
}

impl SymbolFilters {
    /// Permissive defaults for tests and synthetic runs.
    pub fn unrestricted() -> Self {
        Self {
            min_notional: Decimal::ZERO,
            min_price: Decimal::ZERO,
            max_price: Decimal::MAX,
            price_decimals: 8,
            min_qty: Decimal::ZERO,
            max_qty: Decimal::MAX,
            qty_decimals: 8,
        }
    }
}

/// Lifecycle state of a per-symbol trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No open position; evaluating entry signals.
    Searching,
    /// Holding a position; managing the trailing band until exit.
    Trading,
}
