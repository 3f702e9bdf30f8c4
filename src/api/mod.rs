pub mod binance;
pub mod feed;

pub use binance::BinanceClient;
pub use feed::TickFeed;

use crate::error::Result;
use crate::models::{Candle, Fill, Quote, SymbolFilters};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Optional range bounds for a candle fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchParams {
    pub limit: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl FetchParams {
    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            ..Default::default()
        }
    }
}

/// The exchange boundary consumed by the trading core.
///
/// Injected into each per-symbol session instead of living as a module-level
/// client singleton, so sessions run in parallel without shared mutable
/// state and tests can substitute a scripted double.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Per-symbol trading filters, fetched once at startup.
    async fn fetch_exchange_info(&self) -> Result<HashMap<String, SymbolFilters>>;

    /// Ordered closed candles for `symbol` at `interval`.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        params: FetchParams,
    ) -> Result<Vec<Candle>>;

    /// Latest traded price.
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal>;

    /// Size a market buy from the free balance, capped at `balance_limit`
    /// and clamped/rounded to the symbol's filters.
    async fn calculate_buy_quantity(
        &self,
        symbol: &str,
        trading_currency: &str,
        balance_limit: Decimal,
        filters: &SymbolFilters,
    ) -> Result<Quote>;

    async fn market_buy(&self, symbol: &str, quantity: Decimal) -> Result<Fill>;

    async fn market_sell(&self, symbol: &str, quantity: Decimal) -> Result<Fill>;
}
