use crate::error::{BotError, Result};
use crate::models::Fill;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Band multipliers applied to entry and ratchet prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Seeds the lower band: `lower = entry * stop_loss_multiplier`.
    pub stop_loss_multiplier: Decimal,
    /// Seeds the upper band: `upper = entry * profit_multiplier`.
    pub profit_multiplier: Decimal,
    /// Hard exit ceiling: sell when `price >= entry * take_profit_multiplier`.
    pub take_profit_multiplier: Decimal,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stop_loss_multiplier: dec!(0.99),
            profit_multiplier: dec!(1.01),
            take_profit_multiplier: dec!(1.025),
        }
    }
}

impl TrackerConfig {
    /// Reject multiplier sets that would make the band logic degenerate.
    ///
    /// `take_profit_multiplier` must strictly exceed `profit_multiplier`,
    /// otherwise the hard exit pre-empts the very first ratchet and the
    /// trailing behavior never engages.
    pub fn validate(&self) -> Result<()> {
        if self.stop_loss_multiplier >= Decimal::ONE {
            return Err(BotError::InvalidConfig(format!(
                "stop_loss_multiplier {} must be below 1",
                self.stop_loss_multiplier
            )));
        }
        if self.profit_multiplier <= Decimal::ONE {
            return Err(BotError::InvalidConfig(format!(
                "profit_multiplier {} must be above 1",
                self.profit_multiplier
            )));
        }
        if self.take_profit_multiplier <= self.profit_multiplier {
            return Err(BotError::InvalidConfig(format!(
                "take_profit_multiplier {} must exceed profit_multiplier {}",
                self.take_profit_multiplier, self.profit_multiplier
            )));
        }
        Ok(())
    }
}

/// An open spot position with its trailing band.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub lower_band: Decimal,
    pub upper_band: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    fn take_profit_price(&self, config: &TrackerConfig) -> Decimal {
        self.entry_price * config.take_profit_multiplier
    }
}

/// A position the tracker wants sold at market.
///
/// Issuing a request mutates nothing: if the sell never confirms, the same
/// request comes back on the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellRequest {
    pub position_id: Uuid,
    pub quantity: Decimal,
}

/// Owns the lifecycle of open positions: entry, per-tick band ratchet, exit
/// decision, and realized-P&L accounting.
#[derive(Debug)]
pub struct PositionTracker {
    config: TrackerConfig,
    positions: Vec<Position>,
    total_pnl: Decimal,
}

impl PositionTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            positions: Vec::new(),
            total_pnl: Decimal::ZERO,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record a confirmed buy fill and seed its band from the fill price.
    pub fn add(&mut self, symbol: &str, fill: Fill) -> Result<Uuid> {
        if self.has_open(symbol) {
            return Err(BotError::OrderFailed(format!(
                "already holding an open position for {symbol}"
            )));
        }

        let id = Uuid::new_v4();
        let position = Position {
            id,
            symbol: symbol.to_string(),
            entry_price: fill.price,
            quantity: fill.quantity,
            lower_band: fill.price * self.config.stop_loss_multiplier,
            upper_band: fill.price * self.config.profit_multiplier,
            opened_at: Utc::now(),
        };

        tracing::info!(
            symbol,
            entry = %position.entry_price,
            quantity = %position.quantity,
            lower = %position.lower_band,
            upper = %position.upper_band,
            "position opened"
        );

        self.positions.push(position);
        Ok(id)
    }

    pub fn has_open(&self, symbol: &str) -> bool {
        self.positions.iter().any(|p| p.symbol == symbol)
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    /// Apply one price tick to every open position of `symbol`.
    ///
    /// Exit is checked before the ratchet, so a tick satisfying both acts as
    /// an exit. The ratchet trails both bands upward without selling:
    /// `lower = upper * (1 + sl) / 2`, `upper = upper * (1 + pm) / 2`.
    pub fn on_tick(&mut self, symbol: &str, price: Decimal) -> Vec<SellRequest> {
        let config = self.config;
        let mut requests = Vec::new();

        for position in self.positions.iter_mut().filter(|p| p.symbol == symbol) {
            let take_profit = position.take_profit_price(&config);

            if price <= position.lower_band || price >= take_profit {
                requests.push(SellRequest {
                    position_id: position.id,
                    quantity: position.quantity,
                });
            } else if price >= position.upper_band {
                let prev_lower = position.lower_band;
                let prev_upper = position.upper_band;

                position.lower_band =
                    position.upper_band * (Decimal::ONE + config.stop_loss_multiplier) / dec!(2);
                position.upper_band =
                    position.upper_band * (Decimal::ONE + config.profit_multiplier) / dec!(2);

                debug_assert!(position.lower_band < position.upper_band);

                tracing::info!(
                    symbol,
                    price = %price,
                    lower = %position.lower_band,
                    upper = %position.upper_band,
                    prev_lower = %prev_lower,
                    prev_upper = %prev_upper,
                    "bands ratcheted up"
                );
            }
        }

        requests
    }

    /// Record a confirmed sell fill: realize the P&L and drop the position.
    pub fn confirm_exit(&mut self, position_id: Uuid, fill: Fill) -> Result<Decimal> {
        let index = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| BotError::OrderFailed(format!("unknown position {position_id}")))?;

        let position = self.positions.remove(index);
        let pnl = fill.price * fill.quantity - position.entry_price * position.quantity;
        self.total_pnl += pnl;

        tracing::info!(
            symbol = %position.symbol,
            entry = %position.entry_price,
            exit = %fill.price,
            quantity = %fill.quantity,
            pnl = %pnl,
            total_pnl = %self.total_pnl,
            "position closed"
        );

        Ok(pnl)
    }
}
