use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One simulated trade: entry point and fractional return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub entered_at: DateTime<Utc>,
    pub entry_price: Decimal,
    /// Fractional return, e.g. 0.01 for +1%. Zero when the replay ran out
    /// of data before an exit.
    pub profit: Decimal,
}

/// Aggregate results of one backtest run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub interval: String,
    pub candles_replayed: usize,
    pub signal_count: u32,
    pub wins: u32,
    pub losses: u32,
    /// Sum of fractional per-trade returns.
    pub total_profit: Decimal,
    pub trades: Vec<TradeOutcome>,
}

impl BacktestReport {
    pub fn new(symbol: &str, interval: &str, candles_replayed: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            candles_replayed,
            signal_count: 0,
            wins: 0,
            losses: 0,
            total_profit: Decimal::ZERO,
            trades: Vec::new(),
        }
    }

    /// Record one simulated trade. Zero-profit trades (data exhaustion)
    /// count as neither win nor loss.
    pub fn record(&mut self, outcome: TradeOutcome) {
        self.signal_count += 1;
        if outcome.profit > Decimal::ZERO {
            self.wins += 1;
        } else if outcome.profit < Decimal::ZERO {
            self.losses += 1;
        }
        self.total_profit += outcome.profit;
        self.trades.push(outcome);
    }

    pub fn average_profit(&self) -> Decimal {
        if self.signal_count == 0 {
            Decimal::ZERO
        } else {
            self.total_profit / Decimal::from(self.signal_count)
        }
    }

    pub fn win_rate(&self) -> Decimal {
        let decided = self.wins + self.losses;
        if decided == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.wins) / Decimal::from(decided)
        }
    }

    pub fn log_summary(&self) {
        let hundred = Decimal::from(100);
        tracing::info!(
            symbol = %self.symbol,
            interval = %self.interval,
            candles = self.candles_replayed,
            signals = self.signal_count,
            wins = self.wins,
            losses = self.losses,
            total_profit_pct = %(self.total_profit * hundred).round_dp(2),
            average_profit_pct = %(self.average_profit() * hundred).round_dp(4),
            win_rate_pct = %(self.win_rate() * hundred).round_dp(1),
            "backtest finished"
        );
    }
}
