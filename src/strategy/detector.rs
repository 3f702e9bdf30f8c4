use crate::error::Result;
use crate::indicators::{ema_series, CrossPair};
use rust_decimal::Decimal;

/// Crossover periods and rounding precision for signal evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Fast crossover pair, both over closes.
    pub fast_period: usize,
    pub slow_period: usize,
    /// Trend-confirmation pair: `trend_close` over closes, `trend_open`
    /// over opens.
    pub trend_close_period: usize,
    pub trend_open_period: usize,
    /// Averages are rounded to this many places before comparison, matching
    /// the exchange tick size so float-scale noise cannot fake a cross.
    pub price_decimals: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fast_period: 6,
            slow_period: 12,
            trend_close_period: 13,
            trend_open_period: 21,
            price_decimals: 4,
        }
    }
}

/// Detects moving-average crossover entry signals.
///
/// Pure: same open/close sequences always produce the same answer, in live
/// streaming and in backtest replay alike.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    config: DetectorConfig,
}

impl SignalDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn with_price_decimals(mut self, price_decimals: u32) -> Self {
        self.config.price_decimals = price_decimals;
        self
    }

    /// Minimum number of price points needed for a previous/current pair on
    /// the longest average.
    pub fn min_samples(&self) -> usize {
        let c = &self.config;
        c.fast_period
            .max(c.slow_period)
            .max(c.trend_close_period)
            .max(c.trend_open_period)
            + 1
    }

    /// Evaluate the entry rules against open/close sequences ending with the
    /// most recent (possibly tick-averaged) values.
    ///
    /// Any rule firing produces a signal:
    /// - fast golden cross: close-EMA `fast` crossing above close-EMA `slow`;
    /// - trend confirmation: close-EMA `trend_close` crossing above open-EMA
    ///   `trend_open`.
    ///
    /// The `<=` on the previous side is deliberate: a flat-then-rising pair
    /// still counts as a cross.
    pub fn evaluate(&self, opens: &[Decimal], closes: &[Decimal]) -> Result<bool> {
        let c = &self.config;
        let dp = c.price_decimals;

        let fast = CrossPair::from_series(&ema_series(closes, c.fast_period)?, dp)?;
        let slow = CrossPair::from_series(&ema_series(closes, c.slow_period)?, dp)?;

        let trend_close = CrossPair::from_series(&ema_series(closes, c.trend_close_period)?, dp)?;
        let trend_open = CrossPair::from_series(&ema_series(opens, c.trend_open_period)?, dp)?;

        let fast_cross = fast.crossed_above(&slow);
        let trend_cross = trend_close.crossed_above(&trend_open);

        let signal = fast_cross || trend_cross;

        if signal {
            tracing::debug!(
                fast_prev = %fast.prev,
                fast_curr = %fast.curr,
                slow_prev = %slow.prev,
                slow_curr = %slow.curr,
                trend_close_prev = %trend_close.prev,
                trend_close_curr = %trend_close.curr,
                trend_open_prev = %trend_open.prev,
                trend_open_curr = %trend_open.curr,
                fast_cross,
                trend_cross,
                "crossover signal"
            );
        }

        Ok(signal)
    }
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
