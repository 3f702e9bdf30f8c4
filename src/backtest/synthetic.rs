use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Market shapes for synthetic candle generation.
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady climb with mild noise.
    Uptrend,
    /// Steady decline with mild noise.
    Downtrend,
    /// Exactly constant price; must never produce a signal.
    Flat,
    /// Large two-sided swings.
    Volatile,
}

/// Seeded generator of synthetic candle series for offline runs and tests.
///
/// The same seed and scenario always produce the same series, so backtests
/// over synthetic data stay reproducible.
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 5.0,
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate `count` candles spaced `interval_minutes` apart, ending
    /// near the current time.
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        count: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::minutes(count as i64 * interval_minutes);

        let (drift, noise) = match scenario {
            MarketScenario::Uptrend => (0.0008, 0.002),
            MarketScenario::Downtrend => (-0.0008, 0.002),
            MarketScenario::Flat => (0.0, 0.0),
            MarketScenario::Volatile => (0.0, 0.02),
        };

        let mut candles = Vec::with_capacity(count);
        let mut price = self.base_price;

        for i in 0..count {
            let open = price;
            let step = if noise == 0.0 {
                0.0
            } else {
                self.rng.gen_range(-noise..noise)
            };
            let close = open * (1.0 + drift + step);

            let wick = if noise == 0.0 {
                0.0
            } else {
                self.rng.gen_range(0.0..noise / 2.0)
            };
            let high = open.max(close) * (1.0 + wick);
            let low = open.min(close) * (1.0 - wick);

            let open_time = start_time + Duration::minutes(i as i64 * interval_minutes);
            candles.push(Self::candle(open_time, interval_minutes, open, high, low, close));

            price = close;
        }

        candles
    }

    fn candle(
        open_time: DateTime<Utc>,
        interval_minutes: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Candle {
        let dec = |x: f64| Decimal::from_f64(x).unwrap_or_default().round_dp(4);
        Candle {
            open_time,
            close_time: open_time + Duration::minutes(interval_minutes) - Duration::milliseconds(1),
            open: dec(open),
            high: dec(high),
            low: dec(low),
            close: dec(close),
        }
    }
}
