use crate::error::{BotError, Result};
use rust_decimal::Decimal;

/// Calculate the full trailing Simple Moving Average series.
///
/// Output has `values.len() - period + 1` entries; callers take the last two
/// for previous/current crossover checks.
pub fn sma_series(values: &[Decimal], period: usize) -> Result<Vec<Decimal>> {
    if period == 0 {
        return Err(BotError::InvalidConfig("sma period must be > 0".into()));
    }
    if values.len() < period {
        return Err(BotError::InsufficientData {
            needed: period,
            got: values.len(),
        });
    }

    let divisor = Decimal::from(period as u64);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut window_sum: Decimal = values[..period].iter().sum();
    out.push(window_sum / divisor);

    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out.push(window_sum / divisor);
    }

    Ok(out)
}

/// Calculate the full trailing Exponential Moving Average series.
///
/// Seeded with the SMA of the first `period` values, then smoothed with
/// `k = 2 / (period + 1)`. This matches the convention of the reference
/// indicator library the historical backtests were calibrated against.
pub fn ema_series(values: &[Decimal], period: usize) -> Result<Vec<Decimal>> {
    if period == 0 {
        return Err(BotError::InvalidConfig("ema period must be > 0".into()));
    }
    if values.len() < period {
        return Err(BotError::InsufficientData {
            needed: period,
            got: values.len(),
        });
    }

    let multiplier = Decimal::from(2u64) / Decimal::from(period as u64 + 1);

    let seed: Decimal = values[..period].iter().sum::<Decimal>() / Decimal::from(period as u64);

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut ema = seed;
    out.push(ema);

    for value in &values[period..] {
        ema = (*value - ema) * multiplier + ema;
        out.push(ema);
    }

    Ok(out)
}

/// Previous/current pair taken from the tail of an average series, rounded
/// to a fixed number of decimal places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossPair {
    pub prev: Decimal,
    pub curr: Decimal,
}

impl CrossPair {
    /// Take the last two entries of `series`, rounded to `decimals` places.
    ///
    /// Requires a series of at least two values, i.e. `period + 1` input
    /// points upstream.
    pub fn from_series(series: &[Decimal], decimals: u32) -> Result<Self> {
        if series.len() < 2 {
            return Err(BotError::InsufficientData {
                needed: 2,
                got: series.len(),
            });
        }
        Ok(Self {
            prev: series[series.len() - 2].round_dp(decimals),
            curr: series[series.len() - 1].round_dp(decimals),
        })
    }

    /// True when this pair crosses from at-or-below to above.
    pub fn crossed_above(&self, other: &CrossPair) -> bool {
        self.curr > other.curr && self.prev <= other.prev
    }
}
