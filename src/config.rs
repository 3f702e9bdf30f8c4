use crate::error::{BotError, Result};
use crate::execution::TrackerConfig;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Runtime settings, read from the environment with sane defaults.
///
/// Symbols and interval come from the CLI; everything tunable lives here.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Quote asset spent on entries.
    pub trading_currency: String,
    /// Maximum notional committed to one entry.
    pub balance_limit: Decimal,
    /// Closed candles kept per symbol for indicator input.
    pub window_size: usize,
    /// Ticks aggregated per signal decision.
    pub tick_rounds: u32,
    /// Seconds between kline polls.
    pub poll_secs: u64,
    pub tracker: TrackerConfig,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| BotError::InvalidConfig(format!("cannot parse {key}={raw}"))),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = TrackerConfig::default();

        let settings = Self {
            trading_currency: std::env::var("SCALPBOT_CURRENCY").unwrap_or_else(|_| "USDT".into()),
            balance_limit: env_parse("SCALPBOT_BALANCE_LIMIT", Decimal::from(15))?,
            window_size: env_parse("SCALPBOT_WINDOW_SIZE", 400)?,
            tick_rounds: env_parse("SCALPBOT_TICK_ROUNDS", 1)?,
            poll_secs: env_parse("SCALPBOT_POLL_SECS", 5)?,
            tracker: TrackerConfig {
                stop_loss_multiplier: env_parse(
                    "SCALPBOT_STOP_LOSS_MULTIPLIER",
                    defaults.stop_loss_multiplier,
                )?,
                profit_multiplier: env_parse(
                    "SCALPBOT_PROFIT_MULTIPLIER",
                    defaults.profit_multiplier,
                )?,
                take_profit_multiplier: env_parse(
                    "SCALPBOT_TAKE_PROFIT_MULTIPLIER",
                    defaults.take_profit_multiplier,
                )?,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(BotError::InvalidConfig("window_size must be > 0".into()));
        }
        if self.balance_limit <= Decimal::ZERO {
            return Err(BotError::InvalidConfig(
                "balance_limit must be positive".into(),
            ));
        }
        if self.poll_secs == 0 {
            return Err(BotError::InvalidConfig("poll_secs must be > 0".into()));
        }
        self.tracker.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_validate() {
        let settings = Settings {
            trading_currency: "USDT".into(),
            balance_limit: dec!(15),
            window_size: 400,
            tick_rounds: 1,
            poll_secs: 5,
            tracker: TrackerConfig::default(),
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_balance_limit_is_rejected() {
        let settings = Settings {
            trading_currency: "USDT".into(),
            balance_limit: dec!(0),
            window_size: 400,
            tick_rounds: 1,
            poll_secs: 5,
            tracker: TrackerConfig::default(),
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn degenerate_multipliers_are_rejected() {
        let settings = Settings {
            trading_currency: "USDT".into(),
            balance_limit: dec!(15),
            window_size: 400,
            tick_rounds: 1,
            poll_secs: 5,
            tracker: TrackerConfig {
                take_profit_multiplier: dec!(1.005),
                ..Default::default()
            },
        };
        assert!(settings.validate().is_err());
    }
}
