use crate::backtest::{BacktestReport, TradeOutcome};
use crate::error::{BotError, Result};
use crate::execution::TrackerConfig;
use crate::models::Candle;
use crate::strategy::SignalDetector;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Resolution for a bar whose high crosses the take-profit ceiling and
/// whose low crosses the stop band, with no way to know which came first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousBarPolicy {
    /// Exit at the midpoint of the two limits.
    #[default]
    Midpoint,
    /// Pessimistic: assume the stop was hit first.
    LowerLimit,
}

#[derive(Debug, Clone, Copy)]
pub struct BacktestParams {
    pub tracker: TrackerConfig,
    /// Candles consumed before the first signal evaluation.
    pub warmup: usize,
    pub ambiguous_bar: AmbiguousBarPolicy,
    pub price_decimals: u32,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            warmup: 200,
            ambiguous_bar: AmbiguousBarPolicy::default(),
            price_decimals: 4,
        }
    }
}

/// Replays a historical candle series through the live signal detector and
/// an analytic rendition of the tracker's exit ladder.
///
/// Single-threaded and purely functional of its input: the same series and
/// parameters always produce bit-identical reports, which is what makes the
/// numbers predictive of live behavior.
pub struct BacktestRunner {
    detector: SignalDetector,
    params: BacktestParams,
}

impl BacktestRunner {
    pub fn new(params: BacktestParams) -> Result<Self> {
        params.tracker.validate()?;
        let detector = SignalDetector::default().with_price_decimals(params.price_decimals);

        if params.warmup < detector.min_samples() {
            return Err(BotError::InvalidConfig(format!(
                "warmup {} is below the {} samples the detector needs",
                params.warmup,
                detector.min_samples()
            )));
        }

        Ok(Self { detector, params })
    }

    /// Replay `candles`, entering at the close of each signal candle.
    ///
    /// `fine` optionally supplies finer-grained (e.g. 1m) bars covering the
    /// same range; exits then resolve against those instead of the coarse
    /// series. A trade still open when the data ends scores zero profit.
    pub fn run(
        &self,
        symbol: &str,
        interval: &str,
        candles: &[Candle],
        fine: &[Candle],
    ) -> Result<BacktestReport> {
        if candles.len() <= self.params.warmup {
            return Err(BotError::InsufficientData {
                needed: self.params.warmup + 1,
                got: candles.len(),
            });
        }

        let opens: Vec<Decimal> = candles.iter().map(|c| c.open).collect();
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();

        let mut report = BacktestReport::new(symbol, interval, candles.len());

        for i in self.params.warmup..candles.len() - 1 {
            let signal = self.detector.evaluate(&opens[..=i], &closes[..=i])?;
            if !signal {
                continue;
            }

            // Entry at the close of the signal candle; the walk starts with
            // the first bar after it.
            let entry_price = candles[i].close;
            let entered_at = candles[i].close_time;

            let profit = if fine.is_empty() {
                self.simulate_exit(entry_price, &candles[i + 1..])
            } else {
                let start = fine.partition_point(|c| c.open_time < entered_at);
                self.simulate_exit(entry_price, &fine[start..])
            };

            tracing::debug!(
                symbol,
                entry = %entry_price,
                at = %entered_at,
                profit_pct = %(profit * dec!(100)).round_dp(4),
                "simulated trade"
            );

            report.record(TradeOutcome {
                entered_at,
                entry_price,
                profit,
            });
        }

        Ok(report)
    }

    /// Walk post-entry bars through the same band logic the live tracker
    /// applies tick by tick, and return the fractional profit of the trade.
    ///
    /// Exit is checked before the ratchet, mirroring live precedence; a
    /// two-sided bar resolves through the ambiguous-bar policy.
    fn simulate_exit(&self, entry_price: Decimal, bars: &[Candle]) -> Decimal {
        let t = &self.params.tracker;
        let take_profit = entry_price * t.take_profit_multiplier;
        let mut lower = entry_price * t.stop_loss_multiplier;
        let mut upper = entry_price * t.profit_multiplier;

        for bar in bars {
            let hit_take_profit = bar.high >= take_profit;
            let hit_stop = bar.low <= lower;

            let exit_price = match (hit_take_profit, hit_stop) {
                (true, true) => Some(match self.params.ambiguous_bar {
                    AmbiguousBarPolicy::Midpoint => (lower + take_profit) / dec!(2),
                    AmbiguousBarPolicy::LowerLimit => lower,
                }),
                (false, true) => Some(lower),
                (true, false) => Some(take_profit),
                (false, false) => None,
            };

            if let Some(exit_price) = exit_price {
                return exit_price / entry_price - Decimal::ONE;
            }

            if bar.high >= upper {
                lower = upper * (Decimal::ONE + t.stop_loss_multiplier) / dec!(2);
                upper = upper * (Decimal::ONE + t.profit_multiplier) / dec!(2);
            }
        }

        // Data exhausted with the trade still open: report flat, do not
        // mark to market.
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn bar(i: i64, high: Decimal, low: Decimal) -> Candle {
        let open_time = Utc::now() + Duration::minutes(i);
        Candle {
            open_time,
            close_time: open_time + Duration::minutes(1),
            open: low,
            high,
            low,
            close: high,
        }
    }

    fn runner() -> BacktestRunner {
        BacktestRunner::new(BacktestParams::default()).unwrap()
    }

    #[test]
    fn warmup_below_detector_needs_is_rejected() {
        let params = BacktestParams {
            warmup: 5,
            ..Default::default()
        };
        assert!(matches!(
            BacktestRunner::new(params),
            Err(BotError::InvalidConfig(_))
        ));
    }

    #[test]
    fn stop_exit_scores_the_stop_multiplier() {
        // Entry 100: lower band 99; the bar trades down through it.
        let bars = vec![bar(1, dec!(100.5), dec!(98.0))];
        let profit = runner().simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(-0.01));
    }

    #[test]
    fn take_profit_exit_scores_the_take_profit_multiplier() {
        let bars = vec![bar(1, dec!(103.0), dec!(100.0))];
        let profit = runner().simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(0.025));
    }

    #[test]
    fn ambiguous_bar_resolves_to_midpoint_by_default() {
        // One bar spans both the stop (99) and the take profit (102.5):
        // midpoint exit at 100.75 is +0.75%.
        let bars = vec![bar(1, dec!(103.0), dec!(98.0))];
        let profit = runner().simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(0.0075));
    }

    #[test]
    fn ambiguous_bar_lower_limit_policy_is_pessimistic() {
        let params = BacktestParams {
            ambiguous_bar: AmbiguousBarPolicy::LowerLimit,
            ..Default::default()
        };
        let runner = BacktestRunner::new(params).unwrap();

        let bars = vec![bar(1, dec!(103.0), dec!(98.0))];
        let profit = runner.simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(-0.01));
    }

    #[test]
    fn ratchet_raises_the_stop_before_a_pullback() {
        // Bar 1 touches the upper band (101) without reaching 102.5 or the
        // stop: bands ratchet to 100.495 / 101.505. Bar 2 pulls back to
        // 100.2, under the raised stop, exiting at 100.495 for a small win
        // instead of riding down to the original 99 stop.
        let bars = vec![
            bar(1, dec!(101.2), dec!(100.4)),
            bar(2, dec!(100.9), dec!(100.2)),
        ];
        let profit = runner().simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(0.00495));
    }

    #[test]
    fn exhausted_data_reports_zero() {
        // Price never leaves the band and the series ends.
        let bars = vec![bar(1, dec!(100.5), dec!(99.5)); 10];
        let profit = runner().simulate_exit(dec!(100), &bars);
        assert_eq!(profit, dec!(0));
    }

    #[test]
    fn short_series_is_rejected() {
        let bars: Vec<Candle> = (0..50)
            .map(|i| bar(i, dec!(100), dec!(100)))
            .collect();
        assert!(matches!(
            runner().run("BANDUSDT", "15m", &bars, &[]),
            Err(BotError::InsufficientData { .. })
        ));
    }
}
