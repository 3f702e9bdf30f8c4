use crate::models::{Candle, Tick};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Rolling window of the most recent closed candles for one symbol.
///
/// Owned exclusively by its trading session, so no locking: one symbol, one
/// task, one window.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleWindow {
    /// # Arguments
    /// * `capacity` - Maximum number of closed candles to keep
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a closed candle, evicting the oldest when at capacity.
    ///
    /// Never fails; malformed candle data is the feed's responsibility.
    pub fn append(&mut self, candle: Candle) {
        while self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    /// Ordered open prices, oldest first.
    pub fn opens(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.open).collect()
    }

    /// Ordered close prices, oldest first.
    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open/close sequences with the live tick spliced in as the newest
    /// entry, oldest value dropped so the length stays fixed.
    ///
    /// `smoothed_close` substitutes the tick-averaged close when smoothing
    /// is active.
    pub fn with_live_tick(&self, tick: &Tick, smoothed_close: Decimal) -> (Vec<Decimal>, Vec<Decimal>) {
        let mut opens = self.opens();
        let mut closes = self.closes();

        if !opens.is_empty() {
            opens.remove(0);
            closes.remove(0);
        }
        opens.push(tick.open);
        closes.push(smoothed_close);

        (opens, closes)
    }
}

/// Running average of in-progress closes since the last candle close.
///
/// Emits a decision price every `rounds` ticks so one outlier print inside a
/// candle cannot trigger a trade on its own.
#[derive(Debug, Clone)]
pub struct TickSmoother {
    rounds: u32,
    sum: Decimal,
    count: u32,
}

impl TickSmoother {
    /// The aggregate runs for the whole candle; `rounds` only controls how
    /// often a decision price is emitted.
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
            sum: Decimal::ZERO,
            count: 0,
        }
    }

    /// Accumulate one close price; returns the averaged close on every
    /// `rounds`-th tick, `None` otherwise.
    pub fn push(&mut self, close: Decimal) -> Option<Decimal> {
        self.sum += close;
        self.count += 1;

        if self.count % self.rounds == 0 {
            Some(self.sum / Decimal::from(self.count))
        } else {
            None
        }
    }

    /// Clear the aggregate when the candle closes.
    pub fn reset(&mut self) {
        self.sum = Decimal::ZERO;
        self.count = 0;
    }
}
