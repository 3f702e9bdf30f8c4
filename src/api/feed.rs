use crate::api::{ExchangeGateway, FetchParams};
use crate::models::{Candle, Tick};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Polling tick source for one symbol.
///
/// Polls the two most recent klines; the last row is the in-progress candle.
/// When its open time advances, the previously watched candle has closed and
/// a final tick is emitted for it before the first tick of the new candle.
/// Ticks are pushed into an mpsc channel, preserving arrival order for the
/// consuming session.
pub struct TickFeed<G> {
    gateway: Arc<G>,
    symbol: String,
    interval: String,
    poll_interval: Duration,
}

impl<G: ExchangeGateway> TickFeed<G> {
    pub fn new(gateway: Arc<G>, symbol: String, interval: String, poll_interval: Duration) -> Self {
        Self {
            gateway,
            symbol,
            interval,
            poll_interval,
        }
    }

    fn tick_from(candle: &Candle, is_final: bool) -> Tick {
        Tick {
            event_time: if is_final { candle.close_time } else { Utc::now() },
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            is_final,
        }
    }

    /// Run until the receiving session goes away.
    pub async fn run(self, tx: mpsc::Sender<Tick>) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // The in-progress candle from the previous poll.
        let mut watched: Option<Candle> = None;

        loop {
            poll.tick().await;

            let rows = match self
                .gateway
                .fetch_candles(&self.symbol, &self.interval, FetchParams::limit(2))
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, error = %e, "kline poll failed, retrying");
                    continue;
                }
            };

            let Some(latest) = rows.last().cloned() else {
                tracing::warn!(symbol = %self.symbol, "empty kline response, retrying");
                continue;
            };

            let mut out = Vec::with_capacity(2);
            if let Some(prev) = &watched {
                if latest.open_time > prev.open_time {
                    // The candle watched last poll has closed; prefer the
                    // exchange's closed row over our stale snapshot of it.
                    let closed = rows
                        .iter()
                        .rev()
                        .find(|c| c.open_time == prev.open_time)
                        .unwrap_or(prev);
                    out.push(Self::tick_from(closed, true));
                }
            }
            out.push(Self::tick_from(&latest, false));
            watched = Some(latest);

            for tick in out {
                if tx.send(tick).await.is_err() {
                    tracing::info!(symbol = %self.symbol, "tick receiver dropped, stopping feed");
                    return;
                }
            }
        }
    }
}
