use crate::api::{ExchangeGateway, FetchParams};
use crate::error::{BotError, Result};
use crate::execution::{CandleWindow, PositionTracker, TickSmoother, TrackerConfig};
use crate::models::{SessionState, SymbolFilters, Tick};
use crate::strategy::SignalDetector;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-symbol session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub symbol: String,
    pub interval: String,
    /// Quote asset spent on entries, e.g. "USDT".
    pub trading_currency: String,
    /// Cap on the notional committed to a single entry.
    pub balance_limit: Decimal,
    /// Closed candles kept for indicator input.
    pub window_size: usize,
    /// Ticks aggregated per signal decision.
    pub tick_rounds: u32,
}

/// The searching/trading loop for one symbol.
///
/// Owns its window, tracker, and state exclusively; symbols run as
/// independent tasks with no shared mutable state. Ticks arrive through an
/// mpsc channel and are processed strictly in order; gateway calls are
/// awaited inline so at most one order is in flight for the symbol.
pub struct TradeSession<G> {
    config: SessionConfig,
    filters: SymbolFilters,
    gateway: Arc<G>,
    window: CandleWindow,
    smoother: TickSmoother,
    detector: SignalDetector,
    tracker: PositionTracker,
    state: SessionState,
}

impl<G: ExchangeGateway> TradeSession<G> {
    pub fn new(
        config: SessionConfig,
        filters: SymbolFilters,
        tracker_config: TrackerConfig,
        gateway: Arc<G>,
    ) -> Result<Self> {
        if config.window_size == 0 {
            return Err(BotError::InvalidConfig("window_size must be > 0".into()));
        }

        let detector = SignalDetector::default().with_price_decimals(filters.price_decimals);
        let tracker = PositionTracker::new(tracker_config)?;

        Ok(Self {
            window: CandleWindow::new(config.window_size),
            smoother: TickSmoother::new(config.tick_rounds),
            detector,
            tracker,
            state: SessionState::Searching,
            config,
            filters,
            gateway,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total_pnl(&self) -> Decimal {
        self.tracker.total_pnl()
    }

    /// Fetch the initial window and consume ticks until the feed closes.
    pub async fn start(mut self, mut ticks: mpsc::Receiver<Tick>) -> Result<Self> {
        self.warm_up().await?;

        tracing::info!(
            symbol = %self.config.symbol,
            interval = %self.config.interval,
            candles = self.window.len(),
            "session started, searching for entry"
        );

        while let Some(tick) = ticks.recv().await {
            self.handle_tick(&tick).await;
        }

        tracing::info!(
            symbol = %self.config.symbol,
            total_pnl = %self.tracker.total_pnl(),
            "tick stream ended, session stopped"
        );
        Ok(self)
    }

    /// Seed the window with history; the exchange's last row is the
    /// in-progress candle and is dropped.
    async fn warm_up(&mut self) -> Result<()> {
        let mut candles = self
            .gateway
            .fetch_candles(
                &self.config.symbol,
                &self.config.interval,
                FetchParams::limit(self.config.window_size as u32 + 1),
            )
            .await?;
        candles.pop();

        for candle in candles {
            self.window.append(candle);
        }
        Ok(())
    }

    /// Apply one tick. Errors are contained here: the session logs, stays in
    /// its current state, and waits for the next tick.
    pub async fn handle_tick(&mut self, tick: &Tick) {
        match self.state {
            SessionState::Searching => self.search(tick).await,
            SessionState::Trading => self.track(tick).await,
        }

        if tick.is_final {
            self.window.append(tick.to_candle());
            self.smoother.reset();
        }
    }

    async fn search(&mut self, tick: &Tick) {
        let Some(avg_close) = self.smoother.push(tick.close) else {
            return;
        };

        if self.window.len() < self.detector.min_samples() {
            tracing::debug!(
                symbol = %self.config.symbol,
                have = self.window.len(),
                need = self.detector.min_samples(),
                "window still warming up"
            );
            return;
        }

        let (opens, closes) = self.window.with_live_tick(tick, avg_close);
        let signal = match self.detector.evaluate(&opens, &closes) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(symbol = %self.config.symbol, error = %e, "signal evaluation failed");
                return;
            }
        };

        if signal {
            tracing::info!(
                symbol = %self.config.symbol,
                price = %avg_close,
                at = %tick.event_time,
                "entry signal"
            );
            self.enter().await;
        }
    }

    /// Size and place the market buy. Any failure drops the signal: the
    /// session stays in searching and waits for the next one.
    async fn enter(&mut self) {
        let quote = match self
            .gateway
            .calculate_buy_quantity(
                &self.config.symbol,
                &self.config.trading_currency,
                self.config.balance_limit,
                &self.filters,
            )
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(symbol = %self.config.symbol, error = %e, "sizing failed");
                return;
            }
        };

        if quote.notional() < self.filters.min_notional {
            let rejected = BotError::SizingRejected {
                notional: quote.notional(),
                min_notional: self.filters.min_notional,
            };
            tracing::warn!(symbol = %self.config.symbol, error = %rejected, "entry skipped");
            return;
        }

        match self.gateway.market_buy(&self.config.symbol, quote.quantity).await {
            Ok(fill) => {
                if let Err(e) = self.tracker.add(&self.config.symbol, fill) {
                    tracing::error!(symbol = %self.config.symbol, error = %e, "buy fill not trackable");
                    return;
                }
                self.state = SessionState::Trading;
                tracing::info!(
                    symbol = %self.config.symbol,
                    price = %fill.price,
                    quantity = %fill.quantity,
                    "bought, tracking position"
                );
            }
            Err(e) => {
                tracing::warn!(symbol = %self.config.symbol, error = %e, "market buy failed, signal dropped");
            }
        }
    }

    /// Ratchet or exit the open position on the latest price.
    async fn track(&mut self, tick: &Tick) {
        let requests = self.tracker.on_tick(&self.config.symbol, tick.close);

        for request in requests {
            match self
                .gateway
                .market_sell(&self.config.symbol, request.quantity)
                .await
            {
                Ok(fill) => match self.tracker.confirm_exit(request.position_id, fill) {
                    Ok(pnl) => {
                        tracing::info!(
                            symbol = %self.config.symbol,
                            price = %fill.price,
                            quantity = %fill.quantity,
                            pnl = %pnl,
                            total_pnl = %self.tracker.total_pnl(),
                            "sold"
                        );
                    }
                    Err(e) => {
                        tracing::error!(symbol = %self.config.symbol, error = %e, "sell fill not trackable");
                    }
                },
                Err(e) => {
                    // Position stays open and is re-evaluated next tick.
                    tracing::warn!(symbol = %self.config.symbol, error = %e, "market sell failed, retrying on next tick");
                }
            }
        }

        if !self.tracker.has_open(&self.config.symbol) {
            self.state = SessionState::Searching;
            tracing::info!(symbol = %self.config.symbol, "position flat, back to searching");
        }
    }
}
