//! End-to-end session tests against a scripted exchange double.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scalpbot::api::{ExchangeGateway, FetchParams};
use scalpbot::error::{BotError, Result};
use scalpbot::execution::{SessionConfig, TradeSession, TrackerConfig};
use scalpbot::models::{Candle, Fill, Quote, SessionState, SymbolFilters, Tick};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const WINDOW: usize = 30;

/// Scripted gateway: serves a fixed history, a fixed quote, and canned
/// fills, while recording every order it receives.
struct MockGateway {
    history: Vec<Candle>,
    quote: Quote,
    buy_fill: Fill,
    sell_fill: Fill,
    /// Number of leading sell attempts to reject.
    sell_failures: AtomicUsize,
    buys: Mutex<Vec<Decimal>>,
    sells: Mutex<Vec<Decimal>>,
}

impl MockGateway {
    fn new(history: Vec<Candle>, quote: Quote, buy_fill: Fill, sell_fill: Fill) -> Self {
        Self {
            history,
            quote,
            buy_fill,
            sell_fill,
            sell_failures: AtomicUsize::new(0),
            buys: Mutex::new(Vec::new()),
            sells: Mutex::new(Vec::new()),
        }
    }

    fn failing_sells(self, count: usize) -> Self {
        self.sell_failures.store(count, Ordering::SeqCst);
        self
    }

    fn buy_count(&self) -> usize {
        self.buys.lock().unwrap().len()
    }

    fn sell_count(&self) -> usize {
        self.sells.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn fetch_exchange_info(&self) -> Result<HashMap<String, SymbolFilters>> {
        unimplemented!("sessions receive filters directly")
    }

    async fn fetch_candles(&self, _: &str, _: &str, _: FetchParams) -> Result<Vec<Candle>> {
        Ok(self.history.clone())
    }

    async fn fetch_price(&self, _: &str) -> Result<Decimal> {
        Ok(self.quote.price)
    }

    async fn calculate_buy_quantity(
        &self,
        _: &str,
        _: &str,
        _: Decimal,
        _: &SymbolFilters,
    ) -> Result<Quote> {
        Ok(self.quote)
    }

    async fn market_buy(&self, _: &str, quantity: Decimal) -> Result<Fill> {
        self.buys.lock().unwrap().push(quantity);
        Ok(self.buy_fill)
    }

    async fn market_sell(&self, _: &str, quantity: Decimal) -> Result<Fill> {
        self.sells.lock().unwrap().push(quantity);
        let remaining = self.sell_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.sell_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BotError::OrderFailed("exchange rejected the order".into()));
        }
        Ok(self.sell_fill)
    }
}

fn flat_candle(i: i64, price: Decimal) -> Candle {
    let open_time = Utc::now() - Duration::minutes((WINDOW as i64 + 2 - i) * 15);
    Candle {
        open_time,
        close_time: open_time + Duration::minutes(15) - Duration::milliseconds(1),
        open: price,
        high: price,
        low: price,
        close: price,
    }
}

/// `window + 1` flat candles; the session drops the last as in-progress.
fn flat_history(price: Decimal) -> Vec<Candle> {
    (0..=WINDOW as i64).map(|i| flat_candle(i, price)).collect()
}

fn tick(close: Decimal) -> Tick {
    Tick {
        event_time: Utc::now(),
        open_time: Utc::now(),
        open: dec!(100),
        high: close.max(dec!(100)),
        low: close.min(dec!(100)),
        close,
        is_final: false,
    }
}

fn filters(min_notional: Decimal) -> SymbolFilters {
    SymbolFilters {
        min_notional,
        ..SymbolFilters::unrestricted()
    }
}

fn session_config() -> SessionConfig {
    SessionConfig {
        symbol: "BANDUSDT".into(),
        interval: "15m".into(),
        trading_currency: "USDT".into(),
        balance_limit: dec!(15),
        window_size: WINDOW,
        tick_rounds: 1,
    }
}

async fn run_session(
    gateway: Arc<MockGateway>,
    min_notional: Decimal,
    ticks: Vec<Tick>,
) -> TradeSession<MockGateway> {
    let session = TradeSession::new(
        session_config(),
        filters(min_notional),
        TrackerConfig::default(),
        gateway,
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(16);
    for t in ticks {
        tx.send(t).await.unwrap();
    }
    drop(tx);

    session.start(rx).await.unwrap()
}

/// A breakout tick after a flat window fires the signal, and the session
/// buys, ratchets, stops out, and returns to searching.
#[tokio::test]
async fn full_cycle_buy_ratchet_stop_out() {
    let gateway = Arc::new(MockGateway::new(
        flat_history(dec!(100)),
        Quote {
            price: dec!(110),
            quantity: dec!(1),
        },
        Fill {
            price: dec!(110),
            quantity: dec!(1),
        },
        Fill {
            price: dec!(110.5),
            quantity: dec!(1),
        },
    ));

    // Entry at 110 seeds bands 108.9 / 111.1. 111.2 ratchets the stop up to
    // 110.5445; 105 trades through it and exits.
    let session = run_session(
        gateway.clone(),
        dec!(10),
        vec![tick(dec!(110)), tick(dec!(111.2)), tick(dec!(105))],
    )
    .await;

    assert_eq!(gateway.buy_count(), 1);
    assert_eq!(gateway.sell_count(), 1);
    assert_eq!(session.state(), SessionState::Searching);
    assert_eq!(session.total_pnl(), dec!(0.5));
}

/// A quote below the exchange minimum notional is not sent: the signal is
/// dropped and the session keeps searching.
#[tokio::test]
async fn undersized_quote_never_reaches_the_exchange() {
    let gateway = Arc::new(MockGateway::new(
        flat_history(dec!(100)),
        // Only 5 USDT available against a 10 USDT floor.
        Quote {
            price: dec!(100),
            quantity: dec!(0.05),
        },
        Fill {
            price: dec!(100),
            quantity: dec!(0.05),
        },
        Fill {
            price: dec!(100),
            quantity: dec!(0.05),
        },
    ));

    let session = run_session(gateway.clone(), dec!(10), vec![tick(dec!(110))]).await;

    assert_eq!(gateway.buy_count(), 0);
    assert_eq!(session.state(), SessionState::Searching);
}

/// A failed sell leaves the position open; the next tick re-issues it.
#[tokio::test]
async fn failed_sell_is_retried_on_the_next_tick() {
    let gateway = Arc::new(
        MockGateway::new(
            flat_history(dec!(100)),
            Quote {
                price: dec!(110),
                quantity: dec!(1),
            },
            Fill {
                price: dec!(110),
                quantity: dec!(1),
            },
            Fill {
                price: dec!(105),
                quantity: dec!(1),
            },
        )
        .failing_sells(1),
    );

    // 105 is under the 108.9 stop both times; the first sell is rejected.
    let session = run_session(
        gateway.clone(),
        dec!(10),
        vec![tick(dec!(110)), tick(dec!(105)), tick(dec!(105))],
    )
    .await;

    assert_eq!(gateway.sell_count(), 2);
    assert_eq!(session.state(), SessionState::Searching);
    assert_eq!(session.total_pnl(), dec!(-5));
}

/// While holding a position, further breakout ticks must not double-buy.
#[tokio::test]
async fn no_second_entry_while_holding() {
    let gateway = Arc::new(MockGateway::new(
        flat_history(dec!(100)),
        Quote {
            price: dec!(110),
            quantity: dec!(1),
        },
        Fill {
            price: dec!(110),
            quantity: dec!(1),
        },
        Fill {
            price: dec!(110),
            quantity: dec!(1),
        },
    ));

    // Both ticks stay inside the 108.9..111.1 band, so nothing sells and
    // nothing new may be bought.
    let session = run_session(
        gateway.clone(),
        dec!(10),
        vec![tick(dec!(110)), tick(dec!(110.5)), tick(dec!(110.2))],
    )
    .await;

    assert_eq!(gateway.buy_count(), 1);
    assert_eq!(gateway.sell_count(), 0);
    assert_eq!(session.state(), SessionState::Trading);
}
