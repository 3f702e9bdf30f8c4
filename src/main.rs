use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use scalpbot::api::{BinanceClient, ExchangeGateway, FetchParams, TickFeed};
use scalpbot::backtest::{BacktestParams, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use scalpbot::config::Settings;
use scalpbot::execution::{SessionConfig, TradeSession};
use scalpbot::models::Candle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scalpbot", about = "Spot scalping bot with a trailing-band exit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trade live, one session per symbol.
    Trade {
        /// Symbols to trade, e.g. BANDUSDT.
        #[arg(required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value = "15m")]
        interval: String,
    },
    /// Replay historical candles through the live signal and exit logic.
    Backtest {
        symbol: String,
        #[arg(long, default_value = "15m")]
        interval: String,
        /// Candles to replay, including warmup.
        #[arg(long, default_value_t = 700)]
        candles: u32,
        /// Resolve exits against 1m bars instead of the coarse series.
        #[arg(long)]
        fine: bool,
        /// Run on generated data instead of the exchange:
        /// uptrend, downtrend, flat, or volatile.
        #[arg(long)]
        synthetic: Option<String>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "scalpbot=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Command::Trade { symbols, interval } => trade(settings, symbols, interval).await,
        Command::Backtest {
            symbol,
            interval,
            candles,
            fine,
            synthetic,
            seed,
        } => backtest(settings, symbol, interval, candles, fine, synthetic, seed).await,
    }
}

async fn trade(settings: Settings, symbols: Vec<String>, interval: String) -> anyhow::Result<()> {
    let api_key = std::env::var("BINANCE_API_KEY").context("BINANCE_API_KEY not set")?;
    let api_secret = std::env::var("BINANCE_API_SECRET").context("BINANCE_API_SECRET not set")?;
    let gateway = Arc::new(BinanceClient::new(api_key, api_secret));

    let all_filters = gateway.fetch_exchange_info().await?;
    info!(symbols = symbols.len(), %interval, "starting trade sessions");

    let mut sessions = JoinSet::new();
    for symbol in symbols {
        let filters = all_filters
            .get(&symbol)
            .cloned()
            .ok_or_else(|| scalpbot::BotError::UnknownSymbol(symbol.clone()))?;

        let (tx, rx) = mpsc::channel(256);
        let feed = TickFeed::new(
            gateway.clone(),
            symbol.clone(),
            interval.clone(),
            Duration::from_secs(settings.poll_secs),
        );
        tokio::spawn(feed.run(tx));

        let session = TradeSession::new(
            SessionConfig {
                symbol,
                interval: interval.clone(),
                trading_currency: settings.trading_currency.clone(),
                balance_limit: settings.balance_limit,
                window_size: settings.window_size,
                tick_rounds: settings.tick_rounds,
            },
            filters,
            settings.tracker,
            gateway.clone(),
        )?;
        sessions.spawn(session.start(rx));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, dropping feeds");
        }
        Some(finished) = sessions.join_next() => {
            match finished {
                Ok(Ok(session)) => info!(total_pnl = %session.total_pnl(), "session finished"),
                Ok(Err(e)) => error!(error = %e, "session failed"),
                Err(e) => error!(error = %e, "session task panicked"),
            }
        }
    }

    Ok(())
}

async fn backtest(
    settings: Settings,
    symbol: String,
    interval: String,
    candles: u32,
    fine: bool,
    synthetic: Option<String>,
    seed: u64,
) -> anyhow::Result<()> {
    let params = BacktestParams {
        tracker: settings.tracker,
        ..Default::default()
    };

    let report = if let Some(scenario) = synthetic {
        let scenario = parse_scenario(&scenario)?;
        let minutes = interval_minutes(&interval)?;
        let series =
            SyntheticDataGenerator::new(seed).generate(scenario, candles as usize, minutes);

        let runner = BacktestRunner::new(params)?;
        runner.run(&symbol, &interval, &series, &[])?
    } else {
        // Kline endpoints are public; no keys needed for a replay.
        let gateway = BinanceClient::new(String::new(), String::new());

        let filters = gateway.fetch_exchange_info().await?;
        let params = match filters.get(&symbol) {
            Some(f) => BacktestParams {
                price_decimals: f.price_decimals,
                ..params
            },
            None => params,
        };

        let series = gateway
            .fetch_candles(&symbol, &interval, FetchParams::limit(candles))
            .await?;

        let fine_bars = if fine && series.len() > params.warmup {
            fetch_fine(
                &gateway,
                &symbol,
                series[params.warmup].open_time,
                series[series.len() - 1].close_time,
            )
            .await?
        } else {
            Vec::new()
        };

        let runner = BacktestRunner::new(params)?;
        runner.run(&symbol, &interval, &series, &fine_bars)?
    };

    report.log_summary();
    Ok(())
}

/// Page through 1m klines covering `[start, end]`. Binance caps each
/// response at 1000 rows.
async fn fetch_fine<G: ExchangeGateway>(
    gateway: &G,
    symbol: &str,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Vec<Candle>> {
    let mut out: Vec<Candle> = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let batch = gateway
            .fetch_candles(
                symbol,
                "1m",
                FetchParams {
                    limit: Some(1000),
                    start_time: Some(cursor),
                    end_time: None,
                },
            )
            .await?;

        let Some(last) = batch.last() else { break };
        cursor = last.close_time + chrono::Duration::milliseconds(1);
        out.extend(batch);
    }

    Ok(out)
}

fn parse_scenario(raw: &str) -> anyhow::Result<MarketScenario> {
    match raw.to_ascii_lowercase().as_str() {
        "uptrend" => Ok(MarketScenario::Uptrend),
        "downtrend" => Ok(MarketScenario::Downtrend),
        "flat" => Ok(MarketScenario::Flat),
        "volatile" => Ok(MarketScenario::Volatile),
        other => bail!("unknown scenario '{other}': expected uptrend, downtrend, flat, or volatile"),
    }
}

fn interval_minutes(interval: &str) -> anyhow::Result<i64> {
    let (value, unit) = interval.split_at(interval.len().saturating_sub(1));
    let value: i64 = value
        .parse()
        .with_context(|| format!("bad interval '{interval}'"))?;
    match unit {
        "m" => Ok(value),
        "h" => Ok(value * 60),
        "d" => Ok(value * 60 * 24),
        _ => bail!("bad interval '{interval}': expected a suffix of m, h, or d"),
    }
}
