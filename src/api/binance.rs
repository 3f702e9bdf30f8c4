use crate::api::{ExchangeGateway, FetchParams};
use crate::error::{BotError, Result};
use crate::models::{Candle, Fill, Quote, SymbolFilters};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

const BINANCE_API_BASE: &str = "https://api.binance.com";

type HmacSha256 = Hmac<Sha256>;

/// REST client for the Binance spot API.
///
/// The base URL is injectable so parsing can be tested against a local mock
/// server.
#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfoRaw>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfoRaw {
    symbol: String,
    status: String,
    filters: Vec<FilterRaw>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum FilterRaw {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price {
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    // Newer exchange-info payloads replaced MIN_NOTIONAL with NOTIONAL.
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TickerPriceRaw {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountInfoRaw {
    balances: Vec<BalanceRaw>,
}

#[derive(Debug, Deserialize)]
struct BalanceRaw {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponseRaw {
    executed_qty: Decimal,
    cummulative_quote_qty: Decimal,
    #[serde(default)]
    fills: Vec<OrderFillRaw>,
}

#[derive(Debug, Deserialize)]
struct OrderFillRaw {
    price: Decimal,
    qty: Decimal,
}

impl OrderResponseRaw {
    /// Actual execution price/quantity, preferring the first fill and
    /// falling back to the quote totals when fills are absent.
    fn into_fill(self) -> Result<Fill> {
        if let Some(first) = self.fills.into_iter().next() {
            return Ok(Fill {
                price: first.price,
                quantity: first.qty,
            });
        }
        if self.executed_qty.is_zero() {
            return Err(BotError::OrderFailed("order executed zero quantity".into()));
        }
        Ok(Fill {
            price: self.cummulative_quote_qty / self.executed_qty,
            quantity: self.executed_qty,
        })
    }
}

/// Decimal places implied by a filter step, e.g. "0.00100000" -> 3.
fn decimals_from_step(step: Decimal) -> u32 {
    step.normalize().scale()
}

// ============== Implementation ==============

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(api_key, api_secret, BINANCE_API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, api_secret: String, base_url: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
            api_secret,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &str) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{params}&timestamp={timestamp}")
        };
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn free_balance(&self, asset: &str) -> Result<Decimal> {
        let url = format!(
            "{}/api/v3/account?{}",
            self.base_url,
            self.signed_query("")
        );

        let account: AccountInfoRaw = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        account
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .ok_or_else(|| BotError::Parse(format!("no balance entry for {asset}")))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: Decimal,
    ) -> Result<Fill> {
        let params = format!("symbol={symbol}&side={side}&type=MARKET&quantity={quantity}");
        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(&params));

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::OrderFailed(format!(
                "{side} {symbol} rejected: {body}"
            )));
        }

        let order: OrderResponseRaw = response.json().await?;
        order.into_fill()
    }

    fn candle_from_kline(row: &serde_json::Value) -> Result<Candle> {
        let field = |i: usize| {
            row.get(i)
                .ok_or_else(|| BotError::Parse(format!("kline row missing field {i}")))
        };

        let millis = |v: &serde_json::Value| {
            v.as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .ok_or_else(|| BotError::Parse(format!("bad kline timestamp: {v}")))
        };

        let price = |v: &serde_json::Value| {
            v.as_str()
                .and_then(|s| s.parse::<Decimal>().ok())
                .ok_or_else(|| BotError::Parse(format!("bad kline price: {v}")))
        };

        Ok(Candle {
            open_time: millis(field(0)?)?,
            open: price(field(1)?)?,
            high: price(field(2)?)?,
            low: price(field(3)?)?,
            close: price(field(4)?)?,
            close_time: millis(field(6)?)?,
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn fetch_exchange_info(&self) -> Result<HashMap<String, SymbolFilters>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let info: ExchangeInfoResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut filters = HashMap::new();
        for symbol in info.symbols {
            if symbol.status != "TRADING" {
                continue;
            }

            let mut entry = SymbolFilters::unrestricted();
            for filter in symbol.filters {
                match filter {
                    FilterRaw::Price {
                        min_price,
                        max_price,
                        tick_size,
                    } => {
                        entry.min_price = min_price;
                        entry.max_price = max_price;
                        entry.price_decimals = decimals_from_step(tick_size);
                    }
                    FilterRaw::LotSize {
                        min_qty,
                        max_qty,
                        step_size,
                    } => {
                        entry.min_qty = min_qty;
                        entry.max_qty = max_qty;
                        entry.qty_decimals = decimals_from_step(step_size);
                    }
                    FilterRaw::MinNotional { min_notional }
                    | FilterRaw::Notional { min_notional } => {
                        entry.min_notional = min_notional;
                    }
                    FilterRaw::Other => {}
                }
            }
            filters.insert(symbol.symbol, entry);
        }

        Ok(filters)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        params: FetchParams,
    ) -> Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={interval}",
            self.base_url
        );
        if let Some(limit) = params.limit {
            url.push_str(&format!("&limit={limit}"));
        }
        if let Some(start) = params.start_time {
            url.push_str(&format!("&startTime={}", start.timestamp_millis()));
        }
        if let Some(end) = params.end_time {
            url.push_str(&format!("&endTime={}", end.timestamp_millis()));
        }

        let rows: Vec<serde_json::Value> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        rows.iter().map(Self::candle_from_kline).collect()
    }

    async fn fetch_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.base_url);
        let ticker: TickerPriceRaw = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ticker.price)
    }

    async fn calculate_buy_quantity(
        &self,
        symbol: &str,
        trading_currency: &str,
        balance_limit: Decimal,
        filters: &SymbolFilters,
    ) -> Result<Quote> {
        let free = self.free_balance(trading_currency).await?;
        let buying_balance = free.min(balance_limit);

        let price = self
            .fetch_price(symbol)
            .await?
            .round_dp(filters.price_decimals);
        if price.is_zero() {
            return Err(BotError::Parse(format!("zero price for {symbol}")));
        }

        // Floor to the lot step so the order is never over the balance.
        let quantity = (buying_balance / price)
            .round_dp_with_strategy(filters.qty_decimals, RoundingStrategy::ToZero)
            .clamp(filters.min_qty, filters.max_qty);

        Ok(Quote { price, quantity })
    }

    async fn market_buy(&self, symbol: &str, quantity: Decimal) -> Result<Fill> {
        self.place_market_order(symbol, "BUY", quantity).await
    }

    async fn market_sell(&self, symbol: &str, quantity: Decimal) -> Result<Fill> {
        self.place_market_order(symbol, "SELL", quantity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client(base_url: String) -> BinanceClient {
        BinanceClient::with_base_url("key".into(), "secret".into(), base_url)
    }

    #[test]
    fn step_sizes_imply_decimals() {
        assert_eq!(decimals_from_step(dec!(0.00010000)), 4);
        assert_eq!(decimals_from_step(dec!(0.001)), 3);
        assert_eq!(decimals_from_step(dec!(1.00000000)), 0);
    }

    #[test]
    fn signature_is_stable_hex() {
        let c = client("http://unused".into());
        let sig = c.sign("symbol=BANDUSDT&timestamp=1000");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, c.sign("symbol=BANDUSDT&timestamp=1000"));
    }

    #[test]
    fn order_response_prefers_fill_price() {
        let order = OrderResponseRaw {
            executed_qty: dec!(8),
            cummulative_quote_qty: dec!(10.692),
            fills: vec![OrderFillRaw {
                price: dec!(1.3365),
                qty: dec!(8),
            }],
        };
        let fill = order.into_fill().unwrap();
        assert_eq!(fill.price, dec!(1.3365));
        assert_eq!(fill.quantity, dec!(8));
    }

    #[test]
    fn order_response_falls_back_to_quote_totals() {
        let order = OrderResponseRaw {
            executed_qty: dec!(8),
            cummulative_quote_qty: dec!(10.692),
            fills: vec![],
        };
        let fill = order.into_fill().unwrap();
        assert_eq!(fill.price, dec!(1.33650));
        assert_eq!(fill.quantity, dec!(8));
    }

    #[tokio::test]
    async fn parses_exchange_info_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                  "symbols": [
                    {
                      "symbol": "BANDUSDT",
                      "status": "TRADING",
                      "filters": [
                        {"filterType": "PRICE_FILTER", "minPrice": "0.00010000", "maxPrice": "10000.00000000", "tickSize": "0.00010000"},
                        {"filterType": "LOT_SIZE", "minQty": "0.01000000", "maxQty": "90000.00000000", "stepSize": "0.01000000"},
                        {"filterType": "MIN_NOTIONAL", "minNotional": "10.00000000"},
                        {"filterType": "PERCENT_PRICE", "multiplierUp": "5", "multiplierDown": "0.2", "avgPriceMins": 5}
                      ]
                    },
                    {
                      "symbol": "HALTEDUSDT",
                      "status": "BREAK",
                      "filters": []
                    }
                  ]
                }"#,
            )
            .create_async()
            .await;

        let filters = client(server.url()).fetch_exchange_info().await.unwrap();
        mock.assert_async().await;

        assert_eq!(filters.len(), 1);
        let band = &filters["BANDUSDT"];
        assert_eq!(band.min_notional, dec!(10));
        assert_eq!(band.price_decimals, 4);
        assert_eq!(band.qty_decimals, 2);
        assert_eq!(band.min_qty, dec!(0.01));
    }

    #[tokio::test]
    async fn parses_kline_rows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                  [1625000000000, "5.1000", "5.3000", "5.0000", "5.2000", "1000.0", 1625000899999, "0", 0, "0", "0", "0"],
                  [1625000900000, "5.2000", "5.4000", "5.1000", "5.3500", "1000.0", 1625001799999, "0", 0, "0", "0", "0"]
                ]"#,
            )
            .create_async()
            .await;

        let candles = client(server.url())
            .fetch_candles("BANDUSDT", "15m", FetchParams::limit(2))
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(5.1));
        assert_eq!(candles[0].high, dec!(5.3));
        assert_eq!(candles[1].close, dec!(5.35));
        assert!(candles[0].close_time < candles[1].open_time);
    }

    #[tokio::test]
    async fn fetch_price_parses_ticker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/price")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "BANDUSDT".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"symbol": "BANDUSDT", "price": "5.2340"}"#)
            .create_async()
            .await;

        let price = client(server.url()).fetch_price("BANDUSDT").await.unwrap();
        mock.assert_async().await;
        assert_eq!(price, dec!(5.234));
    }
}
