//! Exchange wire DTOs.
//!
//! Decimal-valued fields use [`decimal_str`]/[`opt_decimal_str`] throughout;
//! no `f64` price or quantity anywhere in this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{decimal_str, opt_decimal_str, Price, Quantity};

/// A network a crypto asset can move over (e.g. a chain). The exchange's own
/// API exposes two overlapping identifiers for this; both are folded into
/// this single string-valued type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetNetwork(pub String);

impl AssetNetwork {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AssetNetwork {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A 4xx wire error body carrying the exchange's own typed code, decoded
/// into [`crate::error::Error::Domain`].
#[derive(Debug, Clone, Deserialize)]
pub struct WireErrorBody {
    pub code: String,
    pub message: String,
}

/// `side ∈ {buy, sell}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// `type ∈ {market, limit, stoplimit, post-only}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
    PostOnly,
}

/// OHLCV candle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleResolution {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl CandleResolution {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            CandleResolution::OneMinute => "1m",
            CandleResolution::FifteenMinutes => "15m",
            CandleResolution::OneHour => "1h",
            CandleResolution::ThreeHours => "3h",
            CandleResolution::OneDay => "1d",
            CandleResolution::OneWeek => "1w",
            CandleResolution::OneMonth => "1M",
        }
    }
}

/// Symbol metadata for a tradeable symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolMetadata {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    #[serde(with = "decimal_str")]
    pub min_quantity: Quantity,
    #[serde(with = "decimal_str")]
    pub price_increment: Price,
    #[serde(with = "decimal_str")]
    pub quantity_increment: Quantity,
    pub active: bool,
}

/// A ticker snapshot returned by the REST tickers endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPayload {
    pub symbol: String,
    #[serde(with = "decimal_str")]
    pub bid: Price,
    #[serde(with = "decimal_str")]
    pub ask: Price,
    #[serde(with = "decimal_str")]
    pub last: Price,
    #[serde(with = "decimal_str")]
    pub volume_24h: Quantity,
    pub timestamp: DateTime<Utc>,
}

/// A `(price, quantity)` pair, as returned on the wire for an order book
/// level (distinct from [`crate::orderbook::Level`], which is the in-memory
/// representation the engine mutates).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireLevel {
    #[serde(with = "decimal_str")]
    pub price: Price,
    #[serde(with = "decimal_str")]
    pub quantity: Quantity,
}

/// A full order book response (`GET orderbook?symbol=...&depth=...`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookPayload {
    pub symbol: String,
    pub last_update_id: u64,
    pub bids: Vec<WireLevel>,
    pub asks: Vec<WireLevel>,
}

/// A single public trade print.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayload {
    pub id: u64,
    pub symbol: String,
    #[serde(with = "decimal_str")]
    pub price: Price,
    #[serde(with = "decimal_str")]
    pub quantity: Quantity,
    pub side: OrderSide,
    pub timestamp: DateTime<Utc>,
}

/// An OHLCV candle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "decimal_str")]
    pub open: Price,
    #[serde(with = "decimal_str")]
    pub high: Price,
    #[serde(with = "decimal_str")]
    pub low: Price,
    #[serde(with = "decimal_str")]
    pub close: Price,
    #[serde(with = "decimal_str")]
    pub volume: Quantity,
}

/// A per-asset account balance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub asset: String,
    #[serde(with = "decimal_str")]
    pub available: Quantity,
    #[serde(with = "decimal_str")]
    pub locked: Quantity,
}

/// A futures/margin position.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    #[serde(with = "decimal_str")]
    pub quantity: Quantity,
    #[serde(with = "decimal_str")]
    pub entry_price: Price,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub liquidation_price: Option<Price>,
}

/// Per-symbol fee tier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingFee {
    pub symbol: String,
    pub maker_fee_pct: f64,
    pub taker_fee_pct: f64,
}

/// The body a caller sends to place an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub cost: Option<Quantity>,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub stop_price: Option<Price>,
}

/// An order as returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: String,
    #[serde(with = "decimal_str")]
    pub filled_quantity: Quantity,
    #[serde(with = "opt_decimal_str")]
    #[serde(default)]
    pub average_price: Option<Price>,
    pub placed_at: DateTime<Utc>,
}

/// A deposit address for a given asset/network.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddress {
    pub asset: String,
    pub network: AssetNetwork,
    pub address: String,
    pub tag: Option<String>,
}

/// A deposit record (`GET deposits`, paginated).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: String,
    pub asset: String,
    #[serde(with = "decimal_str")]
    pub amount: Quantity,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// The body a caller sends to withdraw funds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub asset: String,
    pub network: AssetNetwork,
    pub address: String,
    pub tag: Option<String>,
    #[serde(with = "decimal_str")]
    pub amount: Quantity,
}

/// A withdrawal record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub asset: String,
    pub network: AssetNetwork,
    #[serde(with = "decimal_str")]
    pub amount: Quantity,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Per-asset withdrawal limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawLimits {
    pub asset: String,
    #[serde(with = "decimal_str")]
    pub daily_remaining: Quantity,
    #[serde(with = "decimal_str")]
    pub minimum: Quantity,
}

/// A saved bank account for fiat withdrawals.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: String,
    pub bank_name: String,
    pub account_number_last4: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_payload_decodes_decimal_strings() {
        let json = r#"{
            "symbol": "BTC-BRL",
            "bid": "350000.50",
            "ask": "350010.00",
            "last": "350005.00",
            "volume24h": "12.3456",
            "timestamp": "2026-01-01T00:00:00Z"
        }"#;
        let ticker: TickerPayload = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.bid.to_string(), "350000.50");
        assert_eq!(ticker.ask.to_string(), "350010.00");
    }

    #[test]
    fn place_order_request_omits_absent_fields() {
        let req = PlaceOrderRequest {
            symbol: "BTC-BRL".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: Some("0.01".parse().unwrap()),
            cost: None,
            price: None,
            stop_price: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["quantity"], serde_json::json!("0.01"));
        assert!(json["cost"].is_null());
    }

    #[test]
    fn order_book_payload_decodes_levels() {
        let json = r#"{
            "symbol": "BTC-BRL",
            "lastUpdateId": 10,
            "bids": [{"price": "100", "quantity": "1"}],
            "asks": [{"price": "101", "quantity": "2"}]
        }"#;
        let book: OrderBookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(book.bids[0].price.to_string(), "100");
        assert_eq!(book.asks[0].quantity.to_string(), "2");
    }

    #[test]
    fn asset_network_is_a_transparent_string() {
        let network: AssetNetwork = "ERC20".into();
        let json = serde_json::to_string(&network).unwrap();
        assert_eq!(json, "\"ERC20\"");
    }
}
