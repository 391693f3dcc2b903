//! Wire types for Polymarket HTTP APIs.
//!
//! Gamma (discovery) and CLOB REST (order book) response shapes.

use serde::Deserialize;

/// Market data from Gamma API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    pub id: Option<String>,
    pub question: Option<String>,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    /// Token IDs as JSON string array: `["123", "456"]`
    pub clob_token_ids: Option<String>,
    /// Outcomes as JSON string array: `["Up", "Down"]`
    pub outcomes: Option<String>,
    /// Outcome prices as JSON string array: `["1", "0"]` once resolved.
    pub outcome_prices: Option<String>,
    pub end_date: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
}

/// Event data from Gamma API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    pub id: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub end_date: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    pub markets: Option<Vec<GammaMarket>>,
}

/// Parsed token IDs for a market's two outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIds {
    pub up_token_id: String,
    pub down_token_id: String,
}

/// Orderbook level from the CLOB `/book` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderSummary {
    pub price: String,
    pub size: String,
}

/// Full order book for one token from the CLOB `/book` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BookResponse {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<OrderSummary>,
    #[serde(default)]
    pub asks: Vec<OrderSummary>,
}
