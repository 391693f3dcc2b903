//! CLOB order-book reads via the Polymarket REST API.
//!
//! Only the top of book is needed by the trading engine, so the client
//! fetches the `/book` snapshot for a token and reduces it to best bid/ask.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::types::{BookResponse, OrderSummary};

/// CLOB REST base URL.
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Errors from order-book reads.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CLOB API returned status {0}")]
    Status(u16),
}

/// Best bid and ask for a single outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopOfBook {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

impl TopOfBook {
    /// Reduce a full book to its best levels.
    ///
    /// Levels with unparseable or non-positive prices or sizes are ignored.
    pub fn from_book(book: &BookResponse) -> Self {
        Self {
            best_bid: parse_levels(&book.bids).max(),
            best_ask: parse_levels(&book.asks).min(),
        }
    }
}

fn parse_levels(levels: &[OrderSummary]) -> impl Iterator<Item = Decimal> + '_ {
    levels.iter().filter_map(|level| {
        let price: Decimal = level.price.parse().ok()?;
        let size: Decimal = level.size.parse().ok()?;
        (price > Decimal::ZERO && size > Decimal::ZERO).then_some(price)
    })
}

/// REST client for CLOB order-book snapshots.
#[derive(Clone)]
pub struct BookClient {
    http: Client,
    base_url: String,
}

impl BookClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BookError> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch the top of book for one outcome token.
    pub async fn top_of_book(&self, token_id: &str) -> Result<TopOfBook, BookError> {
        let url = format!("{}/book", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BookError::Status(response.status().as_u16()));
        }

        let book: BookResponse = response.json().await?;
        let top = TopOfBook::from_book(&book);
        debug!(
            token_id,
            best_bid = ?top.best_bid,
            best_ask = ?top.best_ask,
            "Fetched book"
        );
        Ok(top)
    }
}
