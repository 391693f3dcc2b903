//! Trading venue capability.
//!
//! The engine never talks to Polymarket directly; it goes through the
//! [`Venue`] trait so the same orchestrator runs against:
//! - `PolymarketVenue`: real discovery and order books, dry-run fills
//! - `SimulatedVenue`: scripted in-memory markets for tests
//!
//! ## Order Flow
//!
//! 1. Orchestrator asks for a [`Quote`] for every tracked market
//! 2. On an entry decision it calls `buy(market, side, budget)`
//! 3. On an exit decision it calls `sell(position)`
//! 4. An unfilled buy or unsuccessful sell leaves engine state unchanged
//!
//! Implementations serialise order operations per market with
//! [`MarketLocks`], so concurrent strategy instances sharing one venue never
//! interleave orders on the same market.

pub mod polymarket;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use poly_common::{CryptoAsset, MarketWindow, Outcome};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::strategy::position::Position;

pub use polymarket::{PolymarketVenue, PolymarketVenueConfig};
pub use simulated::SimulatedVenue;

/// Errors that can occur talking to the venue.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Venue call timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("No usable quote: {0}")]
    InvalidQuote(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl From<poly_market::DiscoveryError> for VenueError {
    fn from(e: poly_market::DiscoveryError) -> Self {
        VenueError::Http(e.to_string())
    }
}

impl From<poly_market::BookError> for VenueError {
    fn from(e: poly_market::BookError) -> Self {
        VenueError::Http(e.to_string())
    }
}

/// True for a usable outcome-token price: strictly between 0 and 1.
#[inline]
pub fn is_sane_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price < Decimal::ONE
}

/// Shares bought with `budget` at `ask`, rounded down to 2 decimals.
pub fn shares_for_budget(budget: Decimal, ask: Decimal) -> Decimal {
    if ask <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (budget / ask).round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Best bid/ask for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SideQuote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl SideQuote {
    pub fn new(bid: Option<Decimal>, ask: Option<Decimal>) -> Self {
        Self { bid, ask }
    }
}

/// Quote for both outcomes of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Quote {
    pub up: SideQuote,
    pub down: SideQuote,
    /// Winning outcome once the venue has resolved the market.
    pub resolved_winner: Option<Outcome>,
}

impl Quote {
    pub fn side(&self, outcome: Outcome) -> SideQuote {
        match outcome {
            Outcome::Up => self.up,
            Outcome::Down => self.down,
        }
    }

    /// Best bid for `outcome`, only if it is a sane price.
    pub fn bid(&self, outcome: Outcome) -> Option<Decimal> {
        self.side(outcome).bid.filter(|p| is_sane_price(*p))
    }

    /// Best ask for `outcome`, only if it is a sane price.
    pub fn ask(&self, outcome: Outcome) -> Option<Decimal> {
        self.side(outcome).ask.filter(|p| is_sane_price(*p))
    }
}

/// Result of a buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fill {
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: bool,
}

impl Fill {
    pub fn filled(price: Decimal, quantity: Decimal) -> Self {
        Self {
            price,
            quantity,
            filled: true,
        }
    }

    pub fn unfilled() -> Self {
        Self {
            price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            filled: false,
        }
    }
}

/// Result of a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SellFill {
    pub price: Decimal,
    pub pnl: Decimal,
    pub success: bool,
}

impl SellFill {
    pub fn sold(position: &Position, price: Decimal) -> Self {
        Self {
            price,
            pnl: position.pnl_at(price),
            success: true,
        }
    }

    pub fn failed() -> Self {
        Self {
            price: Decimal::ZERO,
            pnl: Decimal::ZERO,
            success: false,
        }
    }
}

/// Trading venue used by the orchestrator.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Markets for `asset` whose window has not ended.
    async fn discover_active_markets(
        &self,
        asset: CryptoAsset,
    ) -> Result<Vec<MarketWindow>, VenueError>;

    /// Top of book for both outcomes, plus the resolution if known.
    async fn quote(&self, market: &MarketWindow) -> Result<Quote, VenueError>;

    /// Spend up to `budget` USDC on `side`.
    async fn buy(
        &self,
        market: &MarketWindow,
        side: Outcome,
        budget: Decimal,
    ) -> Result<Fill, VenueError>;

    /// Sell the whole position at the best bid.
    async fn sell(&self, position: &Position) -> Result<SellFill, VenueError>;
}

/// Per-market async locks for serialising order operations.
#[derive(Debug, Default)]
pub struct MarketLocks {
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl MarketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for `market_id`; hold the guard for the whole order.
    pub fn get(&self, market_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(market_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop locks for markets no longer in `keep`.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) {
        self.locks.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
