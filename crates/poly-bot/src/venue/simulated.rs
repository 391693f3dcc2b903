//! Scripted in-memory venue.
//!
//! Tests (and offline replays) set markets and quotes by hand, then let the
//! orchestrator trade against them.
//!
//! ## Simulation Features
//!
//! - Buys fill at the scripted best ask, sells at the scripted best bid
//! - Failure injection: unfilled buys, failed sells, transport errors
//! - Every fill is recorded for later inspection

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use poly_common::{CryptoAsset, MarketWindow, Outcome};
use rust_decimal::Decimal;
use tracing::debug;

use super::{shares_for_budget, Fill, MarketLocks, Quote, SellFill, Venue, VenueError};
use crate::strategy::position::Position;

/// A buy recorded by the simulated venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyRecord {
    pub market_id: String,
    pub side: Outcome,
    pub budget: Decimal,
    pub fill: Fill,
}

/// A sell recorded by the simulated venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellRecord {
    pub market_id: String,
    pub side: Outcome,
    pub quantity: Decimal,
    pub fill: SellFill,
}

#[derive(Debug, Default)]
struct SimState {
    markets: Vec<MarketWindow>,
    quotes: HashMap<String, Quote>,
    reject_buys: bool,
    fail_sells: bool,
    quote_error: bool,
    buys: Vec<BuyRecord>,
    sells: Vec<SellRecord>,
    quote_calls: u64,
}

/// In-memory venue driven by test code.
#[derive(Debug, Default)]
pub struct SimulatedVenue {
    state: RwLock<SimState>,
    locks: MarketLocks,
}

impl SimulatedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_market(&self, market: MarketWindow) {
        let mut state = self.state.write();
        state.markets.retain(|m| m.id != market.id);
        state.markets.push(market);
    }

    pub fn remove_market(&self, market_id: &str) {
        self.state.write().markets.retain(|m| m.id != market_id);
    }

    pub fn set_quote(&self, market_id: &str, quote: Quote) {
        self.state.write().quotes.insert(market_id.to_string(), quote);
    }

    /// Update one side's bid/ask, keeping the rest of the quote.
    pub fn set_side(
        &self,
        market_id: &str,
        side: Outcome,
        bid: Option<Decimal>,
        ask: Option<Decimal>,
    ) {
        let mut state = self.state.write();
        let quote = state.quotes.entry(market_id.to_string()).or_default();
        let target = match side {
            Outcome::Up => &mut quote.up,
            Outcome::Down => &mut quote.down,
        };
        target.bid = bid;
        target.ask = ask;
    }

    pub fn resolve(&self, market_id: &str, winner: Outcome) {
        let mut state = self.state.write();
        state
            .quotes
            .entry(market_id.to_string())
            .or_default()
            .resolved_winner = Some(winner);
    }

    /// Make every buy come back unfilled.
    pub fn set_reject_buys(&self, reject: bool) {
        self.state.write().reject_buys = reject;
    }

    /// Make every sell come back unsuccessful.
    pub fn set_fail_sells(&self, fail: bool) {
        self.state.write().fail_sells = fail;
    }

    /// Make quote requests fail with a transport error.
    pub fn set_quote_error(&self, fail: bool) {
        self.state.write().quote_error = fail;
    }

    pub fn buys(&self) -> Vec<BuyRecord> {
        self.state.read().buys.clone()
    }

    pub fn sells(&self) -> Vec<SellRecord> {
        self.state.read().sells.clone()
    }

    pub fn quote_calls(&self) -> u64 {
        self.state.read().quote_calls
    }
}

#[async_trait]
impl Venue for SimulatedVenue {
    async fn discover_active_markets(
        &self,
        asset: CryptoAsset,
    ) -> Result<Vec<MarketWindow>, VenueError> {
        Ok(self
            .state
            .read()
            .markets
            .iter()
            .filter(|m| m.asset == asset)
            .cloned()
            .collect())
    }

    async fn quote(&self, market: &MarketWindow) -> Result<Quote, VenueError> {
        let mut state = self.state.write();
        state.quote_calls += 1;
        let resolved_winner = state
            .quotes
            .get(&market.id)
            .and_then(|q| q.resolved_winner);
        if state.quote_error {
            // Books can vanish after settlement while the resolution stays readable.
            if resolved_winner.is_some() {
                return Ok(Quote {
                    resolved_winner,
                    ..Quote::default()
                });
            }
            return Err(VenueError::Http("simulated transport failure".to_string()));
        }
        Ok(state.quotes.get(&market.id).copied().unwrap_or_default())
    }

    async fn buy(
        &self,
        market: &MarketWindow,
        side: Outcome,
        budget: Decimal,
    ) -> Result<Fill, VenueError> {
        let lock = self.locks.get(&market.id);
        let _guard = lock.lock().await;

        let mut state = self.state.write();
        let ask = state
            .quotes
            .get(&market.id)
            .and_then(|q| q.ask(side));

        let fill = match ask {
            Some(ask) if !state.reject_buys => {
                let quantity = shares_for_budget(budget, ask);
                if quantity > Decimal::ZERO {
                    Fill::filled(ask, quantity)
                } else {
                    Fill::unfilled()
                }
            }
            _ => Fill::unfilled(),
        };

        debug!(market_id = %market.id, %side, ?fill, "Simulated buy");
        state.buys.push(BuyRecord {
            market_id: market.id.clone(),
            side,
            budget,
            fill,
        });
        Ok(fill)
    }

    async fn sell(&self, position: &Position) -> Result<SellFill, VenueError> {
        let lock = self.locks.get(&position.market.id);
        let _guard = lock.lock().await;

        let mut state = self.state.write();
        let bid = state
            .quotes
            .get(&position.market.id)
            .and_then(|q| q.bid(position.side));

        let fill = match bid {
            Some(bid) if !state.fail_sells => SellFill::sold(position, bid),
            _ => SellFill::failed(),
        };

        debug!(market_id = %position.market.id, side = %position.side, ?fill, "Simulated sell");
        state.sells.push(SellRecord {
            market_id: position.market.id.clone(),
            side: position.side,
            quantity: position.quantity,
            fill,
        });
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn market(id: &str) -> MarketWindow {
        let start = Utc::now();
        MarketWindow {
            id: id.to_string(),
            asset: CryptoAsset::Btc,
            question: "Bitcoin Up or Down".to_string(),
            up_token_id: format!("{id}-up"),
            down_token_id: format!("{id}-down"),
            reference_strike: None,
            window_start: start,
            window_end: start + Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn test_buy_fills_at_ask() {
        let venue = SimulatedVenue::new();
        let m = market("m1");
        venue.add_market(m.clone());
        venue.set_side("m1", Outcome::Up, Some(dec!(0.54)), Some(dec!(0.55)));

        let fill = venue.buy(&m, Outcome::Up, dec!(50)).await.unwrap();
        assert!(fill.filled);
        assert_eq!(fill.price, dec!(0.55));
        assert_eq!(fill.quantity, dec!(90.90));
        assert_eq!(venue.buys().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_without_ask_is_unfilled() {
        let venue = SimulatedVenue::new();
        let m = market("m1");
        let fill = venue.buy(&m, Outcome::Down, dec!(50)).await.unwrap();
        assert!(!fill.filled);
    }

    #[tokio::test]
    async fn test_rejected_buys() {
        let venue = SimulatedVenue::new();
        let m = market("m1");
        venue.set_side("m1", Outcome::Up, Some(dec!(0.54)), Some(dec!(0.55)));
        venue.set_reject_buys(true);
        assert!(!venue.buy(&m, Outcome::Up, dec!(50)).await.unwrap().filled);
    }

    #[tokio::test]
    async fn test_sell_at_bid_and_failure() {
        let venue = SimulatedVenue::new();
        let m = market("m1");
        venue.set_side("m1", Outcome::Up, Some(dec!(0.61)), Some(dec!(0.62)));
        let position = Position::open("s1", m, Outcome::Up, dec!(0.55), dec!(90.90), Utc::now());

        let fill = venue.sell(&position).await.unwrap();
        assert!(fill.success);
        assert_eq!(fill.price, dec!(0.61));
        assert_eq!(fill.pnl, dec!(5.4540));

        venue.set_fail_sells(true);
        assert!(!venue.sell(&position).await.unwrap().success);
        assert_eq!(venue.sells().len(), 2);
    }

    #[tokio::test]
    async fn test_discovery_filters_asset_and_quote_error() {
        let venue = SimulatedVenue::new();
        venue.add_market(market("m1"));
        let mut eth = market("m2");
        eth.asset = CryptoAsset::Eth;
        venue.add_market(eth);

        let found = venue.discover_active_markets(CryptoAsset::Btc).await.unwrap();
        assert_eq!(found.len(), 1);

        venue.set_quote_error(true);
        assert!(venue.quote(&found[0]).await.is_err());
        assert_eq!(venue.quote_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolution_reported_while_books_fail() {
        let venue = SimulatedVenue::new();
        let m = market("m1");
        venue.set_side("m1", Outcome::Up, Some(dec!(0.61)), Some(dec!(0.62)));
        venue.set_quote_error(true);
        assert!(venue.quote(&m).await.is_err());

        venue.resolve("m1", Outcome::Down);
        let quote = venue.quote(&m).await.unwrap();
        assert_eq!(quote.resolved_winner, Some(Outcome::Down));
        assert_eq!(quote.bid(Outcome::Up), None);
    }
}
