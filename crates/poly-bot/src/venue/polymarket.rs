//! Polymarket venue with real market data and dry-run fills.
//!
//! Discovery and quotes come from the live Gamma and CLOB REST APIs. Orders
//! never leave the process: a buy fills at the current best ask and a sell at
//! the current best bid, and both are logged with a `[DRY]` prefix.
//!
//! ## Limitations
//!
//! - Does not simulate market impact or partial fills
//! - Assumes the whole size is available at the top of book

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use poly_common::{CryptoAsset, MarketWindow, Outcome, WindowDuration};
use poly_market::{BookClient, DiscoveryConfig, MarketDiscovery, CLOB_API_URL, GAMMA_API_URL};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::{
    is_sane_price, shares_for_budget, Fill, MarketLocks, Quote, SellFill, SideQuote, Venue,
    VenueError,
};
use crate::clock::Clock;
use crate::strategy::position::Position;

/// Configuration for [`PolymarketVenue`].
#[derive(Debug, Clone)]
pub struct PolymarketVenueConfig {
    pub asset: CryptoAsset,
    pub duration: WindowDuration,
    pub gamma_url: String,
    pub clob_url: String,
    pub request_timeout: Duration,
}

impl Default for PolymarketVenueConfig {
    fn default() -> Self {
        Self {
            asset: CryptoAsset::Btc,
            duration: WindowDuration::FiveMin,
            gamma_url: GAMMA_API_URL.to_string(),
            clob_url: CLOB_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Polymarket-backed venue that simulates its own fills.
pub struct PolymarketVenue {
    discovery: MarketDiscovery,
    books: BookClient,
    clock: Arc<dyn Clock>,
    locks: MarketLocks,
}

impl PolymarketVenue {
    pub fn new(config: PolymarketVenueConfig, clock: Arc<dyn Clock>) -> Result<Self, VenueError> {
        let discovery = MarketDiscovery::new(DiscoveryConfig {
            asset: config.asset,
            duration: config.duration,
            gamma_url: config.gamma_url,
            request_timeout: config.request_timeout,
        })?;
        let books = BookClient::new(config.clob_url, config.request_timeout)?;

        Ok(Self {
            discovery,
            books,
            clock,
            locks: MarketLocks::new(),
        })
    }

    async fn side_quote(&self, token_id: &str) -> Result<SideQuote, VenueError> {
        let top = self.books.top_of_book(token_id).await?;
        Ok(SideQuote::new(top.best_bid, top.best_ask))
    }
}

#[async_trait]
impl Venue for PolymarketVenue {
    async fn discover_active_markets(
        &self,
        asset: CryptoAsset,
    ) -> Result<Vec<MarketWindow>, VenueError> {
        let configured = self.discovery.config().asset;
        if asset != configured {
            return Err(VenueError::Unsupported(format!(
                "venue configured for {}, asked for {}",
                configured, asset
            )));
        }

        let markets = self.discovery.discover_active(self.clock.now()).await?;
        let live: Vec<String> = markets.iter().map(|m| m.id.clone()).collect();
        self.locks.retain(|id| live.iter().any(|m| m == id));
        Ok(markets)
    }

    async fn quote(&self, market: &MarketWindow) -> Result<Quote, VenueError> {
        let (up, down) = tokio::join!(
            self.side_quote(&market.up_token_id),
            self.side_quote(&market.down_token_id)
        );

        // Only ask for the resolution after the window has ended.
        let resolved_winner = if market.is_expired(self.clock.now()) {
            match self.discovery.fetch_resolution(&market.id).await {
                Ok(winner) => winner,
                Err(e) => {
                    debug!(market_id = %market.id, error = %e, "Resolution lookup failed");
                    None
                }
            }
        } else {
            None
        };

        // Settled markets lose their books; the resolution alone is a quote.
        if resolved_winner.is_some() {
            if let Err(e) = up.as_ref().and(down.as_ref()) {
                debug!(market_id = %market.id, error = %e, "Books gone after resolution");
            }
            return Ok(Quote {
                up: up.unwrap_or_default(),
                down: down.unwrap_or_default(),
                resolved_winner,
            });
        }

        Ok(Quote {
            up: up?,
            down: down?,
            resolved_winner,
        })
    }

    async fn buy(
        &self,
        market: &MarketWindow,
        side: Outcome,
        budget: Decimal,
    ) -> Result<Fill, VenueError> {
        let lock = self.locks.get(&market.id);
        let _guard = lock.lock().await;

        let book = self.side_quote(market.token_id(side)).await?;
        let Some(ask) = book.ask.filter(|p| is_sane_price(*p)) else {
            warn!(market_id = %market.id, %side, "[DRY] BUY skipped: no ask");
            return Ok(Fill::unfilled());
        };

        let quantity = shares_for_budget(budget, ask);
        if quantity <= Decimal::ZERO {
            return Err(VenueError::Rejected(format!(
                "budget {} buys no shares at {}",
                budget, ask
            )));
        }

        info!(
            market_id = %market.id,
            %side,
            price = %ask,
            %quantity,
            "[DRY] BUY {} {} @ {}",
            quantity,
            side,
            ask
        );
        Ok(Fill::filled(ask, quantity))
    }

    async fn sell(&self, position: &Position) -> Result<SellFill, VenueError> {
        let lock = self.locks.get(&position.market.id);
        let _guard = lock.lock().await;

        let book = self.side_quote(position.token_id()).await?;
        let Some(bid) = book.bid.filter(|p| is_sane_price(*p)) else {
            warn!(market_id = %position.market.id, side = %position.side, "[DRY] SELL failed: no bid");
            return Ok(SellFill::failed());
        };

        let fill = SellFill::sold(position, bid);
        info!(
            market_id = %position.market.id,
            side = %position.side,
            price = %bid,
            pnl = %fill.pnl,
            "[DRY] SELL {} {} @ {}",
            position.quantity,
            position.side,
            bid
        );
        Ok(fill)
    }
}
