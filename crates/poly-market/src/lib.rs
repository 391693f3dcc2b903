//! Polymarket integration library.
//!
//! Provides the HTTP side of Polymarket used by `poly-bot`:
//! - Market discovery and resolution lookups via the Gamma API
//! - Top-of-book reads via the CLOB REST API

pub mod book;
pub mod discovery;
pub mod types;

pub use book::{BookClient, BookError, TopOfBook, CLOB_API_URL};
pub use discovery::{
    parse_market_window, parse_resolution, parse_strike, DiscoveryConfig, DiscoveryError,
    MarketDiscovery, GAMMA_API_URL,
};
pub use types::{BookResponse, GammaEvent, GammaMarket, OrderSummary, TokenIds};
