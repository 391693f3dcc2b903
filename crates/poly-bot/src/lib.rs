//! Polymarket 5-minute up/down decision engine.
//!
//! Watches a Binance reference price, detects directional moves inside each
//! 5-minute BTC window, enters the matching outcome token on Polymarket, and
//! manages the position through a risk ladder until exit or expiry.
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `clock`: Injectable time source and local-day/hour bucketing
//! - `feed`: Bounded tick buffer and the Binance trade stream
//! - `venue`: Trading venue capability (Polymarket dry-run, simulated)
//! - `strategy`: Move detectors, window lifecycle, positions, engine loop
//! - `risk`: Exit state machine, manipulation guard, session pnl gate
//! - `session`: Per-strategy statistics
//! - `state`: Shutdown and trading control flags

pub mod clock;
pub mod config;
pub mod feed;
pub mod risk;
pub mod session;
pub mod state;
pub mod strategy;
pub mod venue;

pub use clock::{Clock, LocalCalendar, ManualClock, SystemClock};
pub use config::{BotConfig, StrategyConfig, TradingMode};
pub use feed::{PriceFeed, TickBuffer};
pub use state::ControlFlags;
pub use strategy::{EngineConfig, EngineSnapshot, StrategyEngine};
pub use venue::{Quote, SimulatedVenue, Venue, VenueError};
