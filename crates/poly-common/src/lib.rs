//! Shared types for the Polymarket 5-minute momentum bot.
//!
//! This crate contains:
//! - Reference-feed samples (`Tick`)
//! - Market identity (`MarketWindow`) and outcome sides (`Outcome`)
//! - Asset and window-duration enums used by discovery and the feed

pub mod types;

pub use types::*;
