//! Session tracking for a strategy instance.
//!
//! - **Statistics**: signal, trade, and exit counters plus realised pnl
//!   bucketed by local day and hour

pub mod stats;

pub use stats::{StatsAggregator, StatsSnapshot};
