//! Strategy logic for the 5-minute up/down engine.
//!
//! - `signal`: pure move detectors over the tick buffer
//! - `window`: per-market lifecycle and entry decision
//! - `position`: open position state and reporting records
//! - `engine`: the evaluation loop tying feed, venue, and risk together
//!
//! Spike, momentum, and late-leader strategies are profiles of the same
//! engine, selected by `StrategyConfig::entry_rule`.

pub mod engine;
pub mod position;
pub mod signal;
pub mod window;

pub use engine::{EngineConfig, EngineSnapshot, StrategyEngine, RECENT_CLOSED};
pub use position::{ClosedPositionRecord, Position, PositionSnapshot, RiskMode};
pub use signal::{detect, detect_momentum, detect_spike, price_at, DetectorKind, MoveSignal};
pub use window::{
    EntryRule, EntrySignal, TrackerConfig, WindowAction, WindowInputs, WindowPhase, WindowTracker,
};
