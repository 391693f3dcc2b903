//! Risk management for open positions and new entries.
//!
//! - `exit`: per-position exit state machine (hard stop, ladder, expiry)
//! - `manipulation`: latched contradiction guard used by the exit machine
//! - `pnl`: daily-loss and losing-streak gate checked before every entry

pub mod exit;
pub mod manipulation;
pub mod pnl;

pub use exit::{
    ExitConfig, ExitContext, ExitDecision, ExitReason, PositionRiskManager, Settlement,
};
pub use manipulation::{GuardConfig, ManipulationGuard};
pub use pnl::{PnlRejectionReason, PnlRiskConfig, PnlRiskGate};
