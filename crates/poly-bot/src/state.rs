//! Process-wide control flags shared by the feed and every strategy engine.
//!
//! Plain atomics: engines read them once per cycle, `main` and signal
//! handlers write them.

use std::sync::atomic::{AtomicBool, Ordering};

/// Control flags for cooperative shutdown and entry gating.
#[derive(Debug)]
pub struct ControlFlags {
    /// New entries allowed. Open positions are still managed when false.
    pub trading_enabled: AtomicBool,

    /// Graceful shutdown requested.
    pub shutdown_requested: AtomicBool,
}

impl ControlFlags {
    /// Create new control flags with trading enabled.
    pub fn new() -> Self {
        Self {
            trading_enabled: AtomicBool::new(true),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn can_enter(&self) -> bool {
        self.trading_enabled.load(Ordering::Acquire) && !self.is_shutdown_requested()
    }

    #[inline]
    pub fn enable_trading(&self) {
        self.trading_enabled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn disable_trading(&self) {
        self.trading_enabled.store(false, Ordering::Release);
    }

    /// Request graceful shutdown.
    #[inline]
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    /// Check if shutdown was requested.
    #[inline]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}
