//! Exit state machine for one open position.
//!
//! [`PositionRiskManager::evaluate`] is called once per cycle with the
//! latest quote for the held side. It updates the peak gain, applies mode
//! transitions in place, and returns what the caller should do next. Closing
//! is left to the caller ([`Position::close`]) so a failed sell leaves the
//! position exactly as it was.
//!
//! ## Priority (first match wins the cycle)
//!
//! 1. Hard stop: `gain <= hard_stop`
//! 2. Per-trade dollar loss cap (disabled when zero)
//! 3. Hard cap: `gain >= hard_cap`
//! 4. Manipulation guard: latched flag and held bid at or below the floor
//! 5. `Normal` and `gain >= moonbag` → `Moonbag` (no close this cycle)
//! 6. `Normal` and `gain <= drawdown` → `Protection`
//! 7. `Moonbag` and `gain <= peak / 2` → close
//! 8. `Protection` and `gain >= protection_exit` → close
//! 9. `Normal` and `gain >= profit_target` → close
//! 10. Window ended and nothing above closed → settle
//!
//! Rules 3 and 5–9 form the "ladder" and can be disabled per strategy.
//! After the window ends a resolved winner settles at 1 or 0 straight away.
//! Otherwise a held bid still runs rules 1–9, and only when none of them
//! closes does the profile's settlement rule price the bid. With no quote at
//! all the position settles at zero once the grace period has passed.

use chrono::{DateTime, Duration, Utc};
use poly_common::Outcome;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::manipulation::{GuardConfig, ManipulationGuard};
use crate::strategy::position::{Position, RiskMode};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    HardStop,
    MaxLoss,
    HardCap,
    Manipulation,
    MoonbagTrail,
    ProtectionExit,
    ProfitTarget,
    /// Venue reported the winning outcome.
    Resolved,
    /// Window ended; settled from the held bid.
    Expiry,
    /// Window ended and no quote arrived within the grace period.
    ExpiryNoQuote,
}

impl ExitReason {
    /// True for closes that go through a venue sell.
    pub fn requires_sell(&self) -> bool {
        !matches!(
            self,
            ExitReason::Resolved | ExitReason::Expiry | ExitReason::ExpiryNoQuote
        )
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::HardStop => write!(f, "HARD STOP"),
            ExitReason::MaxLoss => write!(f, "MAX LOSS"),
            ExitReason::HardCap => write!(f, "HARD CAP"),
            ExitReason::Manipulation => write!(f, "MANIPULATION"),
            ExitReason::MoonbagTrail => write!(f, "MOONBAG TRAIL"),
            ExitReason::ProtectionExit => write!(f, "PROTECTION EXIT"),
            ExitReason::ProfitTarget => write!(f, "PROFIT"),
            ExitReason::Resolved => write!(f, "RESOLVED"),
            ExitReason::Expiry => write!(f, "EXPIRY"),
            ExitReason::ExpiryNoQuote => write!(f, "EXPIRY NO QUOTE"),
        }
    }
}

/// How an unresolved position is valued once its window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Book the held side's last bid.
    #[default]
    MarkToBid,
    /// Bid above one half settles at 1, otherwise 0.
    Binary,
}

/// Thresholds for the exit state machine. All gains are ratios (0.05 = 5%).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitConfig {
    pub hard_stop: Decimal,
    pub hard_cap: Decimal,
    pub moonbag: Decimal,
    pub drawdown: Decimal,
    pub protection_exit: Decimal,
    pub profit_target: Decimal,
    /// Dollar loss that forces a close. Zero disables.
    pub max_loss_per_trade: Decimal,
    /// When false only the hard stop, loss cap, guard and expiry apply.
    pub ladder: bool,
    pub settlement: Settlement,
    /// How long to wait for a quote after expiry before settling at zero.
    pub settle_grace: Duration,
    pub guard: Option<GuardConfig>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            hard_stop: dec!(-0.50),
            hard_cap: dec!(0.20),
            moonbag: dec!(0.15),
            drawdown: dec!(-0.15),
            protection_exit: dec!(-0.10),
            profit_target: dec!(0.05),
            max_loss_per_trade: Decimal::ZERO,
            ladder: true,
            settlement: Settlement::MarkToBid,
            settle_grace: Duration::seconds(30),
            guard: None,
        }
    }
}

/// Market data for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ExitContext {
    pub now: DateTime<Utc>,
    /// Best bid for the held side; `None` when no usable quote.
    pub held_bid: Option<Decimal>,
    /// Winner reported by the venue, if already resolved.
    pub resolved_winner: Option<Outcome>,
    /// Latest reference price, for the manipulation guard.
    pub reference_price: Option<Decimal>,
}

/// What the caller should do with the position this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Nothing to do (includes already-closed positions).
    Hold,
    /// Mode changed; the position stays open.
    Transition { from: RiskMode, to: RiskMode },
    /// Close at `price`. Sell through the venue when `reason.requires_sell()`.
    Close { reason: ExitReason, price: Decimal },
}

/// Evaluates exit rules for positions opened by one strategy.
#[derive(Debug, Clone)]
pub struct PositionRiskManager {
    config: ExitConfig,
    guard: Option<ManipulationGuard>,
}

impl PositionRiskManager {
    pub fn new(config: ExitConfig) -> Self {
        let guard = config.guard.map(ManipulationGuard::new);
        Self { config, guard }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    pub fn evaluate(&self, position: &mut Position, ctx: &ExitContext) -> ExitDecision {
        if position.is_closed() {
            return ExitDecision::Hold;
        }

        let expired = position.market.is_expired(ctx.now);
        if expired && let Some(winner) = ctx.resolved_winner {
            let price = if winner == position.side {
                Decimal::ONE
            } else {
                Decimal::ZERO
            };
            return ExitDecision::Close {
                reason: ExitReason::Resolved,
                price,
            };
        }

        let Some(bid) = ctx.held_bid else {
            if expired && ctx.now - position.market.window_end >= self.config.settle_grace {
                return ExitDecision::Close {
                    reason: ExitReason::ExpiryNoQuote,
                    price: Decimal::ZERO,
                };
            }
            return ExitDecision::Hold;
        };

        match self.evaluate_bid(position, bid, ctx) {
            close @ ExitDecision::Close { .. } => close,
            _ if expired => self.settle(bid),
            decision => decision,
        }
    }

    fn evaluate_bid(&self, position: &mut Position, bid: Decimal, ctx: &ExitContext) -> ExitDecision {

        let gain = position.gain_at(bid);
        position.observe_gain(gain);

        if let Some(guard) = &self.guard
            && let Some(reference) = ctx.reference_price
            && guard.observe(position, bid, reference)
        {
            info!(
                market = %position.market.id,
                side = %position.side,
                bid = %bid,
                reference = %reference,
                strike = ?position.strike,
                "Manipulation detected, latched"
            );
        }

        let close = |reason| ExitDecision::Close { reason, price: bid };
        let cfg = &self.config;

        if gain <= cfg.hard_stop {
            return close(ExitReason::HardStop);
        }

        if cfg.max_loss_per_trade > Decimal::ZERO && position.pnl_at(bid) <= -cfg.max_loss_per_trade {
            return close(ExitReason::MaxLoss);
        }

        if cfg.ladder && gain >= cfg.hard_cap {
            return close(ExitReason::HardCap);
        }

        if let Some(guard) = &self.guard
            && guard.should_exit(position, bid)
        {
            return close(ExitReason::Manipulation);
        }

        if !cfg.ladder {
            return ExitDecision::Hold;
        }

        let mode = position.mode();
        if mode == RiskMode::Normal {
            let target = if gain >= cfg.moonbag {
                Some(RiskMode::Moonbag)
            } else if gain <= cfg.drawdown {
                Some(RiskMode::Protection)
            } else {
                None
            };
            if let Some(to) = target
                && position.transition(to)
            {
                return ExitDecision::Transition { from: mode, to };
            }
        }

        match position.mode() {
            RiskMode::Moonbag if gain <= position.peak_gain / dec!(2) => {
                close(ExitReason::MoonbagTrail)
            }
            RiskMode::Protection if gain >= cfg.protection_exit => {
                close(ExitReason::ProtectionExit)
            }
            RiskMode::Normal if gain >= cfg.profit_target => close(ExitReason::ProfitTarget),
            _ => ExitDecision::Hold,
        }
    }

    fn settle(&self, bid: Decimal) -> ExitDecision {
        let price = match self.config.settlement {
            Settlement::MarkToBid => bid,
            Settlement::Binary if bid > dec!(0.5) => Decimal::ONE,
            Settlement::Binary => Decimal::ZERO,
        };
        ExitDecision::Close {
            reason: ExitReason::Expiry,
            price,
        }
    }
}
