//! P&L-based entry gate.
//!
//! Tracks realised P&L for the current local day and the current losing
//! streak of one strategy instance, and refuses new entries when either
//! limit is hit.
//!
//! ## Rules
//!
//! 1. **Daily loss limit**: no entries once the day's realised P&L is at or
//!    below the (negative) limit. Resets at the local-day rollover.
//! 2. **Losing streak pause**: after N consecutive losses, no entries for a
//!    cool-off period. The streak resets when the pause starts.
//!
//! A zero limit or zero streak length disables that rule.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::LocalCalendar;

/// Configuration for the entry gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnlRiskConfig {
    /// Daily realised P&L floor in USDC (negative, e.g. -100). Zero disables.
    pub daily_loss_limit: Decimal,

    /// Consecutive losing trades that trigger a pause. Zero disables.
    pub consecutive_losses_to_pause: u32,

    /// Length of the pause.
    pub pause: Duration,
}

impl Default for PnlRiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(-100),
            consecutive_losses_to_pause: 2,
            pause: Duration::minutes(25),
        }
    }
}

/// Reason an entry was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlRejectionReason {
    /// Daily loss limit has been reached.
    DailyLossLimit {
        /// Current daily P&L (negative = loss).
        current_pnl: Decimal,
        /// Configured floor.
        limit: Decimal,
    },

    /// Cooling off after a losing streak.
    LosingStreakPause {
        /// When entries are allowed again.
        until: DateTime<Utc>,
    },
}

impl std::fmt::Display for PnlRejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PnlRejectionReason::DailyLossLimit { current_pnl, limit } => {
                write!(
                    f,
                    "Daily loss limit reached: ${} <= ${}",
                    current_pnl.round_dp(2),
                    limit
                )
            }
            PnlRejectionReason::LosingStreakPause { until } => {
                write!(f, "Paused after losing streak until {}", until.format("%H:%M:%S"))
            }
        }
    }
}

/// Entry gate for one strategy instance.
#[derive(Debug, Clone)]
pub struct PnlRiskGate {
    config: PnlRiskConfig,
    calendar: LocalCalendar,
    day: Option<NaiveDate>,
    /// Realised P&L for `day` (negative = loss).
    daily_pnl: Decimal,
    consecutive_losses: u32,
    paused_until: Option<DateTime<Utc>>,
}

impl PnlRiskGate {
    pub fn new(config: PnlRiskConfig, calendar: LocalCalendar) -> Self {
        Self {
            config,
            calendar,
            day: None,
            daily_pnl: Decimal::ZERO,
            consecutive_losses: 0,
            paused_until: None,
        }
    }

    pub fn config(&self) -> &PnlRiskConfig {
        &self.config
    }

    #[inline]
    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    #[inline]
    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn paused_until(&self) -> Option<DateTime<Utc>> {
        self.paused_until
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = self.calendar.day(now);
        if self.day != Some(today) {
            if self.day.is_some() {
                info!(day = %today, previous_pnl = %self.daily_pnl, "New day, resetting daily P&L");
            }
            self.day = Some(today);
            self.daily_pnl = Decimal::ZERO;
        }
    }

    /// Check whether a new entry is allowed at `now`.
    pub fn check_entry(&mut self, now: DateTime<Utc>) -> Result<(), PnlRejectionReason> {
        self.roll_day(now);

        if self.config.daily_loss_limit < Decimal::ZERO
            && self.daily_pnl <= self.config.daily_loss_limit
        {
            return Err(PnlRejectionReason::DailyLossLimit {
                current_pnl: self.daily_pnl,
                limit: self.config.daily_loss_limit,
            });
        }

        if let Some(until) = self.paused_until {
            if now < until {
                return Err(PnlRejectionReason::LosingStreakPause { until });
            }
            info!("Losing-streak pause over, entries resumed");
            self.paused_until = None;
        }

        Ok(())
    }

    /// Record a closed trade.
    pub fn record_close(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.daily_pnl += pnl;

        if pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }

        let streak = self.config.consecutive_losses_to_pause;
        if streak > 0 && self.consecutive_losses >= streak {
            let until = now + self.config.pause;
            warn!(
                losses = self.consecutive_losses,
                until = %until,
                "Losing streak, pausing new entries"
            );
            self.paused_until = Some(until);
            self.consecutive_losses = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> PnlRiskGate {
        PnlRiskGate::new(PnlRiskConfig::default(), LocalCalendar::utc())
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_allows_by_default() {
        let mut gate = gate();
        assert!(gate.check_entry(at("2025-01-01T12:00:00Z")).is_ok());
    }

    #[test]
    fn test_daily_loss_limit_and_rollover() {
        let mut gate = PnlRiskGate::new(
            PnlRiskConfig {
                consecutive_losses_to_pause: 0,
                ..Default::default()
            },
            LocalCalendar::utc(),
        );
        let noon = at("2025-01-01T12:00:00Z");
        gate.record_close(dec!(-60), noon);
        assert!(gate.check_entry(noon).is_ok());
        gate.record_close(dec!(-40), noon);

        assert!(matches!(
            gate.check_entry(noon),
            Err(PnlRejectionReason::DailyLossLimit { .. })
        ));

        // Next day starts fresh.
        assert!(gate.check_entry(at("2025-01-02T00:00:01Z")).is_ok());
        assert_eq!(gate.daily_pnl(), Decimal::ZERO);
    }

    #[test]
    fn test_zero_limit_disables() {
        let mut gate = PnlRiskGate::new(
            PnlRiskConfig {
                daily_loss_limit: Decimal::ZERO,
                consecutive_losses_to_pause: 0,
                ..Default::default()
            },
            LocalCalendar::utc(),
        );
        let now = at("2025-01-01T12:00:00Z");
        gate.record_close(dec!(-1000), now);
        assert!(gate.check_entry(now).is_ok());
    }

    #[test]
    fn test_losing_streak_pause() {
        let mut gate = gate();
        let now = at("2025-01-01T12:00:00Z");

        gate.record_close(dec!(-5), now);
        assert!(gate.check_entry(now).is_ok());
        gate.record_close(dec!(-5), now);

        assert!(matches!(
            gate.check_entry(now + Duration::minutes(24)),
            Err(PnlRejectionReason::LosingStreakPause { .. })
        ));
        assert!(gate.check_entry(now + Duration::minutes(25)).is_ok());
        assert_eq!(gate.paused_until(), None);
        assert_eq!(gate.consecutive_losses(), 0);
    }

    #[test]
    fn test_win_breaks_streak() {
        let mut gate = gate();
        let now = at("2025-01-01T12:00:00Z");
        gate.record_close(dec!(-5), now);
        gate.record_close(dec!(3), now);
        gate.record_close(dec!(-5), now);
        assert_eq!(gate.consecutive_losses(), 1);
        assert!(gate.check_entry(now).is_ok());
    }

    #[test]
    fn test_rejection_display() {
        let reason = PnlRejectionReason::DailyLossLimit {
            current_pnl: dec!(-100.456),
            limit: dec!(-100),
        };
        assert_eq!(reason.to_string(), "Daily loss limit reached: $-100.46 <= $-100");
    }
}
