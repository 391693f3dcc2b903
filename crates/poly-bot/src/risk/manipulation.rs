//! Manipulation guard for held positions.
//!
//! Near resolution a thin book can push the market favourite away from what
//! the reference price says. The guard watches for the held side being
//! priced as the favourite while the reference sits on the losing side of
//! the strike:
//!
//! - held `Up`, Up bid `>= favor_price`, reference `< strike`
//! - held `Down`, Down bid `>= favor_price`, reference `> strike`
//!
//! The first contradiction latches `Position::manipulation_flag` for good.
//! With the flag set, a held bid at or below `floor_price` forces an exit.

use poly_common::Outcome;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::strategy::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    pub favor_price: Decimal,
    pub floor_price: Decimal,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            favor_price: dec!(0.60),
            floor_price: dec!(0.30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ManipulationGuard {
    config: GuardConfig,
}

impl ManipulationGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// True when the held side is favoured but the reference disagrees.
    pub fn is_contradiction(
        &self,
        side: Outcome,
        held_bid: Decimal,
        reference: Decimal,
        strike: Decimal,
    ) -> bool {
        if held_bid < self.config.favor_price {
            return false;
        }
        match side {
            Outcome::Up => reference < strike,
            Outcome::Down => reference > strike,
        }
    }

    /// Latch the flag on contradiction. Returns true only when newly latched.
    pub fn observe(&self, position: &mut Position, held_bid: Decimal, reference: Decimal) -> bool {
        if position.manipulation_flag {
            return false;
        }
        let Some(strike) = position.strike else {
            return false;
        };
        if self.is_contradiction(position.side, held_bid, reference, strike) {
            position.manipulation_flag = true;
            return true;
        }
        false
    }

    pub fn should_exit(&self, position: &Position, held_bid: Decimal) -> bool {
        position.manipulation_flag && held_bid <= self.config.floor_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::exit::{ExitConfig, ExitContext, ExitDecision, ExitReason, PositionRiskManager};
    use chrono::{Duration, Utc};
    use poly_common::{CryptoAsset, MarketWindow};

    fn position(side: Outcome, strike: Option<Decimal>) -> Position {
        let now = Utc::now();
        let market = MarketWindow {
            id: "cond".to_string(),
            asset: CryptoAsset::Btc,
            question: "q".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            reference_strike: strike,
            window_start: now - Duration::seconds(200),
            window_end: now + Duration::seconds(100),
        };
        Position::open("late_leader", market, side, dec!(0.72), dec!(50), now)
    }

    #[test]
    fn test_contradiction_rules() {
        let guard = ManipulationGuard::new(GuardConfig::default());
        let strike = dec!(100000);

        assert!(guard.is_contradiction(Outcome::Up, dec!(0.65), dec!(99990), strike));
        assert!(!guard.is_contradiction(Outcome::Up, dec!(0.65), dec!(100010), strike));
        assert!(!guard.is_contradiction(Outcome::Up, dec!(0.55), dec!(99990), strike));

        assert!(guard.is_contradiction(Outcome::Down, dec!(0.60), dec!(100010), strike));
        assert!(!guard.is_contradiction(Outcome::Down, dec!(0.60), dec!(99990), strike));
    }

    #[test]
    fn test_flag_latches_once() {
        let guard = ManipulationGuard::new(GuardConfig::default());
        let mut pos = position(Outcome::Up, Some(dec!(100000)));

        assert!(guard.observe(&mut pos, dec!(0.70), dec!(99950)));
        assert!(pos.manipulation_flag);
        // Contradiction gone: flag stays.
        assert!(!guard.observe(&mut pos, dec!(0.70), dec!(100050)));
        assert!(pos.manipulation_flag);
    }

    #[test]
    fn test_no_strike_never_latches() {
        let guard = ManipulationGuard::new(GuardConfig::default());
        let mut pos = position(Outcome::Up, None);
        assert!(!guard.observe(&mut pos, dec!(0.90), dec!(1)));
        assert!(!pos.manipulation_flag);
    }

    #[test]
    fn test_emergency_exit_through_risk_manager() {
        let manager = PositionRiskManager::new(ExitConfig {
            ladder: false,
            guard: Some(GuardConfig::default()),
            ..Default::default()
        });
        let mut pos = position(Outcome::Up, Some(dec!(100000)));
        let now = Utc::now();
        let at = |bid, reference| ExitContext {
            now,
            held_bid: Some(bid),
            resolved_winner: None,
            reference_price: Some(reference),
        };

        assert_eq!(manager.evaluate(&mut pos, &at(dec!(0.70), dec!(99900))), ExitDecision::Hold);
        assert!(pos.manipulation_flag);

        // Reference recovers, but the latch holds and the bid decays to the floor.
        assert_eq!(
            manager.evaluate(&mut pos, &at(dec!(0.30), dec!(100100))),
            ExitDecision::Close {
                reason: ExitReason::Manipulation,
                price: dec!(0.30)
            }
        );
    }
}
