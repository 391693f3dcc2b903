//! Open and closed directional positions.
//!
//! A [`Position`] is created on a buy fill in [`RiskMode::Normal`] and only
//! ever moves forward:
//!
//! ```text
//! Normal ──► Moonbag ──► Closed
//!    │                     ▲
//!    ├──► Protection ──────┤
//!    └─────────────────────┘
//! ```
//!
//! `mode` and `exit` are private so `Closed` and the exit record can only be
//! set together, once, through [`Position::close`].

use chrono::{DateTime, Utc};
use poly_common::{MarketWindow, Outcome};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::risk::ExitReason;

/// Risk mode of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskMode {
    Normal,
    /// Trailing stop at half of peak gain.
    Moonbag,
    /// Waiting to recover to a smaller accepted loss.
    Protection,
    Closed,
}

impl std::fmt::Display for RiskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskMode::Normal => write!(f, "normal"),
            RiskMode::Moonbag => write!(f, "moonbag"),
            RiskMode::Protection => write!(f, "protection"),
            RiskMode::Closed => write!(f, "closed"),
        }
    }
}

/// Terminal record of how a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitRecord {
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

/// A single-side position in one market window.
#[derive(Debug, Clone)]
pub struct Position {
    pub id: Uuid,
    /// Strategy profile that opened the position.
    pub strategy: String,
    pub market: MarketWindow,
    pub side: Outcome,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Highest gain ratio observed while open.
    pub peak_gain: Decimal,
    /// Latched once the manipulation guard sees a contradiction.
    pub manipulation_flag: bool,
    /// Strike used by the manipulation guard.
    pub strike: Option<Decimal>,
    mode: RiskMode,
    /// Modes entered after `Normal`, in order.
    transitions: Vec<RiskMode>,
    exit: Option<ExitRecord>,
}

impl Position {
    pub fn open(
        strategy: impl Into<String>,
        market: MarketWindow,
        side: Outcome,
        entry_price: Decimal,
        quantity: Decimal,
        entry_time: DateTime<Utc>,
    ) -> Self {
        let strike = market.reference_strike;
        Self {
            id: Uuid::new_v4(),
            strategy: strategy.into(),
            market,
            side,
            entry_price,
            quantity,
            entry_time,
            peak_gain: Decimal::ZERO,
            manipulation_flag: false,
            strike,
            mode: RiskMode::Normal,
            transitions: Vec::new(),
            exit: None,
        }
    }

    /// Use `strike` for the manipulation guard when the market has none.
    pub fn with_fallback_strike(mut self, strike: Option<Decimal>) -> Self {
        if self.strike.is_none() {
            self.strike = strike;
        }
        self
    }

    pub fn token_id(&self) -> &str {
        self.market.token_id(self.side)
    }

    pub fn cost(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    pub fn mode(&self) -> RiskMode {
        self.mode
    }

    pub fn transitions(&self) -> &[RiskMode] {
        &self.transitions
    }

    pub fn exit(&self) -> Option<&ExitRecord> {
        self.exit.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.mode == RiskMode::Closed
    }

    /// Gain ratio at `bid`: `(bid - entry) / entry`.
    pub fn gain_at(&self, bid: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (bid - self.entry_price) / self.entry_price
    }

    /// Unrealised (or realised, at exit price) pnl at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity
    }

    /// Raise the peak if `gain` exceeds it.
    pub fn observe_gain(&mut self, gain: Decimal) {
        if gain > self.peak_gain {
            self.peak_gain = gain;
        }
    }

    /// Move from `Normal` to `Moonbag` or `Protection`.
    ///
    /// Returns false (and changes nothing) for any other move.
    pub fn transition(&mut self, to: RiskMode) -> bool {
        let allowed = self.mode == RiskMode::Normal
            && matches!(to, RiskMode::Moonbag | RiskMode::Protection);
        if allowed {
            self.mode = to;
            self.transitions.push(to);
        }
        allowed
    }

    /// Close at `exit_price`, returning the realised pnl.
    ///
    /// Closing an already-closed position returns `None` and leaves the
    /// original exit record untouched.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Option<Decimal> {
        if self.is_closed() {
            return None;
        }
        let pnl = self.pnl_at(exit_price);
        self.mode = RiskMode::Closed;
        self.exit = Some(ExitRecord {
            exit_price,
            pnl,
            reason,
            closed_at,
        });
        Some(pnl)
    }

    pub fn snapshot(&self, current_bid: Option<Decimal>) -> PositionSnapshot {
        PositionSnapshot {
            id: self.id.to_string(),
            strategy: self.strategy.clone(),
            market_id: self.market.id.clone(),
            question: self.market.question.clone(),
            side: self.side,
            entry_price: self.entry_price,
            quantity: self.quantity,
            entry_time: self.entry_time,
            window_end: self.market.window_end,
            mode: self.mode,
            peak_gain: self.peak_gain,
            manipulation_flag: self.manipulation_flag,
            current_bid,
            unrealized_pnl: current_bid.map(|bid| self.pnl_at(bid)),
        }
    }

    /// Closed-log record; `None` while the position is open.
    pub fn closed_record(&self) -> Option<ClosedPositionRecord> {
        let exit = self.exit?;
        Some(ClosedPositionRecord {
            id: self.id.to_string(),
            strategy: self.strategy.clone(),
            market_id: self.market.id.clone(),
            side: self.side,
            entry_price: self.entry_price,
            quantity: self.quantity,
            entry_time: self.entry_time,
            transitions: self.transitions.clone(),
            peak_gain: self.peak_gain,
            manipulation_flag: self.manipulation_flag,
            exit_price: exit.exit_price,
            pnl: exit.pnl,
            reason: exit.reason,
            closed_at: exit.closed_at,
        })
    }
}

/// Read-only view of an open position for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub id: String,
    pub strategy: String,
    pub market_id: String,
    pub question: String,
    pub side: Outcome,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mode: RiskMode,
    pub peak_gain: Decimal,
    pub manipulation_flag: bool,
    pub current_bid: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

/// Append-only record of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPositionRecord {
    pub id: String,
    pub strategy: String,
    pub market_id: String,
    pub side: Outcome,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub transitions: Vec<RiskMode>,
    pub peak_gain: Decimal,
    pub manipulation_flag: bool,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use poly_common::CryptoAsset;
    use rust_decimal_macros::dec;

    fn market() -> MarketWindow {
        let start = Utc::now();
        MarketWindow {
            id: "cond".to_string(),
            asset: CryptoAsset::Btc,
            question: "Bitcoin above $100,000?".to_string(),
            up_token_id: "up".to_string(),
            down_token_id: "down".to_string(),
            reference_strike: None,
            window_start: start,
            window_end: start + Duration::minutes(5),
        }
    }

    fn position() -> Position {
        Position::open("momentum", market(), Outcome::Up, dec!(0.50), dec!(100), Utc::now())
    }

    #[test]
    fn test_gain_and_pnl() {
        let pos = position();
        assert_eq!(pos.gain_at(dec!(0.55)), dec!(0.1));
        assert_eq!(pos.gain_at(dec!(0.25)), dec!(-0.5));
        assert_eq!(pos.pnl_at(dec!(0.55)), dec!(5.00));
        assert_eq!(pos.cost(), dec!(50.00));
        assert_eq!(pos.token_id(), "up");
    }

    #[test]
    fn test_peak_only_rises() {
        let mut pos = position();
        pos.observe_gain(dec!(0.2));
        pos.observe_gain(dec!(0.1));
        assert_eq!(pos.peak_gain, dec!(0.2));
    }

    #[test]
    fn test_transitions_are_one_way() {
        let mut pos = position();
        assert!(pos.transition(RiskMode::Moonbag));
        assert!(!pos.transition(RiskMode::Protection));
        assert!(!pos.transition(RiskMode::Normal));
        assert_eq!(pos.transitions(), &[RiskMode::Moonbag]);
        assert_eq!(pos.mode(), RiskMode::Moonbag);
    }

    #[test]
    fn test_close_is_irreversible() {
        let mut pos = position();
        let now = Utc::now();
        assert_eq!(pos.close(dec!(0.60), ExitReason::ProfitTarget, now), Some(dec!(10.00)));
        assert!(pos.is_closed());

        assert_eq!(pos.close(dec!(0.10), ExitReason::HardStop, now), None);
        assert!(!pos.transition(RiskMode::Protection));
        let exit = pos.exit().unwrap();
        assert_eq!(exit.pnl, dec!(10.00));
        assert_eq!(exit.reason, ExitReason::ProfitTarget);

        let record = pos.closed_record().unwrap();
        assert_eq!(record.exit_price, dec!(0.60));
        assert!(record.transitions.is_empty());
    }

    #[test]
    fn test_fallback_strike() {
        let pos = position().with_fallback_strike(Some(dec!(99950)));
        assert_eq!(pos.strike, Some(dec!(99950)));

        let mut with_strike = market();
        with_strike.reference_strike = Some(dec!(100000));
        let pos = Position::open("s", with_strike, Outcome::Down, dec!(0.4), dec!(1), Utc::now())
            .with_fallback_strike(Some(dec!(1)));
        assert_eq!(pos.strike, Some(dec!(100000)));
    }

    #[test]
    fn test_snapshot_serializes() {
        let pos = position();
        let snap = pos.snapshot(Some(dec!(0.52)));
        assert_eq!(snap.unrealized_pnl, Some(dec!(2.00)));
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"mode\":\"normal\""));
        assert!(pos.closed_record().is_none());
    }
}
