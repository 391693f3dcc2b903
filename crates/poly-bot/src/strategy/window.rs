//! Per-market window lifecycle.
//!
//! A [`WindowTracker`] owns one market window from discovery to expiry and
//! decides at most once whether to enter it.
//!
//! ## Phases
//!
//! ```text
//! Discovered -> BaselinePending -> Armed -> Decided
//!                                    |         ^
//!                                    +-> Analysis (late leader only)
//! any phase -> Expired once now > window_end
//! ```
//!
//! - The baseline reference price is captured `baseline_delay` after the
//!   window opens; the opening seconds are too noisy to pivot on. Move rules
//!   wait for a live price. Late-leader windows arm on time alone and keep
//!   the baseline only when the feed had one.
//! - Move rules consult the detector every cycle while more than
//!   `entry_cutoff_secs` remain.
//! - The late-leader rule records running bid highs during analysis, then
//!   looks for a leader from `decision_secs` remaining until its final cutoff.
//! - `Decided` is final whether or not the resulting entry fills.

use chrono::{DateTime, Duration, Utc};
use poly_common::{MarketWindow, Outcome};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use super::signal::{detect, Confirmation, ConfirmationFailure, DetectorKind, MoveSignal};
use crate::feed::TickBuffer;
use crate::venue::{is_sane_price, Quote};

/// Lifecycle phase of a tracked window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    Discovered,
    BaselinePending,
    Armed,
    Analysis,
    Decided,
    Expired,
}

impl std::fmt::Display for WindowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowPhase::Discovered => write!(f, "discovered"),
            WindowPhase::BaselinePending => write!(f, "baseline_pending"),
            WindowPhase::Armed => write!(f, "armed"),
            WindowPhase::Analysis => write!(f, "analysis"),
            WindowPhase::Decided => write!(f, "decided"),
            WindowPhase::Expired => write!(f, "expired"),
        }
    }
}

/// Entry on a detected reference-price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRule {
    pub kind: DetectorKind,
    /// Minimum absolute move in USD.
    pub min_move: Decimal,
    pub window: Duration,
    pub confirmation: Confirmation,
}

/// Entry on the outcome the market already favours late in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LateLeaderRule {
    /// Seconds remaining when bid highs start being recorded.
    pub analysis_start_secs: i64,
    /// Seconds remaining when the leader check starts.
    pub decision_secs: i64,
    /// Seconds remaining after which no entry is made.
    pub final_cutoff_secs: i64,
    pub leader_threshold: Decimal,
    /// Both highs at or above this means the window is skipped as choppy.
    pub choppy_threshold: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRule {
    Move(MoveRule),
    LateLeader(LateLeaderRule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub baseline_delay: Duration,
    pub entry_cutoff_secs: i64,
    pub rule: EntryRule,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            baseline_delay: Duration::seconds(10),
            entry_cutoff_secs: 20,
            rule: EntryRule::Move(MoveRule {
                kind: DetectorKind::Momentum,
                min_move: Decimal::new(15, 0),
                window: Duration::seconds(2),
                confirmation: Confirmation::default(),
            }),
        }
    }
}

/// Inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct WindowInputs<'a> {
    pub now: DateTime<Utc>,
    /// Latest reference price, `None` when the feed is stale.
    pub reference_price: Option<Decimal>,
    pub ticks: &'a TickBuffer,
    /// Quote for this market, when one was fetched this cycle.
    pub quote: Option<&'a Quote>,
}

/// What caused an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTrigger {
    Move(MoveSignal),
    Leader {
        bid: Decimal,
        up_high: Decimal,
        down_high: Decimal,
    },
}

/// Decision to enter a window on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySignal {
    pub side: Outcome,
    /// Expected entry price, when the rule already looked at the book.
    pub price_hint: Option<Decimal>,
    pub trigger: EntryTrigger,
    pub baseline: Option<Decimal>,
}

impl std::fmt::Display for EntrySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.trigger {
            EntryTrigger::Move(signal) => write!(f, "{} ${:+}", self.side, signal.delta),
            EntryTrigger::Leader { bid, .. } => write!(f, "{} leader @ {}", self.side, bid),
        }
    }
}

/// Why a window was decided without an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Choppy { up_high: Decimal, down_high: Decimal },
    NoLeader {
        up_bid: Option<Decimal>,
        down_bid: Option<Decimal>,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Choppy { up_high, down_high } => {
                write!(f, "SKIP CHOPPY (Up high={} Down high={})", up_high, down_high)
            }
            SkipReason::NoLeader { up_bid, down_bid } => write!(
                f,
                "SKIP NO LEADER (Up={} Down={})",
                up_bid.unwrap_or_default(),
                down_bid.unwrap_or_default()
            ),
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    /// Nothing to do this cycle.
    Idle,
    /// Enter now. The window is already `Decided`.
    Enter(EntrySignal),
    /// A move fired but failed confirmation; still armed.
    Unconfirmed(MoveSignal, ConfirmationFailure),
    /// Decided without entering.
    Skip(SkipReason),
    /// The window has ended; drop the tracker.
    Expired,
}

/// Lifecycle state for one market window.
#[derive(Debug, Clone)]
pub struct WindowTracker {
    market: MarketWindow,
    config: TrackerConfig,
    phase: WindowPhase,
    baseline: Option<Decimal>,
    up_high: Decimal,
    down_high: Decimal,
}

impl WindowTracker {
    pub fn new(market: MarketWindow, config: TrackerConfig) -> Self {
        Self {
            market,
            config,
            phase: WindowPhase::Discovered,
            baseline: None,
            up_high: Decimal::ZERO,
            down_high: Decimal::ZERO,
        }
    }

    pub fn market(&self) -> &MarketWindow {
        &self.market
    }

    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn baseline(&self) -> Option<Decimal> {
        self.baseline
    }

    pub fn is_decided(&self) -> bool {
        self.phase == WindowPhase::Decided
    }

    /// Running bid highs recorded during analysis, `(up, down)`.
    pub fn highs(&self) -> (Decimal, Decimal) {
        (self.up_high, self.down_high)
    }

    /// Whether the next evaluation wants a quote for this market.
    pub fn needs_quote(&self, now: DateTime<Utc>) -> bool {
        let EntryRule::LateLeader(rule) = self.config.rule else {
            return false;
        };
        matches!(self.phase, WindowPhase::Armed | WindowPhase::Analysis)
            && !self.market.is_expired(now)
            && self.market.seconds_remaining(now) <= rule.analysis_start_secs
    }

    /// Advance the state machine by one cycle.
    pub fn evaluate(&mut self, inputs: &WindowInputs<'_>) -> WindowAction {
        let now = inputs.now;

        if self.market.is_expired(now) {
            if self.phase != WindowPhase::Expired {
                debug!(market_id = %self.market.id, phase = %self.phase, "Window expired");
                self.phase = WindowPhase::Expired;
            }
            return WindowAction::Expired;
        }

        match self.phase {
            WindowPhase::Expired | WindowPhase::Decided => WindowAction::Idle,
            WindowPhase::Discovered => {
                self.phase = WindowPhase::BaselinePending;
                self.capture_baseline(inputs)
            }
            WindowPhase::BaselinePending => self.capture_baseline(inputs),
            WindowPhase::Armed | WindowPhase::Analysis => match self.config.rule {
                EntryRule::Move(rule) => self.evaluate_move(&rule, inputs),
                EntryRule::LateLeader(rule) => self.evaluate_leader(&rule, inputs),
            },
        }
    }

    fn capture_baseline(&mut self, inputs: &WindowInputs<'_>) -> WindowAction {
        if inputs.now < self.market.window_start + self.config.baseline_delay {
            return WindowAction::Idle;
        }
        let Some(price) = inputs.reference_price else {
            // The leader rule reads only venue bids; the baseline is just a
            // fallback strike for the guard.
            if matches!(self.config.rule, EntryRule::LateLeader(_)) {
                self.phase = WindowPhase::Armed;
                info!(
                    market_id = %self.market.id,
                    "Window armed without baseline (no live reference price): {}",
                    self.market.question
                );
            }
            return WindowAction::Idle;
        };

        self.baseline = Some(price);
        self.phase = WindowPhase::Armed;
        info!(
            market_id = %self.market.id,
            baseline = %price,
            "Window baseline set: ${} for {}",
            price,
            self.market.question
        );
        WindowAction::Idle
    }

    fn evaluate_move(&mut self, rule: &MoveRule, inputs: &WindowInputs<'_>) -> WindowAction {
        if self.market.seconds_remaining(inputs.now) <= self.config.entry_cutoff_secs {
            return WindowAction::Idle;
        }
        if inputs.reference_price.is_none() {
            return WindowAction::Idle;
        }

        let Some(signal) = detect(rule.kind, inputs.ticks, rule.min_move, rule.window) else {
            return WindowAction::Idle;
        };

        if let Err(failure) = rule.confirmation.check(inputs.ticks, rule.window) {
            debug!(market_id = %self.market.id, delta = %signal.delta, %failure, "Move not confirmed");
            return WindowAction::Unconfirmed(signal, failure);
        }

        self.phase = WindowPhase::Decided;
        let entry = EntrySignal {
            side: signal.side(),
            price_hint: None,
            trigger: EntryTrigger::Move(signal),
            baseline: self.baseline,
        };
        info!(
            market_id = %self.market.id,
            kind = %signal.kind,
            delta = %signal.delta,
            side = %entry.side,
            "{}: ${:+} in {}s -> BUY {}",
            signal.kind.to_string().to_uppercase(),
            signal.delta,
            rule.window.num_seconds(),
            entry.side
        );
        WindowAction::Enter(entry)
    }

    fn evaluate_leader(&mut self, rule: &LateLeaderRule, inputs: &WindowInputs<'_>) -> WindowAction {
        let remaining = self.market.seconds_remaining(inputs.now);

        if remaining <= rule.final_cutoff_secs {
            self.phase = WindowPhase::Decided;
            let quote = inputs.quote.copied().unwrap_or_default();
            let reason = SkipReason::NoLeader {
                up_bid: quote.bid(Outcome::Up),
                down_bid: quote.bid(Outcome::Down),
            };
            info!(market_id = %self.market.id, "{}", reason);
            return WindowAction::Skip(reason);
        }
        if remaining > rule.analysis_start_secs {
            return WindowAction::Idle;
        }

        if self.phase == WindowPhase::Armed {
            self.phase = WindowPhase::Analysis;
            info!(market_id = %self.market.id, remaining, "Analyzing {}", self.market.question);
        }

        // Quote unavailable: retry next cycle.
        let Some(quote) = inputs.quote else {
            return WindowAction::Idle;
        };
        let up_bid = quote.bid(Outcome::Up);
        let down_bid = quote.bid(Outcome::Down);

        if remaining > rule.decision_secs {
            if let Some(bid) = up_bid {
                self.up_high = self.up_high.max(bid);
            }
            if let Some(bid) = down_bid {
                self.down_high = self.down_high.max(bid);
            }
            return WindowAction::Idle;
        }

        if self.up_high >= rule.choppy_threshold && self.down_high >= rule.choppy_threshold {
            self.phase = WindowPhase::Decided;
            let reason = SkipReason::Choppy {
                up_high: self.up_high,
                down_high: self.down_high,
            };
            info!(market_id = %self.market.id, "{}", reason);
            return WindowAction::Skip(reason);
        }

        let up = up_bid.unwrap_or_default();
        let down = down_bid.unwrap_or_default();
        let leader = if up >= rule.leader_threshold && up >= down {
            Some((Outcome::Up, up))
        } else if down >= rule.leader_threshold && down >= up {
            Some((Outcome::Down, down))
        } else {
            None
        };

        let Some((side, bid)) = leader else {
            debug!(market_id = %self.market.id, %up, %down, "No leader yet");
            return WindowAction::Idle;
        };

        self.phase = WindowPhase::Decided;
        let price = quote
            .side(side)
            .ask
            .filter(|p| is_sane_price(*p))
            .unwrap_or(bid);
        info!(
            market_id = %self.market.id,
            %side,
            %bid,
            up_high = %self.up_high,
            down_high = %self.down_high,
            "LEADER: {} bid {} with {}s left -> BUY @ {}",
            side,
            bid,
            remaining,
            price
        );
        WindowAction::Enter(EntrySignal {
            side,
            price_hint: Some(price),
            trigger: EntryTrigger::Leader {
                bid,
                up_high: self.up_high,
                down_high: self.down_high,
            },
            baseline: self.baseline,
        })
    }
}
