//! Per-strategy session statistics.
//!
//! Counters are atomics so snapshots can be read from any task. PnL buckets
//! sit behind a mutex and are keyed by the local (day, hour) of the injected
//! clock; hourly buckets reset when the local day rolls over.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, LocalCalendar};
use crate::config::TradingMode;

#[derive(Debug)]
struct PnlBuckets {
    total: Decimal,
    day: NaiveDate,
    daily: Decimal,
    /// Local hour ("YYYY-MM-DD HH:00") -> realised pnl.
    hourly: BTreeMap<String, Decimal>,
    /// Hour key of the last report, to detect hour rollover.
    report_hour: String,
    last_action: String,
    current_signal: String,
}

/// Statistics for one strategy instance.
pub struct StatsAggregator {
    session_id: Uuid,
    strategy: String,
    mode: TradingMode,
    clock: Arc<dyn Clock>,
    calendar: LocalCalendar,
    started_at: DateTime<Utc>,
    signals: AtomicU64,
    trades: AtomicU64,
    exits: AtomicU64,
    wins: AtomicU64,
    losses: AtomicU64,
    rejected: AtomicU64,
    skipped_cycles: AtomicU64,
    skipped_choppy: AtomicU64,
    skipped_no_leader: AtomicU64,
    pnl: Mutex<PnlBuckets>,
}

impl StatsAggregator {
    pub fn new(
        strategy: impl Into<String>,
        mode: TradingMode,
        clock: Arc<dyn Clock>,
        calendar: LocalCalendar,
    ) -> Self {
        let now = clock.now();
        Self {
            session_id: Uuid::new_v4(),
            strategy: strategy.into(),
            mode,
            calendar,
            started_at: now,
            signals: AtomicU64::new(0),
            trades: AtomicU64::new(0),
            exits: AtomicU64::new(0),
            wins: AtomicU64::new(0),
            losses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            skipped_choppy: AtomicU64::new(0),
            skipped_no_leader: AtomicU64::new(0),
            pnl: Mutex::new(PnlBuckets {
                total: Decimal::ZERO,
                day: calendar.day(now),
                daily: Decimal::ZERO,
                hourly: BTreeMap::new(),
                report_hour: calendar.hour_key(now),
                last_action: String::new(),
                current_signal: String::new(),
            }),
            clock,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    // === Event Counters ===

    pub fn record_signal(&self, description: impl Into<String>) {
        self.signals.fetch_add(1, Ordering::Relaxed);
        self.pnl.lock().current_signal = description.into();
    }

    pub fn record_entry(&self, action: impl Into<String>) {
        self.trades.fetch_add(1, Ordering::Relaxed);
        self.set_last_action(action);
    }

    /// Signal that did not become a trade (risk gate, min price, shadow, no fill).
    pub fn record_rejected(&self, action: impl Into<String>) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.set_last_action(action);
    }

    /// Evaluation cycle skipped for a transient data gap.
    pub fn record_skipped_cycle(&self) {
        self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_choppy(&self, action: impl Into<String>) {
        self.skipped_choppy.fetch_add(1, Ordering::Relaxed);
        self.set_last_action(action);
    }

    pub fn record_skipped_no_leader(&self, action: impl Into<String>) {
        self.skipped_no_leader.fetch_add(1, Ordering::Relaxed);
        self.set_last_action(action);
    }

    /// Record a closed position. Break-even counts as a win.
    pub fn record_exit(&self, pnl: Decimal, action: impl Into<String>) {
        self.exits.fetch_add(1, Ordering::Relaxed);
        if pnl >= Decimal::ZERO {
            self.wins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.losses.fetch_add(1, Ordering::Relaxed);
        }

        let now = self.clock.now();
        let mut buckets = self.pnl.lock();
        self.roll_day(&mut buckets, now);
        buckets.total += pnl;
        buckets.daily += pnl;
        *buckets
            .hourly
            .entry(self.calendar.hour_key(now))
            .or_insert(Decimal::ZERO) += pnl;
        buckets.last_action = action.into();
    }

    pub fn set_last_action(&self, action: impl Into<String>) {
        self.pnl.lock().last_action = action.into();
    }

    fn roll_day(&self, buckets: &mut PnlBuckets, now: DateTime<Utc>) {
        let today = self.calendar.day(now);
        if today != buckets.day {
            info!(
                strategy = %self.strategy,
                previous_day = %buckets.day,
                daily_pnl = %buckets.daily,
                "Local day rolled over, resetting daily and hourly pnl"
            );
            buckets.day = today;
            buckets.daily = Decimal::ZERO;
            buckets.hourly.clear();
        }
    }

    /// Log the hourly report when the local hour has changed since the last one.
    ///
    /// Returns true when a report was logged.
    pub fn maybe_report_hourly(&self) -> bool {
        let now = self.clock.now();
        let hour = self.calendar.hour_key(now);
        let mut buckets = self.pnl.lock();
        self.roll_day(&mut buckets, now);
        if buckets.report_hour == hour {
            return false;
        }

        let finished = std::mem::replace(&mut buckets.report_hour, hour);
        let hour_pnl = buckets.hourly.get(&finished).copied().unwrap_or(Decimal::ZERO);
        info!(
            strategy = %self.strategy,
            hour = %finished,
            hour_pnl = %hour_pnl,
            daily_pnl = %buckets.daily,
            total_pnl = %buckets.total,
            trades = self.trades(),
            wins = self.wins(),
            losses = self.losses(),
            "Hourly report"
        );
        true
    }

    pub fn signals(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    pub fn trades(&self) -> u64 {
        self.trades.load(Ordering::Relaxed)
    }

    pub fn exits(&self) -> u64 {
        self.exits.load(Ordering::Relaxed)
    }

    pub fn wins(&self) -> u64 {
        self.wins.load(Ordering::Relaxed)
    }

    pub fn losses(&self) -> u64 {
        self.losses.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles.load(Ordering::Relaxed)
    }

    pub fn total_pnl(&self) -> Decimal {
        self.pnl.lock().total
    }

    /// Realised pnl for the current local day.
    pub fn daily_pnl(&self) -> Decimal {
        let now = self.clock.now();
        let mut buckets = self.pnl.lock();
        self.roll_day(&mut buckets, now);
        buckets.daily
    }

    pub fn hourly_pnl(&self) -> BTreeMap<String, Decimal> {
        let now = self.clock.now();
        let mut buckets = self.pnl.lock();
        self.roll_day(&mut buckets, now);
        buckets.hourly.clone()
    }

    pub fn last_action(&self) -> String {
        self.pnl.lock().last_action.clone()
    }

    /// Win rate in percent over closed positions.
    pub fn win_rate(&self) -> Decimal {
        let total = self.wins() + self.losses();
        if total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins()) / Decimal::from(total) * dec!(100)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = self.clock.now();
        let mut buckets = self.pnl.lock();
        self.roll_day(&mut buckets, now);

        StatsSnapshot {
            session_id: self.session_id,
            strategy: self.strategy.clone(),
            mode: self.mode,
            started_at: self.started_at,
            duration_secs: (now - self.started_at).num_seconds(),
            signals: self.signals(),
            trades: self.trades(),
            exits: self.exits(),
            wins: self.wins(),
            losses: self.losses(),
            win_rate: self.win_rate(),
            rejected: self.rejected(),
            skipped_cycles: self.skipped_cycles(),
            skipped_choppy: self.skipped_choppy.load(Ordering::Relaxed),
            skipped_no_leader: self.skipped_no_leader.load(Ordering::Relaxed),
            total_pnl: buckets.total,
            daily_pnl: buckets.daily,
            hourly_pnl: buckets.hourly.clone(),
            last_action: buckets.last_action.clone(),
            current_signal: buckets.current_signal.clone(),
        }
    }

    /// Log the end-of-session summary.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            session_id = %s.session_id,
            strategy = %s.strategy,
            mode = %s.mode,
            duration_secs = s.duration_secs,
            signals = s.signals,
            trades = s.trades,
            exits = s.exits,
            wins = s.wins,
            losses = s.losses,
            win_rate = %s.win_rate.round_dp(1),
            rejected = s.rejected,
            skipped_cycles = s.skipped_cycles,
            skipped_choppy = s.skipped_choppy,
            skipped_no_leader = s.skipped_no_leader,
            total_pnl = %s.total_pnl,
            "Session summary"
        );
    }
}

/// Plain serialisable copy of [`StatsAggregator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub session_id: Uuid,
    pub strategy: String,
    pub mode: TradingMode,
    pub started_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub signals: u64,
    pub trades: u64,
    pub exits: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: Decimal,
    pub rejected: u64,
    pub skipped_cycles: u64,
    pub skipped_choppy: u64,
    pub skipped_no_leader: u64,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub hourly_pnl: BTreeMap<String, Decimal>,
    pub last_action: String,
    pub current_signal: String,
}
