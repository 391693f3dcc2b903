//! Strategy engine: one evaluation loop per strategy profile.
//!
//! The engine ties the shared reference feed and the venue to a set of
//! [`WindowTracker`]s and open [`Position`]s. Every poll interval it:
//!
//! 1. Rediscovers markets when the discovery interval has elapsed
//! 2. Evaluates every tracked window (entries)
//! 3. Evaluates every open position (exits, expiry settlement)
//! 4. Publishes an [`EngineSnapshot`] on a watch channel
//!
//! ## Failure Handling
//!
//! - Venue calls carry a timeout; a timeout or transport error means "no
//!   data this cycle" and is logged at warn
//! - A buy that does not fill leaves no position; the window stays decided
//! - A sell that fails leaves the position open and unchanged for the next
//!   cycle
//!
//! Engines for different profiles never share trackers or positions, even
//! when they track the same venue market.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use poly_common::{CryptoAsset, MarketWindow, WindowDuration};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::position::{ClosedPositionRecord, Position, PositionSnapshot};
use super::window::{
    EntryRule, EntrySignal, SkipReason, WindowAction, WindowInputs, WindowTracker,
};
use crate::clock::Clock;
use crate::config::{BotConfig, StrategyConfig, TradingMode};
use crate::feed::PriceFeed;
use crate::risk::{ExitContext, ExitDecision, PnlRiskConfig, PnlRiskGate, PositionRiskManager};
use crate::session::{StatsAggregator, StatsSnapshot};
use crate::state::ControlFlags;
use crate::venue::{Quote, Venue, VenueError};

/// Closed positions carried in each snapshot.
pub const RECENT_CLOSED: usize = 20;

/// Engine loop settings shared by every profile.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: TradingMode,
    pub asset: CryptoAsset,
    pub window: WindowDuration,
    pub poll_interval: Duration,
    pub discovery_interval: Duration,
    pub venue_timeout: Duration,
    pub risk: PnlRiskConfig,
}

impl EngineConfig {
    pub fn from_bot_config(config: &BotConfig) -> Self {
        Self {
            mode: config.mode,
            asset: config.general.asset,
            window: WindowDuration::FiveMin,
            poll_interval: config.general.poll_interval,
            discovery_interval: config.general.discovery_interval,
            venue_timeout: config.general.venue_timeout,
            risk: config.risk.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_bot_config(&BotConfig::default())
    }
}

/// Read-only engine state for dashboards and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub stats: StatsSnapshot,
    pub open: Vec<PositionSnapshot>,
    pub recent_closed: Vec<ClosedPositionRecord>,
}

/// One strategy profile's evaluation loop.
pub struct StrategyEngine {
    strategy: StrategyConfig,
    config: EngineConfig,
    feed: Arc<PriceFeed>,
    venue: Arc<dyn Venue>,
    clock: Arc<dyn Clock>,
    control: Arc<ControlFlags>,
    risk: PositionRiskManager,
    gate: PnlRiskGate,
    stats: Arc<StatsAggregator>,
    trackers: HashMap<String, WindowTracker>,
    /// Market id -> window end, for every market ever tracked.
    seen: HashMap<String, DateTime<Utc>>,
    open: Vec<Position>,
    last_bids: HashMap<uuid::Uuid, Decimal>,
    closed: Vec<ClosedPositionRecord>,
    last_discovery: Option<DateTime<Utc>>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl StrategyEngine {
    pub fn new(
        strategy: StrategyConfig,
        config: EngineConfig,
        feed: Arc<PriceFeed>,
        venue: Arc<dyn Venue>,
        clock: Arc<dyn Clock>,
        control: Arc<ControlFlags>,
        calendar: crate::clock::LocalCalendar,
    ) -> Self {
        let stats = Arc::new(StatsAggregator::new(
            strategy.name.clone(),
            config.mode,
            clock.clone(),
            calendar,
        ));
        let (snapshot_tx, _) = watch::channel(EngineSnapshot {
            stats: stats.snapshot(),
            open: Vec::new(),
            recent_closed: Vec::new(),
        });

        Self {
            risk: PositionRiskManager::new(strategy.exit_config()),
            gate: PnlRiskGate::new(config.risk.clone(), calendar),
            strategy,
            config,
            feed,
            venue,
            clock,
            control,
            stats,
            trackers: HashMap::new(),
            seen: HashMap::new(),
            open: Vec::new(),
            last_bids: HashMap::new(),
            closed: Vec::new(),
            last_discovery: None,
            snapshot_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.strategy.name
    }

    pub fn stats(&self) -> Arc<StatsAggregator> {
        self.stats.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn trackers(&self) -> impl Iterator<Item = &WindowTracker> {
        self.trackers.values()
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn closed_positions(&self) -> &[ClosedPositionRecord] {
        &self.closed
    }

    /// Run until shutdown is requested. The cycle in flight always finishes.
    pub async fn run(mut self) -> StatsSnapshot {
        info!(
            strategy = %self.strategy.name,
            entry_rule = %self.strategy.entry_rule,
            mode = %self.config.mode,
            budget = %self.strategy.budget_usdc,
            "Strategy engine started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if self.control.is_shutdown_requested() {
                break;
            }
            let now = self.clock.now();
            self.run_cycle(now).await;
        }

        if !self.open.is_empty() {
            warn!(
                strategy = %self.strategy.name,
                open = self.open.len(),
                "Stopping with open positions"
            );
        }
        self.stats.log_summary();
        self.stats.snapshot()
    }

    /// One evaluation cycle at `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) {
        self.stats.maybe_report_hourly();

        let interval = ChronoDuration::from_std(self.config.discovery_interval)
            .unwrap_or(ChronoDuration::zero());
        let discovery_due = self.last_discovery.is_none_or(|last| now - last >= interval);
        if discovery_due {
            self.discover(now).await;
        }

        self.evaluate_windows(now).await;
        self.evaluate_positions(now).await;
        self.publish();
    }

    async fn timed<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, VenueError>>,
    ) -> Result<T, VenueError> {
        match tokio::time::timeout(self.config.venue_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(VenueError::Timeout(what.to_string())),
        }
    }

    async fn quote(&self, market: &MarketWindow) -> Option<Quote> {
        match self.timed("quote", self.venue.quote(market)).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!(strategy = %self.strategy.name, market_id = %market.id, error = %e, "Quote unavailable");
                None
            }
        }
    }

    // === Discovery ===

    async fn discover(&mut self, now: DateTime<Utc>) {
        self.last_discovery = Some(now);
        let markets = match self
            .timed("discovery", self.venue.discover_active_markets(self.config.asset))
            .await
        {
            Ok(markets) => markets,
            Err(e) => {
                warn!(strategy = %self.strategy.name, error = %e, "Market discovery failed");
                return;
            }
        };

        let max_remaining = self.config.window.seconds();
        for market in markets {
            if self.seen.contains_key(&market.id) {
                continue;
            }
            let remaining = market.seconds_remaining(now);
            if remaining <= 0 || remaining > max_remaining {
                continue;
            }

            info!(
                strategy = %self.strategy.name,
                market_id = %market.id,
                remaining,
                "Tracking new market: {}",
                market.question
            );
            self.seen.insert(market.id.clone(), market.window_end);
            self.trackers.insert(
                market.id.clone(),
                WindowTracker::new(market, self.strategy.tracker_config()),
            );
        }

        let horizon = now - ChronoDuration::seconds(max_remaining);
        self.seen.retain(|_, end| *end > horizon);
    }

    // === Entries ===

    fn tick_horizon(&self) -> ChronoDuration {
        match self.strategy.tracker_config().rule {
            EntryRule::Move(rule) => rule.window + ChronoDuration::seconds(5),
            EntryRule::LateLeader(_) => ChronoDuration::seconds(5),
        }
    }

    async fn evaluate_windows(&mut self, now: DateTime<Utc>) {
        let reference_price = if self.feed.is_live(now) {
            self.feed.current_price()
        } else {
            None
        };
        // Late-leader entries read venue bids only.
        let uses_feed = matches!(self.strategy.tracker_config().rule, EntryRule::Move(_));
        let waiting_on_feed = uses_feed
            && reference_price.is_none()
            && self.trackers.values().any(|t| !t.is_decided());
        if waiting_on_feed {
            warn!(
                strategy = %self.strategy.name,
                last_update = ?self.feed.last_update(),
                "Reference feed stale, skipping entry checks"
            );
            self.stats.record_skipped_cycle();
        }

        let ticks = self.feed.ticks_since(now, self.tick_horizon());

        let mut ids: Vec<String> = self.trackers.keys().cloned().collect();
        ids.sort();

        for id in ids {
            let quote = match self.trackers.get(&id) {
                Some(tracker) if tracker.needs_quote(now) => {
                    let quote = self.quote(tracker.market()).await;
                    if quote.is_none() {
                        self.stats.record_skipped_cycle();
                    }
                    quote
                }
                Some(_) => None,
                None => continue,
            };

            let Some(tracker) = self.trackers.get_mut(&id) else {
                continue;
            };
            let action = tracker.evaluate(&WindowInputs {
                now,
                reference_price,
                ticks: &ticks,
                quote: quote.as_ref(),
            });
            let market = tracker.market().clone();

            match action {
                WindowAction::Idle => {}
                WindowAction::Enter(entry) => self.enter(now, &market, entry, quote).await,
                WindowAction::Unconfirmed(signal, failure) => {
                    self.stats.record_rejected(format!(
                        "REJECT {} ${:+}: {}",
                        signal.side(),
                        signal.delta,
                        failure
                    ));
                }
                WindowAction::Skip(reason) => match reason {
                    SkipReason::Choppy { .. } => self.stats.record_skipped_choppy(reason.to_string()),
                    SkipReason::NoLeader { .. } => {
                        self.stats.record_skipped_no_leader(reason.to_string())
                    }
                },
                WindowAction::Expired => {
                    debug!(strategy = %self.strategy.name, market_id = %id, "Dropping expired window");
                    self.trackers.remove(&id);
                }
            }
        }
    }

    async fn enter(
        &mut self,
        now: DateTime<Utc>,
        market: &MarketWindow,
        entry: EntrySignal,
        quote: Option<Quote>,
    ) {
        let side = entry.side;
        self.stats.record_signal(entry.to_string());

        if self.open.iter().any(|p| p.market.id == market.id) {
            warn!(strategy = %self.strategy.name, market_id = %market.id, "Position already open, ignoring entry");
            return;
        }
        if !self.control.can_enter() {
            self.stats.record_rejected(format!("SKIP {}: trading disabled", side));
            return;
        }
        if let Err(reason) = self.gate.check_entry(now) {
            info!(strategy = %self.strategy.name, market_id = %market.id, %reason, "Entry refused by risk gate");
            self.stats.record_rejected(format!("REJECT {}: {}", side, reason));
            return;
        }

        let quote = match quote {
            Some(q) => Some(q),
            None => self.quote(market).await,
        };
        let Some(ask) = entry.price_hint.or_else(|| quote.and_then(|q| q.ask(side))) else {
            warn!(strategy = %self.strategy.name, market_id = %market.id, %side, "No usable ask, entry skipped");
            self.stats.record_rejected(format!("SKIP {}: no ask", side));
            return;
        };
        if ask < self.strategy.min_entry_price {
            info!(
                strategy = %self.strategy.name,
                market_id = %market.id,
                %side,
                %ask,
                min = %self.strategy.min_entry_price,
                "Ask below minimum entry price, skipping buy"
            );
            self.stats.record_rejected(format!(
                "SKIP {}: ask {} < min {}",
                side, ask, self.strategy.min_entry_price
            ));
            return;
        }

        if self.config.mode == TradingMode::Shadow {
            info!(strategy = %self.strategy.name, market_id = %market.id, %side, %ask, "[SHADOW] would BUY");
            self.stats.record_rejected(format!("SHADOW BUY {} @ ${}", side, ask));
            return;
        }

        let fill = match self
            .timed("buy", self.venue.buy(market, side, self.strategy.budget_usdc))
            .await
        {
            Ok(fill) if fill.filled => fill,
            Ok(_) => {
                warn!(strategy = %self.strategy.name, market_id = %market.id, %side, "Buy not filled");
                self.stats.record_rejected(format!("BUY {} not filled", side));
                return;
            }
            Err(e) => {
                warn!(strategy = %self.strategy.name, market_id = %market.id, %side, error = %e, "Buy failed");
                self.stats.record_rejected(format!("BUY {} failed: {}", side, e));
                return;
            }
        };

        let position = Position::open(
            self.strategy.name.clone(),
            market.clone(),
            side,
            fill.price,
            fill.quantity,
            now,
        )
        .with_fallback_strike(entry.baseline);

        info!(
            strategy = %self.strategy.name,
            market_id = %market.id,
            %side,
            price = %fill.price,
            quantity = %fill.quantity,
            "Opened position"
        );
        self.stats
            .record_entry(format!("BUY {} @ ${}", side, fill.price));
        self.open.push(position);
    }

    // === Exits ===

    async fn evaluate_positions(&mut self, now: DateTime<Utc>) {
        let reference_price = self.feed.current_price();
        let mut i = 0;
        while i < self.open.len() {
            let market = self.open[i].market.clone();
            let quote = self.quote(&market).await;

            let side = self.open[i].side;
            let held_bid = quote.and_then(|q| q.bid(side));
            if let Some(bid) = held_bid {
                self.last_bids.insert(self.open[i].id, bid);
            }
            let ctx = ExitContext {
                now,
                held_bid,
                resolved_winner: quote.and_then(|q| q.resolved_winner),
                reference_price,
            };

            let decision = self.risk.evaluate(&mut self.open[i], &ctx);
            match decision {
                ExitDecision::Hold => {
                    if held_bid.is_none() && !market.is_expired(now) {
                        debug!(strategy = %self.strategy.name, market_id = %market.id, "No bid for held side");
                    }
                }
                ExitDecision::Transition { from, to } => {
                    let gain = held_bid
                        .map(|b| self.open[i].gain_at(b))
                        .unwrap_or_default();
                    info!(
                        strategy = %self.strategy.name,
                        market_id = %market.id,
                        %side,
                        %from,
                        %to,
                        gain = %gain,
                        "Risk mode transition"
                    );
                    self.stats.set_last_action(format!(
                        "{} {} {:+}%",
                        to.to_string().to_uppercase(),
                        side,
                        (gain * Decimal::ONE_HUNDRED).round_dp(1)
                    ));
                }
                ExitDecision::Close { reason, price } => {
                    let exit_price = if reason.requires_sell() {
                        match self.timed("sell", self.venue.sell(&self.open[i])).await {
                            Ok(fill) if fill.success => fill.price,
                            Ok(_) => {
                                warn!(strategy = %self.strategy.name, market_id = %market.id, %reason, "Sell failed, position stays open");
                                i += 1;
                                continue;
                            }
                            Err(e) => {
                                warn!(strategy = %self.strategy.name, market_id = %market.id, %reason, error = %e, "Sell failed, position stays open");
                                i += 1;
                                continue;
                            }
                        }
                    } else {
                        price
                    };

                    let mut position = self.open.remove(i);
                    let Some(pnl) = position.close(exit_price, reason, now) else {
                        continue;
                    };
                    self.last_bids.remove(&position.id);

                    info!(
                        strategy = %self.strategy.name,
                        market_id = %market.id,
                        %side,
                        %reason,
                        entry = %position.entry_price,
                        exit = %exit_price,
                        %pnl,
                        "Closed position"
                    );
                    self.gate.record_close(pnl, now);
                    self.stats.record_exit(
                        pnl,
                        format!("EXIT {} {} @ ${} pnl {:+}", reason, side, exit_price, pnl.round_dp(2)),
                    );
                    if let Some(record) = position.closed_record() {
                        self.closed.push(record);
                    }
                    continue;
                }
            }
            i += 1;
        }
    }

    // === Reporting ===

    pub fn snapshot(&self) -> EngineSnapshot {
        let skip = self.closed.len().saturating_sub(RECENT_CLOSED);
        EngineSnapshot {
            stats: self.stats.snapshot(),
            open: self
                .open
                .iter()
                .map(|p| p.snapshot(self.last_bids.get(&p.id).copied()))
                .collect(),
            recent_closed: self.closed[skip..].to_vec(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
