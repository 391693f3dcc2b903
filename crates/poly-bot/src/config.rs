//! Configuration for poly-bot.
//!
//! Supports loading from TOML file with environment variable and CLI
//! overrides. Percentages in the file (`moonbag_pct = 15.0`) are stored as
//! ratios (`0.15`).

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Duration as ChronoDuration;
use poly_common::CryptoAsset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::clock::{LocalCalendar, DEFAULT_TIMEZONE};
use crate::feed::binance::BINANCE_WS_URL;
use crate::feed::DEFAULT_BUFFER_CAPACITY;
use crate::risk::{ExitConfig, GuardConfig, PnlRiskConfig, Settlement};
use crate::strategy::signal::{Confirmation, DetectorKind};
use crate::strategy::window::{EntryRule, LateLeaderRule, MoveRule, TrackerConfig};

/// Top-level configuration for poly-bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Trading mode: paper, shadow (live is rejected).
    pub mode: TradingMode,

    /// Logging level.
    pub log_level: String,

    /// Loop timing and shared settings.
    pub general: GeneralConfig,

    /// Reference price feed.
    pub feed: FeedConfig,

    /// Polymarket endpoints.
    pub venue: VenueConfig,

    /// Session entry gate, applied per strategy instance.
    pub risk: PnlRiskConfig,

    /// Strategy profiles to run, one engine each.
    pub strategies: Vec<StrategyConfig>,
}

/// Trading mode determines what the venue is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Real money. Not supported: no order signing.
    Live,
    /// Real data, simulated fills at the top of book.
    Paper,
    /// Real data, decisions logged, nothing bought.
    Shadow,
}

impl TradingMode {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(TradingMode::Live),
            "paper" => Some(TradingMode::Paper),
            "shadow" => Some(TradingMode::Shadow),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Shadow => write!(f, "shadow"),
        }
    }
}

/// Loop timing and shared settings.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// Evaluation cycle period.
    pub poll_interval: Duration,
    /// How often each engine rediscovers markets.
    pub discovery_interval: Duration,
    /// Timeout applied to every venue call.
    pub venue_timeout: Duration,
    /// IANA time zone for day/hour buckets.
    pub timezone: String,
    /// Asset whose up/down markets are traded.
    pub asset: CryptoAsset,
}

impl GeneralConfig {
    pub fn calendar(&self) -> LocalCalendar {
        LocalCalendar::from_name(&self.timezone).unwrap_or_default()
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            discovery_interval: Duration::from_secs(30),
            venue_timeout: Duration::from_millis(3000),
            timezone: DEFAULT_TIMEZONE.name().to_string(),
            asset: CryptoAsset::Btc,
        }
    }
}

/// Reference price feed settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub binance_ws_url: String,
    /// Feed is stale when the newest tick is this old.
    pub staleness: ChronoDuration,
    pub buffer_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            binance_ws_url: format!("{}/btcusdt@trade", BINANCE_WS_URL),
            staleness: ChronoDuration::seconds(10),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Polymarket endpoints.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub gamma_url: String,
    pub clob_url: String,
    pub request_timeout: Duration,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            gamma_url: poly_market::GAMMA_API_URL.to_string(),
            clob_url: poly_market::CLOB_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Entry rule family of a strategy profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRuleKind {
    Spike,
    Momentum,
    LateLeader,
}

impl std::fmt::Display for EntryRuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryRuleKind::Spike => write!(f, "spike"),
            EntryRuleKind::Momentum => write!(f, "momentum"),
            EntryRuleKind::LateLeader => write!(f, "late_leader"),
        }
    }
}

/// One strategy profile. Gains are ratios, prices are outcome-token prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    pub name: String,
    pub entry_rule: EntryRuleKind,

    // Entry
    pub spike_move_usd: Decimal,
    pub spike_window: ChronoDuration,
    pub baseline_delay: ChronoDuration,
    pub entry_cutoff_secs: i64,
    pub min_entry_price: Decimal,
    pub budget_usdc: Decimal,
    pub min_volume: Decimal,
    pub min_range_usd: Decimal,

    // Exit ladder
    pub hard_stop: Decimal,
    pub hard_cap: Decimal,
    pub moonbag: Decimal,
    pub drawdown: Decimal,
    pub protection_exit: Decimal,
    pub profit_target: Decimal,
    pub max_loss_per_trade_usd: Decimal,
    pub ladder: bool,
    pub expiry_settlement: Settlement,
    pub settle_grace: ChronoDuration,

    // Late leader
    pub analysis_start_secs: i64,
    pub decision_secs: i64,
    pub final_cutoff_secs: i64,
    pub leader_threshold: Decimal,
    pub choppy_threshold: Decimal,

    // Manipulation guard
    pub guard_enabled: bool,
    pub guard_favor_price: Decimal,
    pub guard_floor_price: Decimal,
}

impl StrategyConfig {
    /// Defaults for an entry rule family.
    pub fn preset(name: impl Into<String>, entry_rule: EntryRuleKind) -> Self {
        let guard = GuardConfig::default();
        let late = entry_rule == EntryRuleKind::LateLeader;
        Self {
            name: name.into(),
            entry_rule,
            spike_move_usd: dec!(15),
            spike_window: ChronoDuration::seconds(2),
            baseline_delay: ChronoDuration::seconds(10),
            entry_cutoff_secs: 20,
            min_entry_price: dec!(0.20),
            budget_usdc: dec!(50),
            min_volume: Decimal::ZERO,
            min_range_usd: Decimal::ZERO,
            hard_stop: dec!(-0.50),
            hard_cap: dec!(0.20),
            moonbag: dec!(0.15),
            drawdown: dec!(-0.15),
            protection_exit: dec!(-0.10),
            profit_target: dec!(0.05),
            max_loss_per_trade_usd: Decimal::ZERO,
            ladder: !late,
            expiry_settlement: if late {
                Settlement::Binary
            } else {
                Settlement::MarkToBid
            },
            settle_grace: ChronoDuration::seconds(30),
            analysis_start_secs: 180,
            decision_secs: 60,
            final_cutoff_secs: 20,
            leader_threshold: dec!(0.70),
            choppy_threshold: dec!(0.65),
            guard_enabled: late,
            guard_favor_price: guard.favor_price,
            guard_floor_price: guard.floor_price,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        let rule = match self.entry_rule {
            EntryRuleKind::Spike | EntryRuleKind::Momentum => EntryRule::Move(MoveRule {
                kind: if self.entry_rule == EntryRuleKind::Spike {
                    DetectorKind::Spike
                } else {
                    DetectorKind::Momentum
                },
                min_move: self.spike_move_usd,
                window: self.spike_window,
                confirmation: Confirmation {
                    min_volume: self.min_volume,
                    min_range: self.min_range_usd,
                },
            }),
            EntryRuleKind::LateLeader => EntryRule::LateLeader(LateLeaderRule {
                analysis_start_secs: self.analysis_start_secs,
                decision_secs: self.decision_secs,
                final_cutoff_secs: self.final_cutoff_secs,
                leader_threshold: self.leader_threshold,
                choppy_threshold: self.choppy_threshold,
            }),
        };
        TrackerConfig {
            baseline_delay: self.baseline_delay,
            entry_cutoff_secs: self.entry_cutoff_secs,
            rule,
        }
    }

    pub fn exit_config(&self) -> ExitConfig {
        ExitConfig {
            hard_stop: self.hard_stop,
            hard_cap: self.hard_cap,
            moonbag: self.moonbag,
            drawdown: self.drawdown,
            protection_exit: self.protection_exit,
            profit_target: self.profit_target,
            max_loss_per_trade: self.max_loss_per_trade_usd,
            ladder: self.ladder,
            settlement: self.expiry_settlement,
            settle_grace: self.settle_grace,
            guard: self.guard_enabled.then_some(GuardConfig {
                favor_price: self.guard_favor_price,
                floor_price: self.guard_floor_price,
            }),
        }
    }

    /// Check threshold ordering for this profile.
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        if name.trim().is_empty() {
            bail!("strategy name must not be empty");
        }
        if self.budget_usdc <= Decimal::ZERO {
            bail!("[{name}] budget_usdc must be positive");
        }
        if self.min_entry_price <= Decimal::ZERO || self.min_entry_price >= Decimal::ONE {
            bail!("[{name}] min_entry_price must be between 0 and 1");
        }
        if self.spike_move_usd <= Decimal::ZERO {
            bail!("[{name}] spike_move_usd must be positive");
        }
        if self.spike_window <= ChronoDuration::zero() {
            bail!("[{name}] spike_window_secs must be positive");
        }
        if self.entry_cutoff_secs < 0 {
            bail!("[{name}] entry_cutoff_secs cannot be negative");
        }

        if !(self.hard_stop < self.drawdown
            && self.drawdown < self.protection_exit
            && self.protection_exit < Decimal::ZERO)
        {
            bail!("[{name}] require hard_stop < drawdown < protection_exit < 0");
        }
        if self.profit_target <= Decimal::ZERO {
            bail!("[{name}] profit_target_pct must be positive");
        }
        if self.moonbag > self.hard_cap {
            bail!("[{name}] moonbag_pct cannot exceed hard_cap_pct");
        }
        if self.max_loss_per_trade_usd < Decimal::ZERO {
            bail!("[{name}] max_loss_per_trade_usd cannot be negative");
        }

        if self.entry_rule == EntryRuleKind::LateLeader {
            if !(self.choppy_threshold < self.leader_threshold
                && self.leader_threshold <= Decimal::ONE)
            {
                bail!("[{name}] require choppy_threshold < leader_threshold <= 1");
            }
            if !(self.analysis_start_secs > self.decision_secs
                && self.decision_secs >= self.final_cutoff_secs)
            {
                bail!("[{name}] require analysis_start_secs > decision_secs >= final_cutoff_secs");
            }
        }

        if self.guard_enabled
            && !(Decimal::ZERO < self.guard_floor_price
                && self.guard_floor_price < self.guard_favor_price
                && self.guard_favor_price < Decimal::ONE)
        {
            bail!("[{name}] require 0 < guard_floor_price < guard_favor_price < 1");
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::preset("momentum", EntryRuleKind::Momentum)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::from(TomlConfig::default())
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("POLY_BOT_MODE")
            && let Some(m) = TradingMode::from_str(&mode)
        {
            self.mode = m;
        }

        if let Ok(level) = std::env::var("POLY_BOT_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Ok(budget) = std::env::var("POLY_BOT_BUDGET_USDC")
            && let Ok(budget) = budget.trim().parse::<Decimal>()
        {
            for strategy in &mut self.strategies {
                strategy.budget_usdc = budget;
            }
        }
    }

    /// Apply CLI argument overrides.
    ///
    /// `strategies` keeps only the named profiles, in the order given.
    pub fn apply_cli_overrides(
        &mut self,
        mode: Option<String>,
        log_level: Option<String>,
        strategies: Option<Vec<String>>,
    ) -> Result<()> {
        if let Some(mode_str) = mode {
            match TradingMode::from_str(&mode_str) {
                Some(m) => self.mode = m,
                None => bail!("Unknown trading mode: {mode_str}"),
            }
        }

        if let Some(level) = log_level {
            self.log_level = level;
        }

        if let Some(names) = strategies
            && !names.is_empty()
        {
            let mut selected = Vec::with_capacity(names.len());
            for name in &names {
                let Some(found) = self.strategies.iter().find(|s| &s.name == name) else {
                    bail!("Unknown strategy profile: {name}");
                };
                selected.push(found.clone());
            }
            self.strategies = selected;
        }
        Ok(())
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.mode == TradingMode::Live {
            bail!("Live mode is not supported: order signing is not available, use paper or shadow");
        }

        if self.general.poll_interval.is_zero() {
            bail!("poll_interval_ms must be positive");
        }
        if self.general.venue_timeout.is_zero() {
            bail!("venue_timeout_ms must be positive");
        }
        if LocalCalendar::from_name(&self.general.timezone).is_none() {
            bail!("unknown timezone: {}", self.general.timezone);
        }

        if self.feed.buffer_capacity == 0 {
            bail!("feed buffer_capacity must be positive");
        }
        if self.feed.staleness <= ChronoDuration::zero() {
            bail!("feed staleness_secs must be positive");
        }

        if self.risk.daily_loss_limit > Decimal::ZERO {
            bail!("daily_loss_limit_usd must be zero (disabled) or negative");
        }

        if self.strategies.is_empty() {
            bail!("at least one [[strategy]] profile is required");
        }
        for (i, strategy) in self.strategies.iter().enumerate() {
            strategy.validate()?;
            if self.strategies[..i].iter().any(|s| s.name == strategy.name) {
                bail!("duplicate strategy name: {}", strategy.name);
            }
        }

        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    feed: FeedToml,
    #[serde(default)]
    venue: VenueToml,
    #[serde(default)]
    risk: RiskToml,
    #[serde(default)]
    strategy: Vec<StrategyToml>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    mode: String,
    log_level: String,
    poll_interval_ms: u64,
    discovery_interval_secs: u64,
    venue_timeout_ms: u64,
    timezone: String,
    asset: CryptoAsset,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            mode: "paper".to_string(),
            log_level: "info".to_string(),
            poll_interval_ms: 500,
            discovery_interval_secs: 30,
            venue_timeout_ms: 3000,
            timezone: DEFAULT_TIMEZONE.name().to_string(),
            asset: CryptoAsset::Btc,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FeedToml {
    binance_ws_url: Option<String>,
    staleness_secs: u64,
    buffer_capacity: usize,
}

impl Default for FeedToml {
    fn default() -> Self {
        Self {
            binance_ws_url: None,
            staleness_secs: 10,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VenueToml {
    gamma_url: String,
    clob_url: String,
    request_timeout_ms: u64,
}

impl Default for VenueToml {
    fn default() -> Self {
        Self {
            gamma_url: poly_market::GAMMA_API_URL.to_string(),
            clob_url: poly_market::CLOB_API_URL.to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RiskToml {
    daily_loss_limit_usd: f64,
    consecutive_losses_to_pause: u32,
    pause_minutes: i64,
}

impl Default for RiskToml {
    fn default() -> Self {
        Self {
            daily_loss_limit_usd: -100.0,
            consecutive_losses_to_pause: 2,
            pause_minutes: 25,
        }
    }
}

/// Every field optional: unset fields take the entry rule's preset.
#[derive(Debug, Deserialize)]
struct StrategyToml {
    name: String,
    #[serde(default = "default_entry_rule")]
    entry_rule: EntryRuleKind,
    spike_move_usd: Option<f64>,
    spike_window_secs: Option<f64>,
    baseline_delay_secs: Option<i64>,
    entry_cutoff_secs: Option<i64>,
    min_entry_price: Option<f64>,
    budget_usdc: Option<f64>,
    min_volume: Option<f64>,
    min_range_usd: Option<f64>,
    hard_stop_pct: Option<f64>,
    hard_cap_pct: Option<f64>,
    moonbag_pct: Option<f64>,
    drawdown_pct: Option<f64>,
    protection_exit_pct: Option<f64>,
    profit_target_pct: Option<f64>,
    max_loss_per_trade_usd: Option<f64>,
    ladder: Option<bool>,
    expiry_settlement: Option<Settlement>,
    settle_grace_secs: Option<i64>,
    analysis_start_secs: Option<i64>,
    decision_secs: Option<i64>,
    final_cutoff_secs: Option<i64>,
    leader_threshold: Option<f64>,
    choppy_threshold: Option<f64>,
    guard_enabled: Option<bool>,
    guard_favor_price: Option<f64>,
    guard_floor_price: Option<f64>,
}

fn default_entry_rule() -> EntryRuleKind {
    EntryRuleKind::Momentum
}

/// Convert f64 percentage to Decimal ratio (e.g., 2.5 -> 0.025).
fn pct_to_decimal(pct: f64) -> Decimal {
    Decimal::try_from(pct / 100.0).unwrap_or(Decimal::ZERO)
}

/// Convert f64 to Decimal.
fn f64_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

impl From<StrategyToml> for StrategyConfig {
    fn from(toml: StrategyToml) -> Self {
        let mut s = StrategyConfig::preset(toml.name, toml.entry_rule);

        if let Some(v) = toml.spike_move_usd {
            s.spike_move_usd = f64_to_decimal(v);
        }
        if let Some(v) = toml.spike_window_secs {
            s.spike_window = ChronoDuration::milliseconds((v * 1000.0).round() as i64);
        }
        if let Some(v) = toml.baseline_delay_secs {
            s.baseline_delay = ChronoDuration::seconds(v);
        }
        if let Some(v) = toml.entry_cutoff_secs {
            s.entry_cutoff_secs = v;
            s.final_cutoff_secs = v;
        }
        if let Some(v) = toml.min_entry_price {
            s.min_entry_price = f64_to_decimal(v);
        }
        if let Some(v) = toml.budget_usdc {
            s.budget_usdc = f64_to_decimal(v);
        }
        if let Some(v) = toml.min_volume {
            s.min_volume = f64_to_decimal(v);
        }
        if let Some(v) = toml.min_range_usd {
            s.min_range_usd = f64_to_decimal(v);
        }

        if let Some(v) = toml.hard_stop_pct {
            s.hard_stop = pct_to_decimal(v);
        }
        if let Some(v) = toml.hard_cap_pct {
            s.hard_cap = pct_to_decimal(v);
        }
        if let Some(v) = toml.moonbag_pct {
            s.moonbag = pct_to_decimal(v);
        }
        if let Some(v) = toml.drawdown_pct {
            s.drawdown = pct_to_decimal(v);
        }
        if let Some(v) = toml.protection_exit_pct {
            s.protection_exit = pct_to_decimal(v);
        }
        if let Some(v) = toml.profit_target_pct {
            s.profit_target = pct_to_decimal(v);
        }
        if let Some(v) = toml.max_loss_per_trade_usd {
            s.max_loss_per_trade_usd = f64_to_decimal(v);
        }
        if let Some(v) = toml.ladder {
            s.ladder = v;
        }
        if let Some(v) = toml.expiry_settlement {
            s.expiry_settlement = v;
        }
        if let Some(v) = toml.settle_grace_secs {
            s.settle_grace = ChronoDuration::seconds(v);
        }

        if let Some(v) = toml.analysis_start_secs {
            s.analysis_start_secs = v;
        }
        if let Some(v) = toml.decision_secs {
            s.decision_secs = v;
        }
        if let Some(v) = toml.final_cutoff_secs {
            s.final_cutoff_secs = v;
        }
        if let Some(v) = toml.leader_threshold {
            s.leader_threshold = f64_to_decimal(v);
        }
        if let Some(v) = toml.choppy_threshold {
            s.choppy_threshold = f64_to_decimal(v);
        }

        if let Some(v) = toml.guard_enabled {
            s.guard_enabled = v;
        }
        if let Some(v) = toml.guard_favor_price {
            s.guard_favor_price = f64_to_decimal(v);
        }
        if let Some(v) = toml.guard_floor_price {
            s.guard_floor_price = f64_to_decimal(v);
        }
        s
    }
}

impl From<TomlConfig> for BotConfig {
    fn from(toml: TomlConfig) -> Self {
        let strategies = if toml.strategy.is_empty() {
            vec![StrategyConfig::default()]
        } else {
            toml.strategy.into_iter().map(StrategyConfig::from).collect()
        };

        Self {
            mode: TradingMode::from_str(&toml.general.mode).unwrap_or(TradingMode::Paper),
            log_level: toml.general.log_level,
            general: GeneralConfig {
                poll_interval: Duration::from_millis(toml.general.poll_interval_ms),
                discovery_interval: Duration::from_secs(toml.general.discovery_interval_secs),
                venue_timeout: Duration::from_millis(toml.general.venue_timeout_ms),
                timezone: toml.general.timezone,
                asset: toml.general.asset,
            },
            feed: FeedConfig {
                binance_ws_url: toml.feed.binance_ws_url.unwrap_or_else(|| {
                    format!("{}/{}@trade", BINANCE_WS_URL, toml.general.asset.binance_symbol())
                }),
                staleness: ChronoDuration::seconds(toml.feed.staleness_secs as i64),
                buffer_capacity: toml.feed.buffer_capacity,
            },
            venue: VenueConfig {
                gamma_url: toml.venue.gamma_url,
                clob_url: toml.venue.clob_url,
                request_timeout: Duration::from_millis(toml.venue.request_timeout_ms),
            },
            risk: PnlRiskConfig {
                daily_loss_limit: f64_to_decimal(toml.risk.daily_loss_limit_usd),
                consecutive_losses_to_pause: toml.risk.consecutive_losses_to_pause,
                pause: ChronoDuration::minutes(toml.risk.pause_minutes),
            },
            strategies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.mode, TradingMode::Paper);
        assert_eq!(config.general.asset, CryptoAsset::Btc);
        assert_eq!(config.strategies.len(), 1);
        assert_eq!(config.strategies[0].name, "momentum");
        assert_eq!(
            config.feed.binance_ws_url,
            "wss://stream.binance.com:9443/ws/btcusdt@trade"
        );
        assert_eq!(config.risk.daily_loss_limit, dec!(-100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trading_mode_from_str() {
        assert_eq!(TradingMode::from_str("live"), Some(TradingMode::Live));
        assert_eq!(TradingMode::from_str("PAPER"), Some(TradingMode::Paper));
        assert_eq!(TradingMode::from_str("shadow"), Some(TradingMode::Shadow));
        assert_eq!(TradingMode::from_str("backtest"), None);
    }

    #[test]
    fn test_trading_mode_display() {
        assert_eq!(TradingMode::Live.to_string(), "live");
        assert_eq!(TradingMode::Paper.to_string(), "paper");
        assert_eq!(TradingMode::Shadow.to_string(), "shadow");
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [general]
            mode = "shadow"
            log_level = "debug"
            poll_interval_ms = 250
            timezone = "Europe/London"

            [feed]
            staleness_secs = 5

            [risk]
            daily_loss_limit_usd = -50.0
            consecutive_losses_to_pause = 3

            [[strategy]]
            name = "fast"
            entry_rule = "spike"
            spike_move_usd = 20.0
            profit_target_pct = 10.0
            hard_stop_pct = -25.0

            [[strategy]]
            name = "leader"
            entry_rule = "late_leader"
            leader_threshold = 0.75
        "#;

        let config = BotConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.mode, TradingMode::Shadow);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.general.poll_interval, Duration::from_millis(250));
        assert_eq!(config.general.timezone, "Europe/London");
        assert_eq!(config.feed.staleness, ChronoDuration::seconds(5));
        assert_eq!(config.risk.daily_loss_limit, dec!(-50));
        assert_eq!(config.risk.consecutive_losses_to_pause, 3);

        let fast = &config.strategies[0];
        assert_eq!(fast.entry_rule, EntryRuleKind::Spike);
        assert_eq!(fast.spike_move_usd, dec!(20));
        assert_eq!(fast.profit_target, dec!(0.1));
        assert_eq!(fast.hard_stop, dec!(-0.25));
        assert!(fast.ladder);

        let leader = &config.strategies[1];
        assert_eq!(leader.leader_threshold, dec!(0.75));
        assert!(!leader.ladder);
        assert!(leader.guard_enabled);
        assert_eq!(leader.expiry_settlement, Settlement::Binary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_entry_rule_fails_parse() {
        let toml = r#"
            [[strategy]]
            name = "bad"
            entry_rule = "arbitrage"
        "#;
        assert!(BotConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let toml = r#"
            [[strategy]]
            name = "a"

            [[strategy]]
            name = "b"
            entry_rule = "late_leader"
        "#;
        let mut config = BotConfig::from_toml_str(toml).unwrap();

        config
            .apply_cli_overrides(
                Some("shadow".to_string()),
                Some("trace".to_string()),
                Some(vec!["b".to_string()]),
            )
            .unwrap();

        assert_eq!(config.mode, TradingMode::Shadow);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.strategies.len(), 1);
        assert_eq!(config.strategies[0].name, "b");

        assert!(config
            .apply_cli_overrides(None, None, Some(vec!["missing".to_string()]))
            .is_err());
        assert!(config
            .apply_cli_overrides(Some("yolo".to_string()), None, None)
            .is_err());
    }

    #[test]
    fn test_validate_live_mode_rejected() {
        let mut config = BotConfig::default();
        config.mode = TradingMode::Live;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_ordering() {
        let mut config = BotConfig::default();
        config.strategies[0].drawdown = dec!(-0.60);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.strategies[0].moonbag = dec!(0.25);
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.strategies[0].min_entry_price = Decimal::ONE;
        assert!(config.validate().is_err());

        let mut config = BotConfig::default();
        config.strategies[0].budget_usdc = Decimal::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_late_leader_offsets() {
        let mut config = BotConfig::default();
        let mut leader = StrategyConfig::preset("leader", EntryRuleKind::LateLeader);
        leader.decision_secs = 200;
        config.strategies = vec![leader];
        assert!(config.validate().is_err());

        let mut leader = StrategyConfig::preset("leader", EntryRuleKind::LateLeader);
        leader.choppy_threshold = dec!(0.80);
        config.strategies = vec![leader];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let mut config = BotConfig::default();
        config.strategies.push(StrategyConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timezone() {
        let mut config = BotConfig::default();
        assert_eq!(config.general.timezone, "America/New_York");
        config.validate().unwrap();

        config.general.timezone = "Mars/Olympus".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown timezone"));

        config.general.timezone = "Asia/Tokyo".to_string();
        config.validate().unwrap();
        assert_eq!(config.general.calendar().timezone(), chrono_tz::Tz::Asia__Tokyo);
    }

    #[test]
    fn test_preset_to_engine_configs() {
        let s = StrategyConfig::default();
        let tracker = s.tracker_config();
        assert_eq!(tracker.entry_cutoff_secs, 20);
        assert!(matches!(
            tracker.rule,
            EntryRule::Move(MoveRule { kind: DetectorKind::Momentum, .. })
        ));

        let exit = s.exit_config();
        assert_eq!(exit, ExitConfig::default());

        let leader = StrategyConfig::preset("leader", EntryRuleKind::LateLeader);
        assert!(leader.exit_config().guard.is_some());
        assert!(matches!(leader.tracker_config().rule, EntryRule::LateLeader(_)));
    }

    #[test]
    fn test_pct_to_decimal() {
        assert_eq!(pct_to_decimal(15.0), dec!(0.15));
        assert_eq!(pct_to_decimal(-50.0), dec!(-0.5));
        assert_eq!(f64_to_decimal(0.7), dec!(0.7));
    }
}
