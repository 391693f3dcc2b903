//! Tests for the shipped `config/bot.toml`.

use rust_decimal_macros::dec;

use poly_bot::config::{EntryRuleKind, TradingMode};
use poly_bot::risk::Settlement;
use poly_bot::strategy::EntryRule;
use poly_bot::BotConfig;

const SHIPPED: &str = include_str!("../../../config/bot.toml");

#[test]
fn test_shipped_config_is_valid() {
    let config = BotConfig::from_toml_str(SHIPPED).unwrap();
    config.validate().unwrap();

    assert_eq!(config.mode, TradingMode::Paper);
    assert_eq!(config.general.timezone, "America/New_York");
    assert_eq!(config.risk.daily_loss_limit, dec!(-100));
    assert_eq!(config.risk.consecutive_losses_to_pause, 2);

    let names: Vec<_> = config.strategies.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["momentum", "spike", "late_leader"]);
}

#[test]
fn test_shipped_profiles() {
    let config = BotConfig::from_toml_str(SHIPPED).unwrap();

    let momentum = &config.strategies[0];
    assert_eq!(momentum.entry_rule, EntryRuleKind::Momentum);
    assert_eq!(momentum.moonbag, dec!(0.15));
    assert_eq!(momentum.profit_target, dec!(0.05));
    assert!(momentum.ladder);

    let spike = &config.strategies[1];
    let EntryRule::Move(rule) = spike.tracker_config().rule else {
        panic!("spike profile should use a move rule");
    };
    assert_eq!(rule.min_move, dec!(20));
    assert_eq!(rule.window, chrono::Duration::milliseconds(1500));
    assert_eq!(rule.confirmation.min_range, dec!(10));

    let leader = &config.strategies[2];
    assert_eq!(leader.entry_rule, EntryRuleKind::LateLeader);
    assert_eq!(leader.hard_stop, dec!(-0.25));
    let exit = leader.exit_config();
    assert!(!exit.ladder);
    assert_eq!(exit.settlement, Settlement::Binary);
    assert!(exit.guard.is_some());
}

#[test]
fn test_cli_selects_profiles_in_order() {
    let mut config = BotConfig::from_toml_str(SHIPPED).unwrap();
    config
        .apply_cli_overrides(
            Some("shadow".to_string()),
            None,
            Some(vec!["late_leader".to_string(), "momentum".to_string()]),
        )
        .unwrap();

    assert_eq!(config.mode, TradingMode::Shadow);
    assert_eq!(config.strategies.len(), 2);
    assert_eq!(config.strategies[0].name, "late_leader");
    config.validate().unwrap();
}

#[test]
fn test_live_mode_rejected() {
    let mut config = BotConfig::from_toml_str(SHIPPED).unwrap();
    config
        .apply_cli_overrides(Some("live".to_string()), None, None)
        .unwrap();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Live mode"));
}
