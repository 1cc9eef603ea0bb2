use ra_domain::config::{Config, ConfigSeverity};

#[test]
fn default_upstream_retry_sequence() {
    let config = Config::default();
    assert_eq!(config.upstream.retry_delays_secs, vec![2, 5, 10]);
    assert_eq!(config.upstream.max_attempts, 4);
    assert_eq!(config.upstream.max_retry_after_secs, 60);
    assert_eq!(config.upstream.protocol_version, "2024-11-05");
}

#[test]
fn default_turn_and_autoplay_limits() {
    let config = Config::default();
    assert_eq!(config.turn.max_rounds, 20);
    assert_eq!(config.autoplay.interval_secs, 75);
    assert_eq!(config.autoplay.max_consecutive_errors, 3);
}

#[test]
fn default_compression_policy() {
    let config = Config::default();
    let c = &config.compression;
    assert_eq!(c.keep_full_turns, 10);
    assert_eq!(c.action_result_max_chars, 500);
    assert_eq!(c.marker, "[compressed - old state data]");
    assert!(c.auth_tools.contains(&"login".to_string()));
    assert!(c.state_tools.contains(&"get_status".to_string()));
    assert!(c.state_tools.contains(&"captains_log_list".to_string()));
}

#[test]
fn partial_toml_keeps_other_defaults() {
    let toml_str = r#"
[upstream]
url = "https://game.example/mcp"

[compression]
keep_full_turns = 4
truncate_tail_chars = 100
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.upstream.url, "https://game.example/mcp");
    assert_eq!(config.upstream.retry_delays_secs, vec![2, 5, 10]);
    assert_eq!(config.compression.keep_full_turns, 4);
    assert_eq!(config.compression.truncate_tail_chars, 100);
    assert_eq!(config.compression.truncate_head_chars, 200);
}

#[test]
fn defaults_validate_cleanly() {
    assert!(Config::default().validate().is_empty());
}

#[test]
fn oversized_truncation_is_rejected() {
    let mut config = Config::default();
    config.compression.truncate_tail_chars = 400;
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.severity == ConfigSeverity::Error && e.field == "compression.truncate_head_chars"));
}

#[test]
fn zero_rounds_is_rejected() {
    let mut config = Config::default();
    config.turn.max_rounds = 0;
    let issues = config.validate();
    assert!(issues.iter().any(|e| e.field == "turn.max_rounds"));
}

#[test]
fn retries_without_delays_is_rejected() {
    let mut config = Config::default();
    config.upstream.retry_delays_secs.clear();
    let issues = config.validate();
    assert!(issues.iter().any(|e| e.field == "upstream.retry_delays_secs"));
}
