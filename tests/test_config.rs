//! Tests for YAML configuration loading.

use std::io::Write as _;
use std::time::Duration;

use tempfile::NamedTempFile;

use tradeflow::breaker::BreakerConfig;
use tradeflow::cli::config::TradeflowConfig;
use tradeflow::engine::types::ConditionPolicy;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn full_config_parses() {
    let file = write_config(
        r#"
host: 0.0.0.0
port: 9000
store_dir: /tmp/tradeflow-data
workers: 4
condition_policy: strict
breaker:
  failure_threshold: 3
  reset_timeout_seconds: 30
  half_open_max_calls: 2
tasks:
  - id: fetch-prices
    name: Fetch prices
    task_type: market_data
    interval_seconds: 300
    params:
      symbol: BTC/USDT
  - id: on-demand
    name: On demand task
    task_type: backtest
workflows:
  - id: daily-analysis
    name: Daily analysis
    category: crypto
    default_params:
      depth: 10
    steps:
      - order: 1
        name: fetch
        step_type: http_fetch
        timeout_seconds: 30
      - order: 2
        name: analyze
        step_type: analysis
        condition: result.rows > 0
"#,
    );

    let config = TradeflowConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.port, Some(9000));
    assert_eq!(config.workers, Some(4));
    assert_eq!(config.condition_policy, Some(ConditionPolicy::Strict));

    assert_eq!(config.tasks.len(), 2);
    assert_eq!(config.tasks[0].id, "fetch-prices");
    assert_eq!(config.tasks[0].interval_seconds, Some(300.0));
    assert_eq!(
        config.tasks[0].params.get("symbol").unwrap(),
        &serde_json::json!("BTC/USDT")
    );
    assert_eq!(config.tasks[1].interval_seconds, None);

    assert_eq!(config.workflows.len(), 1);
    let wf = &config.workflows[0];
    assert_eq!(wf.id, "daily-analysis");
    assert_eq!(wf.steps.len(), 2);
    assert_eq!(wf.steps[0].timeout_seconds, Some(30.0));
    assert_eq!(wf.steps[1].condition.as_deref(), Some("result.rows > 0"));

    let breaker = config.breaker_config();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.reset_timeout, Duration::from_secs(30));
    assert_eq!(breaker.half_open_max_calls, 2);
}

#[test]
fn empty_config_falls_back_to_defaults() {
    let file = write_config("{}");
    let config = TradeflowConfig::load(Some(file.path())).unwrap();

    assert!(config.host.is_none());
    assert!(config.port.is_none());
    assert!(config.condition_policy.is_none());
    assert!(config.tasks.is_empty());
    assert!(config.workflows.is_empty());

    let defaults = BreakerConfig::default();
    let breaker = config.breaker_config();
    assert_eq!(breaker.failure_threshold, defaults.failure_threshold);
    assert_eq!(breaker.reset_timeout, defaults.reset_timeout);
    assert_eq!(breaker.half_open_max_calls, defaults.half_open_max_calls);
}

#[test]
fn partial_breaker_settings_merge_with_defaults() {
    let file = write_config("breaker:\n  failure_threshold: 10\n");
    let config = TradeflowConfig::load(Some(file.path())).unwrap();

    let defaults = BreakerConfig::default();
    let breaker = config.breaker_config();
    assert_eq!(breaker.failure_threshold, 10);
    assert_eq!(breaker.reset_timeout, defaults.reset_timeout);
    assert_eq!(breaker.half_open_max_calls, defaults.half_open_max_calls);
}

#[test]
fn negative_reset_timeout_falls_back_to_default() {
    let file = write_config("breaker:\n  reset_timeout_seconds: -5\n");
    let config = TradeflowConfig::load(Some(file.path())).unwrap();

    let breaker = config.breaker_config();
    assert_eq!(breaker.reset_timeout, BreakerConfig::default().reset_timeout);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let err = TradeflowConfig::load(Some(std::path::Path::new("/no/such/file.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn invalid_yaml_is_an_error() {
    let file = write_config("tasks: {not: [a, list}");
    assert!(TradeflowConfig::load(Some(file.path())).is_err());
}
