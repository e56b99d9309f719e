//! Integration tests for configuration loading

use famfin_core::domain::envelope::EventType;
use famfin_core::infra::Config;
use famfin_core::services::access_gate::RouteTable;
use famfin_core::services::event_bus::BusOptions;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[event_stream]
url = "wss://api.famfin.test/ws"
reconnect_delay_ms = 500
connect_timeout_ms = 3000
outbound_buffer = 16
extension_types = ["REWARD_UPDATE", "CHALLENGE_UPDATE"]

[routes]
sign_in = "/login"
auth_only = ["/login"]
public = ["/", "/login", "/help/"]
kid_prefix = "/kid"
parent_prefix = "/parent"
kid_home = "/kid/home"
parent_home = "/parent/home"
callback_param = "next"

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.stream_url(), "wss://api.famfin.test/ws");
    assert_eq!(config.reconnect_delay_ms(), 500);
    assert_eq!(config.connect_timeout_ms(), 3000);
    assert_eq!(config.outbound_buffer(), 16);
    assert_eq!(config.extension_types().len(), 2);
    assert_eq!(config.sign_in_path(), "/login");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());

    let options = BusOptions::from_config(&config);
    assert_eq!(options.reconnect_delay, Duration::from_millis(500));
    assert_eq!(
        options.registry.resolve("REWARD_UPDATE"),
        Some(EventType::Extension("REWARD_UPDATE".to_string()))
    );
    assert_eq!(options.registry.resolve("SURPRISE_UPDATE"), None);

    let routes = RouteTable::from_config(&config);
    assert!(routes.is_public("/help"));
    assert!(routes.is_auth_only("/login"));
    assert_eq!(routes.kid_home, "/kid/home");
    assert_eq!(routes.callback_param, "next");
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.stream_url(), "ws://localhost:4000/ws");
    assert_eq!(config.reconnect_delay_ms(), 2000);
    assert_eq!(config.kid_home(), "/dashboard/kids");
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[event_stream\nurl = ").unwrap();
    temp_file.flush().unwrap();
    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.stream_url(), "ws://localhost:4000/ws");
    assert_eq!(config.reconnect_delay_ms(), 2000);
    assert_eq!(config.config_file(), "default");
}
