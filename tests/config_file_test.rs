//! Configuration loading from disk, environment and CLI

mod common;

use std::time::Duration;

use serial_test::serial;

use common::temp_config_file;
use stackrox_mcp::cli::{Cli, Commands};
use stackrox_mcp::config::{AuthType, Config, ServerType};

const FULL_CONFIG: &str = r#"
central:
  url: central.example.com:8443
  auth_type: static
  api_token: s3cr3t
  force_http1: true
  request_timeout: 10s
  max_retries: 4
  initial_backoff: 500ms
  max_backoff: 5s
global:
  read_only_tools: true
server:
  type: streamable-http
  address: 127.0.0.1
  port: 9090
tools:
  vulnerability:
    enabled: true
  config_manager:
    enabled: false
"#;

#[test]
#[serial]
fn test_load_full_config_file() {
    let (_dir, path) = temp_config_file(FULL_CONFIG);

    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.auth_type(), Some(AuthType::Static));
    assert_eq!(config.central.hostname().unwrap(), "central.example.com");
    assert_eq!(config.central.endpoint().unwrap().port(), Some(8443));
    assert!(config.central.force_http1);
    assert_eq!(config.central.request_timeout, Duration::from_secs(10));
    assert_eq!(config.central.max_retries, 4);
    assert_eq!(config.central.initial_backoff, Duration::from_millis(500));
    assert_eq!(config.central.max_backoff, Duration::from_secs(5));
    assert_eq!(config.server_type(), Some(ServerType::StreamableHttp));
    assert_eq!(config.server.port, 9090);
    assert!(config.tools.vulnerability.enabled);
    assert!(!config.tools.config_manager.enabled);
}

#[test]
#[serial]
fn test_cli_serve_flags_override_file() {
    let (_dir, path) = temp_config_file(FULL_CONFIG);
    let cli = Cli {
        config: Some(path.to_string_lossy().to_string()),
        verbose: false,
        command: Some(Commands::Serve {
            server_type: Some("stdio".to_string()),
            port: Some(7000),
        }),
    };

    let config = Config::load(cli.config_path(), &cli).unwrap();
    assert_eq!(config.server_type(), Some(ServerType::Stdio));
    assert_eq!(config.server.port, 7000);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let (_dir, path) = temp_config_file(FULL_CONFIG);
    std::env::set_var("STACKROX_MCP__SERVER__PORT", "9191");
    std::env::set_var("STACKROX_MCP__TOOLS__CONFIG_MANAGER__ENABLED", "true");

    let config = Config::load(path.to_str().unwrap(), &Cli::default());

    std::env::remove_var("STACKROX_MCP__SERVER__PORT");
    std::env::remove_var("STACKROX_MCP__TOOLS__CONFIG_MANAGER__ENABLED");

    let config = config.unwrap();
    assert_eq!(config.server.port, 9191);
    assert!(config.tools.config_manager.enabled);
}

#[test]
#[serial]
fn test_invalid_file_is_rejected() {
    let (_dir, path) = temp_config_file("central: [not, a, map]\n");
    let err = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"), "{}", err);
}

#[test]
#[serial]
fn test_validation_reports_first_problem() {
    let (_dir, path) = temp_config_file(
        r#"
central:
  auth_type: passthrough
  api_token: should-not-be-here
tools:
  vulnerability:
    enabled: true
"#,
    );

    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(
        err.to_string()
            .contains("central.api_token can not be set for passthrough auth type"),
        "{}",
        err
    );
}

#[test]
#[serial]
fn test_redacted_config_is_safe_to_print() {
    let (_dir, path) = temp_config_file(FULL_CONFIG);
    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();

    let printed = serde_yaml::to_string(&config.redacted()).unwrap();
    assert!(!printed.contains("s3cr3t"));
    assert!(printed.contains("***REDACTED***"));
    assert!(printed.contains("request_timeout: 10s"));
}
