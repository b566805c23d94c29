//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use airquality_exporter::cli::{parse_args_from, Args};
use airquality_exporter::config::Config;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("airquality-exporter")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "--web.listen-address",
        "127.0.0.1:9100",
        "--port-path",
        "/dev/ttyS0",
        "--cycle",
        "10",
        "--no-force-set-cycle",
        "-v",
    ]))
    .unwrap();

    assert_eq!(result.listen_address.as_deref(), Some("127.0.0.1:9100"));
    assert_eq!(result.port_path.as_deref(), Some("/dev/ttyS0"));
    assert_eq!(result.cycle, Some(10));
    assert_eq!(result.force_set_cycle, Some(false));
    assert!(result.verbose);
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/airquality.json"])).unwrap();
    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/etc/airquality.json"
    );
}

#[test]
fn test_cli_rejects_malformed_values() {
    assert!(parse_args_from(args(&["--cycle", "5m"])).is_err());
    assert!(parse_args_from(args(&["--force-set-cycle=perhaps"])).is_err());
    assert!(parse_args_from(args(&["--unknown-flag"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_defaults_without_arguments() {
    let config = Config::load(&parse_args_from(args(&[])).unwrap()).unwrap();

    let session = config.to_session_config().unwrap();
    assert_eq!(session.port_path, "/dev/ttyUSB0");
    assert_eq!(session.cycle, 5);
    assert!(session.force_set_cycle);
    assert_eq!(session.retry.retries, 0);
    assert_eq!(session.retry.timeout, Duration::from_secs(10));

    let server = config.to_server_config().unwrap();
    assert_eq!(server.listen_address, ":9999");
}

#[test]
fn test_config_from_json_file() {
    let file = config_file(
        r#"{
        "web": { "listen_address": ":9100" },
        "sensor": {
            "port_path": "/dev/ttyAMA0",
            "cycle": 0,
            "force_set_cycle": false,
            "retries": 2,
            "call_timeout_secs": 5
        },
        "logging": { "level": "warn" }
    }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.web.listen_address, ":9100");
    assert_eq!(config.sensor.port_path, "/dev/ttyAMA0");
    assert_eq!(config.sensor.cycle, 0);
    assert!(!config.sensor.force_set_cycle);
    assert_eq!(config.logging.level, "warn");

    let session = config.to_session_config().unwrap();
    assert_eq!(session.retry.retries, 2);
    assert_eq!(session.retry.timeout, Duration::from_secs(5));
}

#[test]
fn test_config_priority_cli_over_file() {
    let file = config_file(
        r#"{
        "sensor": { "port_path": "/dev/ttyAMA0", "cycle": 3 }
    }"#,
    );

    let args = Args {
        cycle: Some(8),
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    // CLI value wins, file value survives where the CLI is silent
    assert_eq!(config.sensor.cycle, 8);
    assert_eq!(config.sensor.port_path, "/dev/ttyAMA0");
}

#[test]
fn test_verbose_overrides_file_level() {
    let file = config_file(r#"{ "logging": { "level": "error" } }"#);
    let args = Args {
        verbose: true,
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();
    assert_eq!(config.log_filter(), "debug");
}

#[test]
fn test_zero_call_timeout_in_file_is_rejected() {
    let file = config_file(r#"{ "sensor": { "call_timeout_secs": 0 } }"#);
    let args = Args {
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();
    let err = config.to_session_config().unwrap_err();
    assert!(err.to_string().contains("call_timeout_secs"));
}

#[test]
fn test_missing_config_file() {
    let args = Args {
        config: Some("/nonexistent/airquality.json".into()),
        ..Args::default()
    };
    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_partial_deserialization() {
    let json = r#"{"sensor": {"cycle": 15}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.sensor.cycle, 15);
    assert_eq!(config.sensor.port_path, "/dev/ttyUSB0"); // Default
    assert!(config.sensor.force_set_cycle); // Default
    assert_eq!(config.web.listen_address, ":9999"); // Default
}
