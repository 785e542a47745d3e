//! Configuration loading tests

use reconnect_harness::config::{ConfigError, ServerCommand, ServerConfig};
use std::io::Write;
use std::time::Duration;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# fault injector").unwrap();
    writeln!(file, "ctf-server:").unwrap();
    writeln!(file, "  port: 19991").unwrap();
    writeln!(file, "  goaway-interval-ms: 500").unwrap();

    let config = ServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.port, 19991);
    assert_eq!(config.goaway_interval, Duration::from_millis(500));
    assert_eq!(config.backlog, 128);
}

#[test]
fn test_other_sections_are_ignored() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "grpc:").unwrap();
    writeln!(file, "  port: 9990").unwrap();
    writeln!(file, "ctf-server:").unwrap();
    writeln!(file, "  backlog: 8").unwrap();

    let config = ServerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.port, 9991);
    assert_eq!(config.backlog, 8);
}

#[test]
fn test_command_line_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ctf-server:").unwrap();
    writeln!(file, "  port: 19991").unwrap();
    writeln!(file, "  goaway-interval-ms: 500").unwrap();
    let path = file.path().to_string_lossy().to_string();

    let command = ServerCommand::parse(args(&["-i", "25", "--config", &path])).unwrap();
    assert_eq!(command.config.port, 19991);
    assert_eq!(command.config.goaway_interval, Duration::from_millis(25));
}

#[test]
fn test_bad_value_in_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ctf-server:").unwrap();
    writeln!(file, "  port: ninety").unwrap();

    let err = ServerConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yml");

    let err = ServerConfig::from_file(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_zero_interval_fails_startup() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ctf-server:").unwrap();
    writeln!(file, "  goaway-interval-ms: 0").unwrap();
    let path = file.path().to_string_lossy().to_string();

    let err = ServerCommand::parse(args(&["-c", &path])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[test]
fn test_help_flag() {
    let command = ServerCommand::parse(args(&["--help"])).unwrap();
    assert!(command.help);
}
