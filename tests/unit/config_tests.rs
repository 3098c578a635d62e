use std::time::Duration;

use scanlink::{Config, LinkError};

fn full_toml() -> &'static str {
    r#"
endpoint = "scanlink-under-test"
connect_timeout_ms = 250
connect_retry_delay_ms = 10
worker_threads = 3
"#
}

#[test]
fn parses_a_fully_specified_document() {
    let config = Config::from_toml_str(full_toml()).expect("config parses");

    assert_eq!(config.endpoint, "scanlink-under-test");
    assert_eq!(config.connect_timeout_ms, 250);
    assert_eq!(config.connect_retry_delay_ms, 10);
    assert_eq!(config.worker_threads, 3);
}

#[test]
fn empty_document_applies_every_default() {
    let config = Config::from_toml_str("").expect("config parses");

    assert_eq!(config.endpoint, "scanlink");
    assert_eq!(config.connect_timeout_ms, 5000);
    assert_eq!(config.connect_retry_delay_ms, 100);
    assert_eq!(config.worker_threads, 1);
}

#[test]
fn default_impl_matches_the_empty_document() {
    let parsed = Config::from_toml_str("").expect("config parses");
    assert_eq!(Config::default(), parsed);
}

#[test]
fn partial_document_keeps_remaining_defaults() {
    let config = Config::from_toml_str("worker_threads = 8").expect("config parses");

    assert_eq!(config.endpoint, "scanlink");
    assert_eq!(config.connect_timeout_ms, 5000);
    assert_eq!(config.worker_threads, 8);
}

#[test]
fn duration_accessors_convert_from_milliseconds() {
    let config = Config::from_toml_str("connect_timeout_ms = 1500").expect("config parses");

    assert_eq!(config.connect_timeout(), Duration::from_millis(1500));
    assert_eq!(config.connect_retry_delay(), Duration::from_millis(100));
}

#[test]
fn rejects_empty_endpoint() {
    let result = Config::from_toml_str(r#"endpoint = """#);
    match result {
        Err(LinkError::Config(message)) => {
            assert!(message.contains("endpoint"), "got: {message}");
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn rejects_zero_connect_timeout() {
    let result = Config::from_toml_str("connect_timeout_ms = 0");
    assert!(matches!(result, Err(LinkError::Config(_))));
}

#[test]
fn rejects_zero_retry_delay() {
    let result = Config::from_toml_str("connect_retry_delay_ms = 0");
    assert!(matches!(result, Err(LinkError::Config(_))));
}

#[test]
fn rejects_zero_worker_threads() {
    let result = Config::from_toml_str("worker_threads = 0");
    assert!(matches!(result, Err(LinkError::Config(_))));
}

#[test]
fn rejects_invalid_field_type() {
    let result = Config::from_toml_str(r#"worker_threads = "many""#);
    assert!(result.is_err());
}

#[test]
fn malformed_toml_surfaces_as_a_config_error() {
    let err = Config::from_toml_str("endpoint = [").expect_err("parse fails");
    assert!(err.to_string().starts_with("config:"), "got: {err}");
}

#[test]
fn load_from_path_reads_the_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("scanlink.toml");
    std::fs::write(&path, "endpoint = \"from-file\"\n").expect("write config file");

    let config = Config::load_from_path(&path).expect("config loads");
    assert_eq!(config.endpoint, "from-file");
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = Config::load_from_path(temp.path().join("absent.toml"));
    assert!(matches!(result, Err(LinkError::Config(_))));
}

#[test]
fn load_from_path_still_validates() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("scanlink.toml");
    std::fs::write(&path, "worker_threads = 0\n").expect("write config file");

    let result = Config::load_from_path(&path);
    assert!(matches!(result, Err(LinkError::Config(_))));
}
