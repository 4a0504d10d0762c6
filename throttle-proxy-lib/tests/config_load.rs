use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use throttle_proxy_lib::config::load_from_path;
use throttle_proxy_lib::{Config, ProxyError};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn write_config(contents: &str) -> TestResult<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{contents}")?;
    file.flush()?;
    Ok(file)
}

#[test]
fn empty_file_uses_defaults() -> TestResult<()> {
    let file = write_config("")?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "0.0.0.0:8080");
    assert_eq!(cfg.limit.bytes_per_second, 8 * 1024 * 1024);
    assert_eq!(cfg.limit.retry_after_secs, 5);
    assert_eq!(cfg.timeout.dial(), Duration::from_secs(30));
    assert_eq!(cfg.timeout.keep_alive(), Duration::from_secs(30));
    assert_eq!(cfg.timeout.idle_connection(), Duration::from_secs(90));
    assert_eq!(cfg.outbound.max_idle_per_host, 100);
    assert!(cfg.outbound.use_env_proxy);
    assert_eq!(cfg.logging.level, "info");
    assert!(cfg.telemetry.metrics_port.is_none());
    Ok(())
}

#[test]
fn loads_full_config() -> TestResult<()> {
    let file = write_config(
        r#"
listen = "127.0.0.1:3128"

[limit]
bytes_per_second = 1048576
retry_after_secs = 2

[timeout]
dial_secs = 10
shutdown_secs = 5

[outbound]
max_idle_per_host = 16
use_env_proxy = false

[security]
max_connections = 64

[logging]
level = "debug"
show_target = true

[telemetry]
metrics_port = 9900
"#,
    )?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:3128");

    let rule = cfg.limit.to_rule();
    assert_eq!(rule.limited_bytes_per_sec, 1_048_576);
    assert_eq!(rule.retry_after, Duration::from_secs(2));
    assert!(rule.is_valid());

    assert_eq!(cfg.timeout.dial_secs, 10);
    assert_eq!(cfg.timeout.keep_alive_secs, 30);
    assert_eq!(cfg.timeout.shutdown_secs, 5);
    assert_eq!(cfg.outbound.max_idle_per_host, 16);
    assert!(!cfg.outbound.use_env_proxy);
    assert_eq!(cfg.security.max_connections, 64);
    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.show_target);
    assert_eq!(cfg.telemetry.metrics_port, Some(9900));
    Ok(())
}

#[test]
fn low_rate_loads_but_disables_limiting() -> TestResult<()> {
    let file = write_config("[limit]\nbytes_per_second = 1000\n")?;

    let cfg = load_from_path(file.path())?;
    assert!(!cfg.limit.to_rule().is_valid());
    Ok(())
}

#[test]
fn rejects_zero_dial_timeout() -> TestResult<()> {
    let file = write_config("[timeout]\ndial_secs = 0\n")?;

    match load_from_path(file.path()) {
        Err(ProxyError::Config(msg)) => assert!(msg.contains("dial_secs"), "{msg}"),
        other => return Err(format!("expected config error, got {other:?}").into()),
    }
    Ok(())
}

#[test]
fn rejects_malformed_toml() -> TestResult<()> {
    let file = write_config("listen = not-an-address\n")?;

    let err = load_from_path(file.path()).err().ok_or("malformed config accepted")?;
    assert!(err.to_string().contains("Failed to parse config"), "{err}");
    Ok(())
}

#[test]
fn missing_file_is_config_error() {
    let err = load_from_path("/nonexistent/throttle-proxy.toml").err();
    assert!(matches!(err, Some(ProxyError::Config(_))));
}

#[test]
fn default_config_matches_empty_file() -> TestResult<()> {
    let file = write_config("")?;
    let loaded = load_from_path(file.path())?;
    let default = Config::default();

    assert_eq!(loaded.listen, default.listen);
    assert_eq!(loaded.limit, default.limit);
    assert_eq!(loaded.timeout, default.timeout);
    assert_eq!(loaded.outbound, default.outbound);
    assert_eq!(loaded.security, default.security);
    Ok(())
}
