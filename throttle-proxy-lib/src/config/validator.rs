use crate::config::Config;

/// Reject settings the proxy cannot run with.
///
/// A rate below one chunk is accepted: it disables limiting and is reported at startup.
pub fn validate(config: &Config) -> Result<(), String> {
    if config.timeout.dial_secs == 0 {
        return Err("timeout.dial_secs must be > 0".into());
    }
    if config.timeout.keep_alive_secs == 0 {
        return Err("timeout.keep_alive_secs must be > 0".into());
    }
    if config.timeout.idle_connection_secs == 0 {
        return Err("timeout.idle_connection_secs must be > 0".into());
    }
    if config.timeout.shutdown_secs == 0 {
        return Err("timeout.shutdown_secs must be > 0".into());
    }
    if config.security.max_connections == 0 {
        return Err("security.max_connections must be > 0".into());
    }
    Ok(())
}
