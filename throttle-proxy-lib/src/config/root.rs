use serde::Deserialize;
use std::net::SocketAddr;

use super::limit::LimitConfig;
use super::outbound::OutboundConfig;
use super::security::SecurityConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;

/// Main configuration structure
///
/// Every section is optional; an empty file yields a proxy listening on
/// `0.0.0.0:8080` with an 8 MiB/s limit.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:8080" or "127.0.0.1:3128"
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Bandwidth limit applied to every relayed byte stream
    #[serde(default)]
    pub limit: LimitConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Outbound HTTP client configuration
    #[serde(default)]
    pub outbound: OutboundConfig,
    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            limit: LimitConfig::default(),
            timeout: TimeoutConfig::default(),
            outbound: OutboundConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
