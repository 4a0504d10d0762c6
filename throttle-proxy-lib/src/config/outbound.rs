use serde::Deserialize;

/// Outbound HTTP client configuration (plain forwarding only)
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct OutboundConfig {
    /// Maximum idle pooled connections kept per origin host
    /// The pool has no process-wide idle cap
    /// Default: 100
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,
    /// Route forwarded requests through the upstream proxy named by
    /// `HTTP_PROXY` / `NO_PROXY` when set
    /// Default: true
    #[serde(default = "default_true")]
    pub use_env_proxy: bool,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self { max_idle_per_host: default_max_idle(), use_env_proxy: default_true() }
    }
}

fn default_max_idle() -> usize {
    100
}

fn default_true() -> bool {
    true
}
