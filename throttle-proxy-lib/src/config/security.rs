use serde::Deserialize;

/// Security configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Maximum number of concurrent client connections served over HTTP
    /// A connection stops counting once it has been handed to a CONNECT tunnel
    /// Default: 10000
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { max_connections: default_max_connections() }
    }
}

fn default_max_connections() -> usize {
    10_000
}
