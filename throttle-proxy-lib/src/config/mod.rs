mod limit;
mod loader;
mod outbound;
mod root;
mod security;
mod telemetry;
mod timeout;
mod validator;

pub use limit::LimitConfig;
pub use loader::load_from_path;
pub use outbound::OutboundConfig;
pub use root::Config;
pub use security::SecurityConfig;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::TimeoutConfig;
pub use validator::validate;
