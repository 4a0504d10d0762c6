#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod telemetry;
pub mod throttle;

pub use config::{load_from_path, Config};
pub use error::{ProxyError, Result};
pub use proxy::{run, serve};
pub use throttle::{CopyEngine, CopyError, IoLimiter, LimitRule, CHUNK_SIZE};
