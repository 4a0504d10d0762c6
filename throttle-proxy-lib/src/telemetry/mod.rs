pub mod metrics;
pub mod server;
pub mod tracing;

pub use metrics::{init_metrics, Metrics};
pub use server::start_observability_server;
pub use tracing::init_tracing;
