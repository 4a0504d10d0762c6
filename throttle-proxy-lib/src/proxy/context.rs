use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::{Method, Uri, Version};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Span;

use crate::config::Config;
use crate::proxy::client::OutboundClient;
use crate::telemetry::Metrics;
use crate::throttle::CopyEngine;

/// State shared by every connection the server accepts
pub struct ProxyState {
    pub engine: CopyEngine,
    pub client: OutboundClient,
    pub dial_timeout: Duration,
    pub tcp_keep_alive: Duration,
    pub metrics: Option<Arc<Metrics>>,
    /// Root of every request's cancellation token
    pub cancel: CancellationToken,
    /// Connections plus the detached tunnel and body tasks they spawn
    pub tasks: TaskTracker,
}

impl ProxyState {
    pub fn new(config: &Config, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            engine: CopyEngine::new(config.limit.to_rule(), metrics.clone()),
            client: OutboundClient::new(config),
            dial_timeout: config.timeout.dial(),
            tcp_keep_alive: config.timeout.keep_alive(),
            metrics,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}

/// Per-request data threaded through the forwarder and the tunnel
pub struct RequestContext {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub cancel: CancellationToken,
    pub span: Span,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, version: Version, cancel: CancellationToken) -> Self {
        let id = generate_request_id();
        let span = tracing::info_span!(
            "request",
            request_id = %id,
            method = %method,
            proto = ?version,
            uri = %uri,
        );
        Self { id, method, uri, version, cancel, span }
    }
}

/// 8 random bytes, URL-safe base64 without padding (11 characters)
pub fn generate_request_id() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 8]>())
}
