use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ProxyError, Result};

type RespBody = BoxBody<Bytes, Infallible>;

/// Serve Prometheus metrics and a liveness probe on a dedicated port.
///
/// - `/metrics` - Prometheus text exposition
/// - `/health` - always 200 while the process runs
///
/// Runs until `shutdown` is cancelled.
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(?addr, "Observability server started (metrics + health checks)");
    serve_observability(listener, Arc::new(registry), shutdown).await
}

pub(crate) async fn serve_observability(
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = registry.clone();
                        async move { Ok::<_, Infallible>(route(req.uri().path(), &registry)) }
                    });

                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}

fn route(path: &str, registry: &Registry) -> Response<RespBody> {
    let result = match path {
        "/metrics" => metrics_response(registry),
        "/health" => health_response(),
        _ => return plain(StatusCode::NOT_FOUND, "Not Found"),
    };
    result.unwrap_or_else(|e| {
        warn!(error = %e, path, "Observability server: failed to build response");
        plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}

fn metrics_response(registry: &Registry) -> Result<Response<RespBody>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| ProxyError::Http(format!("Failed to encode metrics: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(Full::new(Bytes::from(buffer)).boxed())
        .map_err(|e| ProxyError::Http(format!("Failed to build response: {e}")))
}

fn health_response() -> Result<Response<RespBody>> {
    let body = serde_json::to_vec(&json!({"status": "healthy"}))
        .map_err(|e| ProxyError::Http(format!("Failed to serialize health response: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)).boxed())
        .map_err(|e| ProxyError::Http(format!("Failed to build health response: {e}")))
}

fn plain(status: StatusCode, text: &'static str) -> Response<RespBody> {
    let mut resp = Response::new(Full::new(Bytes::from_static(text.as_bytes())).boxed());
    *resp.status_mut() = status;
    resp
}
