use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::proxy::connection::{ConnectionGuard, ConnectionManager};
use crate::proxy::context::ProxyState;
use crate::proxy::handler;
use crate::telemetry::Metrics;

/// How long cancelled tunnels and bodies get to wind down after the grace period
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Bind `config.listen` and serve until SIGTERM or SIGINT.
pub async fn run(config: Arc<Config>, metrics: Option<Arc<Metrics>>) -> Result<()> {
    let listener = TcpListener::bind(config.listen).await.map_err(ProxyError::Io)?;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
        trigger.cancel();
    });

    serve(listener, config, metrics, shutdown).await
}

/// Accept and serve proxy clients on `listener` until `shutdown` is cancelled.
///
/// Shutdown stops accepting, asks every open connection to finish its in-flight
/// request, then waits up to `timeout.shutdown_secs` for connections, tunnels and
/// response bodies. Whatever is still running after that is cancelled.
pub async fn serve(
    listener: TcpListener,
    config: Arc<Config>,
    metrics: Option<Arc<Metrics>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = Arc::new(ProxyState::new(&config, metrics.clone()));
    let connections = ConnectionManager::new(&config.security);

    let addr = listener.local_addr().map_err(ProxyError::Io)?;
    let limiter = state.engine.limiter();
    info!(
        %addr,
        limited = limiter.is_enabled(),
        bytes_per_second = config.limit.bytes_per_second,
        retry_after = ?limiter.retry_after(),
        "starting forward proxy"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = match connections.try_accept(peer, metrics.as_ref()) {
                    Ok(guard) => guard,
                    Err(e) => {
                        debug!(?peer, error = %e, "connection rejected");
                        continue;
                    }
                };

                state.tasks.spawn(serve_connection(stream, peer, state.clone(), shutdown.clone(), guard));
            }
        }
    }

    drop(listener);
    state.tasks.close();
    info!(
        active_connections = connections.active(),
        "Waiting for active connections to finish (timeout: {}s)",
        config.timeout.shutdown_secs
    );

    if tokio::time::timeout(config.timeout.shutdown(), state.tasks.wait()).await.is_err() {
        warn!(remaining_tasks = state.tasks.len(), "Shutdown timeout reached, cancelling remaining work");
        state.cancel.cancel();
        if tokio::time::timeout(CANCEL_GRACE, state.tasks.wait()).await.is_err() {
            warn!(remaining_tasks = state.tasks.len(), "tasks still running after cancellation");
        }
    }

    info!("Proxy server stopped");
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ProxyState>,
    shutdown: CancellationToken,
    _guard: ConnectionGuard,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(?peer, error = %e, "failed to set TCP_NODELAY");
    }

    let svc = hyper::service::service_fn(move |req: Request<Incoming>| handler::handle(state.clone(), req));
    let conn = http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(TokioIo::new(stream), svc)
        .with_upgrades();
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        if e.is_incomplete_message() || e.is_canceled() {
            debug!(?peer, error = %e, "client connection ended early");
        } else {
            warn!(?peer, error = %e, "serve_connection error");
        }
    }
}
