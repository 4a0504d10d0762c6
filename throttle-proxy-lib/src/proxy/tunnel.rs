//! CONNECT tunnels.
//!
//! A tunnel moves through `Dialing -> Established -> Relaying -> Closed`:
//!
//! - **Dialing**: TCP connect to the requested `host:port`, bounded by the dial
//!   timeout and the request's cancellation. Failure answers 502 and nothing else
//!   is allocated.
//! - **Established**: an empty `200` goes back to the client and hyper hands over the
//!   raw connection once that response is flushed.
//! - **Relaying**: two copy tasks, client to origin and origin to client, share one
//!   cancellation token. Whichever ends first cancels the other.
//! - **Closed**: both tasks are joined and every socket half is dropped, which closes
//!   each socket exactly once.

use std::io;
use std::sync::Arc;

use http::{Request, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::proxy::context::{ProxyState, RequestContext};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::tunnel_established;
use crate::proxy::RespBody;
use crate::telemetry::metrics::values;
use crate::throttle::{CopyEngine, CopyError};

/// Bytes relayed by a finished tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to origin
    pub upstream: u64,
    /// Origin to client
    pub downstream: u64,
}

pub(crate) async fn handle_connect<B>(
    state: &Arc<ProxyState>,
    ctx: &RequestContext,
    mut req: Request<B>,
) -> HttpResult<Response<RespBody>> {
    let target = connect_target(&req)?;
    let on_upgrade = req.extensions_mut().remove::<OnUpgrade>().ok_or(HttpError::HijackUnsupported)?;

    let origin = dial(state, ctx, &target).await?;
    debug!(target = %target, "origin connected");

    let engine = state.engine.clone();
    let metrics = state.metrics.clone();
    let cancel = ctx.cancel.child_token();

    state.tasks.spawn(
        async move {
            let upgraded = tokio::select! {
                _ = cancel.cancelled() => return,
                upgraded = on_upgrade => match upgraded {
                    Ok(upgraded) => upgraded,
                    Err(e) => {
                        warn!(error = %e, "client connection could not be taken over");
                        return;
                    }
                },
            };

            if let Some(m) = &metrics {
                m.tunnels_active.add(1, &[]);
            }
            let stats = relay(&engine, cancel, TokioIo::new(upgraded), origin).await;
            if let Some(m) = &metrics {
                m.tunnels_active.add(-1, &[]);
                m.record_bytes_copied(stats.upstream, values::DIRECTION_UPSTREAM);
                m.record_bytes_copied(stats.downstream, values::DIRECTION_DOWNSTREAM);
            }
            info!(upstream = stats.upstream, downstream = stats.downstream, "tunnel closed");
        }
        .instrument(ctx.span.clone()),
    );

    Ok(tunnel_established())
}

/// `host:port` from an authority-form CONNECT target
fn connect_target<B>(req: &Request<B>) -> HttpResult<String> {
    match req.uri().authority() {
        Some(authority) if authority.port_u16().is_some() => Ok(authority.to_string()),
        _ => Err(HttpError::MissingAuthority(req.uri().to_string())),
    }
}

async fn dial(state: &ProxyState, ctx: &RequestContext, target: &str) -> HttpResult<TcpStream> {
    let connect = tokio::time::timeout(state.dial_timeout, TcpStream::connect(target));
    let stream = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(HttpError::Cancelled),
        res = connect => match res {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(HttpError::Dial { target: target.to_string(), reason: e.to_string() }),
            Err(_) => return Err(HttpError::DialTimeout(target.to_string())),
        },
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY on origin socket");
    }
    let keepalive = TcpKeepalive::new().with_time(state.tcp_keep_alive);
    if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
        debug!(error = %e, "failed to set TCP keepalive on origin socket");
    }
    Ok(stream)
}

/// Splice `client` and `origin` until either direction ends.
///
/// Both directions copy through `engine` and share `cancel`; the first to finish
/// cancels the other. Returns once both copy tasks have been joined.
pub async fn relay<C, O>(engine: &CopyEngine, cancel: CancellationToken, client: C, origin: O) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_rd, client_wr) = tokio::io::split(client);
    let (origin_rd, origin_wr) = tokio::io::split(origin);

    let upstream = tokio::spawn(
        pump(engine.clone(), cancel.clone(), client_rd, origin_wr, values::DIRECTION_UPSTREAM).in_current_span(),
    );
    let downstream = tokio::spawn(
        pump(engine.clone(), cancel.clone(), origin_rd, client_wr, values::DIRECTION_DOWNSTREAM).in_current_span(),
    );

    let (upstream, downstream) = tokio::join!(upstream, downstream);
    RelayStats {
        upstream: upstream.unwrap_or_else(|e| {
            warn!(error = %e, "upstream relay task failed");
            0
        }),
        downstream: downstream.unwrap_or_else(|e| {
            warn!(error = %e, "downstream relay task failed");
            0
        }),
    }
}

async fn pump<R, W>(engine: CopyEngine, cancel: CancellationToken, mut src: R, mut dest: W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = engine.copy(&cancel, &mut dest, &mut src).await;
    cancel.cancel();

    match result {
        Ok(n) => {
            debug!(direction, bytes = n, "relay reached end of stream");
            n
        }
        Err(e @ CopyError::Cancelled { .. }) => {
            debug!(direction, bytes = e.written(), "relay stopped");
            e.written()
        }
        Err(e) => {
            if is_disconnect(&e) {
                debug!(direction, bytes = e.written(), error = %e, "relay peer disconnected");
            } else {
                warn!(direction, bytes = e.written(), error = %e, "relay failed");
            }
            e.written()
        }
    }
}

fn is_disconnect(err: &CopyError) -> bool {
    let source = match err {
        CopyError::Read { source, .. } | CopyError::Write { source, .. } => source,
        _ => return false,
    };
    matches!(
        source.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::throttle::LimitRule;
    use http::Method;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn test_state() -> Arc<ProxyState> {
        let mut config = Config::default();
        config.outbound.use_env_proxy = false;
        Arc::new(ProxyState::new(&config, None))
    }

    fn connect_request(target: &str) -> (RequestContext, Request<()>) {
        let req = Request::builder().method(Method::CONNECT).uri(target).body(()).unwrap();
        let ctx = RequestContext::new(
            req.method().clone(),
            req.uri().clone(),
            req.version(),
            CancellationToken::new(),
        );
        (ctx, req)
    }

    #[tokio::test]
    async fn test_connect_without_upgrade_is_hijack_unsupported() {
        let state = test_state();
        // Something is listening, so only the missing upgrade can fail the request.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let (ctx, req) = connect_request(&target);

        let err = handle_connect(&state, &ctx, req).await.unwrap_err();

        assert!(matches!(err, HttpError::HijackUnsupported), "{err}");
        assert_eq!(http::StatusCode::from(&err), http::StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "hijacking not supported");
        assert!(state.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_connect_target_requires_port() {
        let state = test_state();
        let (ctx, req) = connect_request("example.com");

        let err = handle_connect(&state, &ctx, req).await.unwrap_err();
        assert!(matches!(err, HttpError::MissingAuthority(_)), "{err}");
    }

    #[tokio::test]
    async fn test_relay_both_directions_then_close() {
        let engine = CopyEngine::new(LimitRule::unlimited(), None);
        let (client_near, mut client_far) = duplex(64 * 1024);
        let (origin_near, mut origin_far) = duplex(64 * 1024);

        let relaying =
            tokio::spawn(async move { relay(&engine, CancellationToken::new(), client_near, origin_near).await });

        client_far.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        origin_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        origin_far.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_far);
        let stats = tokio::time::timeout(Duration::from_secs(5), relaying).await.unwrap().unwrap();
        assert_eq!(stats, RelayStats { upstream: 4, downstream: 5 });

        let mut rest = Vec::new();
        origin_far.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_relay_stops_on_external_cancel() {
        let engine = CopyEngine::new(LimitRule::unlimited(), None);
        let (client_near, _client_far) = duplex(1024);
        let (origin_near, _origin_far) = duplex(1024);
        let cancel = CancellationToken::new();

        let relaying = tokio::spawn({
            let cancel = cancel.clone();
            async move { relay(&engine, cancel, client_near, origin_near).await }
        });

        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(5), relaying).await.unwrap().unwrap();
        assert_eq!(stats, RelayStats::default());
    }
}
