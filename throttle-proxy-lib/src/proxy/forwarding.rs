use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::TryStreamExt;
use http::header::{CONNECTION, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, HeaderName, Request, Response};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, Incoming};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, DropGuard, PollSender};
use tracing::{debug, error, Instrument};

use crate::proxy::context::{ProxyState, RequestContext};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::RespBody;
use crate::telemetry::metrics::values;
use crate::throttle::CopyError;

const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Headers that describe the client-to-proxy hop and are never replayed to the origin
const HOP_BY_HOP: [HeaderName; 8] =
    [CONNECTION, PROXY_CONNECTION, KEEP_ALIVE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE];

/// Replay a non-CONNECT request against its origin and stream the response back.
///
/// The status line and headers are returned as soon as the origin answers; the body
/// is pumped through the copy engine by a detached task. A body failure after that
/// point is logged and aborts the body, it cannot change the status already sent.
/// The pump stops as soon as hyper drops the body, which happens when the client
/// goes away.
pub(crate) async fn forward(
    state: &Arc<ProxyState>,
    ctx: &RequestContext,
    mut req: Request<Incoming>,
) -> HttpResult<Response<RespBody>> {
    if req.uri().scheme().is_none() || req.uri().authority().is_none() {
        return Err(HttpError::InvalidUri(format!("{} is not an absolute URI", req.uri())));
    }

    strip_hop_by_hop(req.headers_mut());
    if let Some(auth) = state.client.proxy_authorization(req.uri()) {
        req.headers_mut().insert(PROXY_AUTHORIZATION, auth);
    }

    let resp = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(HttpError::Cancelled),
        res = state.client.request(req) => res.map_err(|e| HttpError::RoundTrip(error_chain(&e)))?,
    };

    let (parts, body) = resp.into_parts();
    debug!(status = parts.status.as_u16(), "origin responded");
    Ok(Response::from_parts(parts, pump_body(state, ctx, body)))
}

pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// `Display` of an error followed by its sources, `outer: inner: root`
fn error_chain(err: &dyn StdError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        msg.push_str(": ");
        msg.push_str(&e.to_string());
        source = e.source();
    }
    msg
}

fn pump_body(state: &Arc<ProxyState>, ctx: &RequestContext, body: Incoming) -> RespBody {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
    let engine = state.engine.clone();
    let metrics = state.metrics.clone();
    let cancel = ctx.cancel.child_token();
    let reply = ChannelBody::new(rx, &cancel);

    state.tasks.spawn(
        async move {
            let mut src = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
            let mut dest = BodyWriter::new(tx);

            let result = engine.copy(&cancel, &mut dest, &mut src).await;
            let written = match &result {
                Ok(n) => *n,
                Err(e) => e.written(),
            };
            if let Some(m) = &metrics {
                m.record_bytes_copied(written, values::DIRECTION_DOWNSTREAM);
            }

            match result {
                Ok(n) => debug!(bytes = n, "response body relayed"),
                Err(e) if e.is_cancelled() => {
                    debug!(bytes = e.written(), "response body cancelled");
                    dest.abort(io::Error::other(e.to_string())).await;
                }
                Err(e) if is_client_gone(&e) => {
                    debug!(bytes = e.written(), "client closed the response body");
                }
                Err(e) => {
                    error!(bytes = e.written(), error = %e, "response body copy failed");
                    dest.abort(io::Error::other(e.to_string())).await;
                }
            }
        }
        .instrument(ctx.span.clone()),
    );

    reply.boxed()
}

fn is_client_gone(err: &CopyError) -> bool {
    matches!(err, CopyError::Write { source, .. } if source.kind() == io::ErrorKind::BrokenPipe)
}

/// Read half of a response body fed by [`BodyWriter`]
///
/// Dropping it cancels the task pumping the body.
struct ChannelBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    _pump: DropGuard,
}

impl ChannelBody {
    fn new(rx: mpsc::Receiver<io::Result<Bytes>>, pump: &CancellationToken) -> Self {
        Self { rx, _pump: pump.clone().drop_guard() }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        self.rx.poll_recv(cx).map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }
}

/// Write half of a response body: every write becomes one data frame
struct BodyWriter {
    tx: PollSender<io::Result<Bytes>>,
}

impl BodyWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self { tx: PollSender::new(tx) }
    }

    /// Terminate the body with an error so the client sees a broken transfer,
    /// not a short but apparently complete one.
    async fn abort(self, err: io::Error) {
        if let Some(tx) = self.tx.get_ref() {
            if tx.send(Err(err)).await.is_err() {
                debug!("client went away before the body could be aborted");
            }
        }
    }
}

fn body_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client closed the response body")
}

impl AsyncWrite for BodyWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        ready!(self.tx.poll_reserve(cx)).map_err(|_| body_closed())?;
        self.tx.send_item(Ok(Bytes::copy_from_slice(buf))).map_err(|_| body_closed())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, HOST};
    use http::HeaderValue;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("example.com"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, X-Session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        headers.insert(TE, HeaderValue::from_static("trailers"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[HOST], "example.com");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_error_chain_includes_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("client error (Connect)")]
        struct Wrapped(#[source] io::Error);
        let err = Wrapped(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        assert_eq!(error_chain(&err), "client error (Connect): connection refused");
    }

    #[tokio::test]
    async fn test_body_writer_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = BodyWriter::new(tx);
        let err = writer.write(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_body_writer_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut writer = BodyWriter::new(tx);
        writer.write_all(b"hello").await.unwrap();
        writer.shutdown().await.unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], b"hello");
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_dropping_body_cancels_pump() {
        let (_tx, rx) = mpsc::channel(1);
        let pump = CancellationToken::new();
        let body = ChannelBody::new(rx, &pump);
        assert!(!pump.is_cancelled());

        drop(body);
        assert!(pump.is_cancelled());
    }

    #[test]
    fn test_broken_pipe_is_client_gone() {
        let gone = CopyError::Write { written: 10, source: body_closed() };
        assert!(is_client_gone(&gone));

        let failed = CopyError::Read { written: 10, source: io::Error::other("origin reset") };
        assert!(!is_client_gone(&failed));
    }

    #[tokio::test]
    async fn test_aborted_body_ends_with_error() {
        let (tx, rx) = mpsc::channel(4);
        let mut writer = BodyWriter::new(tx);
        writer.write_all(b"partial").await.unwrap();
        writer.abort(io::Error::other("read failed")).await;

        let mut body = ChannelBody::new(rx, &CancellationToken::new());
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"partial"));
        assert!(body.frame().await.unwrap().is_err());
        assert!(body.frame().await.is_none());
    }
}
