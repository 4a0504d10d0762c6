use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{HeaderValue, Request, Response, Uri};
use hyper::body::Incoming;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::legacy::{Client, Error as ClientError};
use hyper_util::client::proxy::matcher::Matcher;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tower_service::Service;

use crate::config::Config;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pooled outbound HTTP/1.1 client used by the forwarder
///
/// Requests whose target is matched by the environment's proxy settings
/// (`HTTP_PROXY`, `NO_PROXY`) are dialed through that upstream proxy and sent in
/// absolute form. Everything else goes straight to the origin.
#[derive(Clone)]
pub struct OutboundClient {
    http: Client<OutboundConnector, Incoming>,
    proxy: Option<Arc<Matcher>>,
}

impl OutboundClient {
    pub fn new(config: &Config) -> Self {
        let proxy = config.outbound.use_env_proxy.then(|| Arc::new(Matcher::from_env()));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout.dial()));
        connector.set_keepalive(Some(config.timeout.keep_alive()));
        connector.set_nodelay(true);

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(config.timeout.idle_connection());
        builder.pool_max_idle_per_host(config.outbound.max_idle_per_host);
        builder.http1_preserve_header_case(true);

        let http = builder.build(OutboundConnector { http: connector, proxy: proxy.clone() });
        Self { http, proxy }
    }

    /// Credentials for the upstream proxy that will carry a request to `uri`, if any
    pub fn proxy_authorization(&self, uri: &Uri) -> Option<HeaderValue> {
        self.proxy.as_ref()?.intercept(uri)?.basic_auth().cloned()
    }

    pub async fn request(&self, req: Request<Incoming>) -> Result<Response<Incoming>, ClientError> {
        self.http.request(req).await
    }
}

/// Dials the origin, or the upstream proxy when one intercepts the target
#[derive(Clone)]
pub struct OutboundConnector {
    http: HttpConnector,
    proxy: Option<Arc<Matcher>>,
}

impl Service<Uri> for OutboundConnector {
    type Response = OutboundIo;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<OutboundIo, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let via = self.proxy.as_ref().and_then(|m| m.intercept(&dst)).map(|i| i.uri().clone());
        let proxied = via.is_some();
        let connecting = self.http.call(via.unwrap_or(dst));
        Box::pin(async move {
            let inner = connecting.await?;
            Ok(OutboundIo { inner, proxied })
        })
    }
}

/// Outbound TCP stream that remembers whether it leads to an upstream proxy
pub struct OutboundIo {
    inner: TokioIo<TcpStream>,
    proxied: bool,
}

impl Connection for OutboundIo {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.proxied)
    }
}

impl Read for OutboundIo {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: ReadBufCursor<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Write for OutboundIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }
}
