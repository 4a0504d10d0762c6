use std::convert::Infallible;
use std::sync::Arc;

use http::{Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use tracing::{debug, info, warn, Instrument};

use crate::proxy::context::{ProxyState, RequestContext};
use crate::proxy::http_result::HttpError;
use crate::proxy::synthetic_response::error_response;
use crate::proxy::{forwarding, tunnel, RespBody};
use crate::telemetry::metrics::values;

/// Entry point for every request hyper reads off a client connection.
///
/// Tags the request with a fresh id and a `request` span, then sends CONNECT to the
/// tunnel and everything else to the forwarder. Failures become plain-text responses
/// here, so the service itself never errors.
pub async fn handle(state: Arc<ProxyState>, req: Request<Incoming>) -> Result<Response<RespBody>, Infallible> {
    let ctx = RequestContext::new(req.method().clone(), req.uri().clone(), req.version(), state.cancel.child_token());
    let span = ctx.span.clone();
    Ok(dispatch(&state, &ctx, req).instrument(span).await)
}

async fn dispatch(state: &Arc<ProxyState>, ctx: &RequestContext, req: Request<Incoming>) -> Response<RespBody> {
    let is_tunnel = ctx.method == Method::CONNECT;
    let kind = if is_tunnel { values::KIND_TUNNEL } else { values::KIND_FORWARD };
    if is_tunnel {
        info!("tunnel");
    } else {
        info!("proxy");
    }
    if let Some(m) = &state.metrics {
        m.record_request(ctx.method.as_str(), kind);
    }

    let result = if is_tunnel {
        tunnel::handle_connect(state, ctx, req).await
    } else {
        forwarding::forward(state, ctx, req).await
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            let status = StatusCode::from(&e);
            if matches!(e, HttpError::Cancelled) {
                debug!("request cancelled");
            } else {
                warn!(status = status.as_u16(), error = %e, "request failed");
            }
            if let Some(m) = &state.metrics {
                m.record_error(e.error_type());
            }
            error_response(status, &e.to_string())
        }
    }
}
