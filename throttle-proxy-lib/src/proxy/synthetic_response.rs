use http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderValue, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::RespBody;

/// Plain-text error response carrying `message` as the body
pub(crate) fn error_response(status_code: StatusCode, message: &str) -> Response<RespBody> {
    let mut res = Response::new(text_body(format!("{message}\n")));
    *res.status_mut() = status_code;
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    res
}

/// `200` with no body, sent before a tunnel starts relaying
pub(crate) fn tunnel_established() -> Response<RespBody> {
    Response::new(empty_body())
}

fn text_body(text: String) -> RespBody {
    Full::new(Bytes::from(text)).map_err(|never| match never {}).boxed()
}

fn empty_body() -> RespBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
