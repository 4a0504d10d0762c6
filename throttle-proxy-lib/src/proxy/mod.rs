pub mod client;
pub mod connection;
pub mod context;
pub mod forwarding;
pub mod handler;
pub mod http_result;
pub mod server;
pub mod synthetic_response;
pub mod tunnel;

use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;

/// Body of every response the proxy sends to a client
pub type RespBody = BoxBody<Bytes, std::io::Error>;

pub use context::{generate_request_id, ProxyState, RequestContext};
pub use http_result::HttpError;
pub use server::{run, serve};
pub use tunnel::{relay, RelayStats};
