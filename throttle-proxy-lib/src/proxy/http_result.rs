use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub(crate) type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong before a response reaches the client
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("CONNECT target must be host:port, got {0:?}")]
    MissingAuthority(String),

    #[error("{0}")]
    RoundTrip(String),

    #[error("dial {target}: {reason}")]
    Dial { target: String, reason: String },

    #[error("dial {0}: i/o timeout")]
    DialTimeout(String),

    #[error("hijacking not supported")]
    HijackUnsupported,

    #[error("request cancelled")]
    Cancelled,
}

impl HttpError {
    /// Label used for the `error_type` metric
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::InvalidUri(_) => "invalid_uri",
            HttpError::MissingAuthority(_) => "missing_authority",
            HttpError::RoundTrip(_) => "round_trip",
            HttpError::Dial { .. } => "dial",
            HttpError::DialTimeout(_) => "dial_timeout",
            HttpError::HijackUnsupported => "hijack_unsupported",
            HttpError::Cancelled => "cancelled",
        }
    }
}

impl From<&HttpError> for StatusCode {
    fn from(e: &HttpError) -> StatusCode {
        match e {
            HttpError::InvalidUri(_) => StatusCode::BAD_GATEWAY,
            HttpError::MissingAuthority(_) => StatusCode::BAD_GATEWAY,
            HttpError::RoundTrip(_) => StatusCode::BAD_GATEWAY,
            HttpError::Dial { .. } => StatusCode::BAD_GATEWAY,
            HttpError::DialTimeout(_) => StatusCode::BAD_GATEWAY,
            HttpError::HijackUnsupported => StatusCode::BAD_GATEWAY,
            HttpError::Cancelled => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StatusCode::from(&HttpError::InvalidUri("/x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(StatusCode::from(&HttpError::MissingAuthority("example.com".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(StatusCode::from(&HttpError::HijackUnsupported), StatusCode::BAD_GATEWAY);
        assert_eq!(
            StatusCode::from(&HttpError::DialTimeout("example.com:443".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_dial_error_text() {
        let err = HttpError::Dial { target: "example.com:443".into(), reason: "connection refused".into() };
        assert_eq!(err.to_string(), "dial example.com:443: connection refused");
        assert_eq!(err.error_type(), "dial");
    }
}
