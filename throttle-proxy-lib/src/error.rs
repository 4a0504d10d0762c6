use thiserror::Error;

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = ProxyError::from(io);
        assert!(matches!(err, ProxyError::Io(_)));
        assert_eq!(err.to_string(), "IO error: address in use");
    }

    #[test]
    fn test_config_error_message() {
        let err = ProxyError::Config("dial_secs must be > 0".to_string());
        assert_eq!(err.to_string(), "Configuration error: dial_secs must be > 0");
    }
}
