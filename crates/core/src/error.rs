use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing credential or invalid configuration. Raised before any network call.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network failure or timeout while talking to a backend.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-2xx status. `body` is already truncated.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No backend supports the requested model, or no module could be selected.
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Module error: {0}")]
    Module(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was raised before any request left the process.
    pub fn is_pre_flight(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Routing(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let err = Error::HttpStatus {
            status: 401,
            body: "invalid x-api-key".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401: invalid x-api-key");
    }

    #[test]
    fn test_pre_flight_classification() {
        assert!(Error::Config("no key".into()).is_pre_flight());
        assert!(Error::Routing("no provider".into()).is_pre_flight());
        assert!(!Error::Transport("reset".into()).is_pre_flight());
        assert!(!Error::Cancelled.is_pre_flight());
    }
}
