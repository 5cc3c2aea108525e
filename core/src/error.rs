//! Error types for the music catalog client.
//!
//! # Design
//! `ApiError` is what callers see, either returned synchronously (missing
//! callback, bad arguments) or carried inside a `Response<T>`. Transport-level
//! failures keep their own `TransportError` so the request pipeline can tell a
//! failed body upload apart from a connection that never produced a response.
//! Configuration problems live in `ConfigError` and never reach a callback.
//! Deep-link tasks have their own `TaskError`, wrapping `LaunchError` from the
//! host's launcher.

use http::StatusCode;
use thiserror::Error;

/// Errors surfaced by the request pipeline and the typed client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// `send_request_async` was called without a response callback.
    #[error("a response callback is required")]
    MissingCallback,

    /// The call timed out, or the request body could not be written.
    #[error("the API call failed")]
    CallFailed,

    /// The transport failed before any response arrived.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("API returned HTTP {status}")]
    Status { status: StatusCode },

    /// The response body could not be decompressed or was not UTF-8.
    #[error("could not read response body: {0}")]
    Body(String),

    /// The response body could not be converted into the expected type.
    #[error("could not parse response: {0}")]
    Parse(String),

    /// The request URI could not be built.
    #[error("invalid request URI: {0}")]
    InvalidUri(String),

    /// A typed client operation was given an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUri(err.to_string())
    }
}

/// Failures reported by a `Transport` when no HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Writing the request body failed.
    #[error("failed to write request body: {0}")]
    BodyWrite(String),

    /// DNS resolution or connection establishment failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other protocol or I/O failure.
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() {
            TransportError::BodyWrite(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Errors raised while loading `ClientSettings`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// A deep-link task could not be shown.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0} must be set before calling show()")]
    MissingParameter(&'static str),

    #[error("invalid launch URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Reported by a `Launcher` when the platform refuses a URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("no handler for {0}")]
    Unsupported(String),

    #[error("launch failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code() {
        let err = ApiError::Status {
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(err.to_string(), "API returned HTTP 404 Not Found");
    }

    #[test]
    fn transport_error_is_transparent() {
        let err = ApiError::from(TransportError::Connect("refused".to_string()));
        assert_eq!(err.to_string(), "connection failed: refused");
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation failed: a, b");
    }

    #[test]
    fn missing_task_parameter_names_it() {
        let err = TaskError::MissingParameter("search terms");
        assert_eq!(err.to_string(), "search terms must be set before calling show()");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: ApiError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ApiError::Parse(_)));
    }
}
