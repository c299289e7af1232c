//! Error types for minidfs

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Session Errors ===
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Not authorized: {0}")]
    Authorization(String),

    // === File State Errors ===
    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("Invalid resource state: {0}")]
    ResourceState(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Placement Errors ===
    #[error("No registered nodes available")]
    ServiceUnavailable,

    // === Network Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire form of an error, returned as the JSON body of a failed RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// Stable error discriminant carried across the RPC boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    InvalidToken,
    Authorization,
    ResourceBusy,
    ResourceState,
    InvalidName,
    InvalidArgument,
    ServiceUnavailable,
    Transport,
    InvalidConfig,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::InvalidToken => ErrorKind::InvalidToken,
            Error::Authorization(_) => ErrorKind::Authorization,
            Error::ResourceBusy(_) => ErrorKind::ResourceBusy,
            Error::ResourceState(_) => ErrorKind::ResourceState,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::ServiceUnavailable => ErrorKind::ServiceUnavailable,
            Error::Io(_) | Error::Transport(_) | Error::Http(_) | Error::Protocol(_) => {
                ErrorKind::Transport
            }
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild an error received from a remote peer
    pub fn from_body(body: ErrorBody) -> Self {
        match body.kind {
            ErrorKind::Authentication => Error::Authentication(body.error),
            ErrorKind::InvalidToken => Error::InvalidToken,
            ErrorKind::Authorization => Error::Authorization(body.error),
            ErrorKind::ResourceBusy => Error::ResourceBusy(body.error),
            ErrorKind::ResourceState => Error::ResourceState(body.error),
            ErrorKind::InvalidName => Error::InvalidName(body.error),
            ErrorKind::InvalidArgument => Error::InvalidArgument(body.error),
            ErrorKind::ServiceUnavailable => Error::ServiceUnavailable,
            ErrorKind::Transport => Error::Transport(body.error),
            ErrorKind::InvalidConfig => Error::InvalidConfig(body.error),
            ErrorKind::Internal => Error::Internal(body.error),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self.kind() {
            ErrorKind::Authentication | ErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::ResourceBusy | ErrorKind::ResourceState => StatusCode::CONFLICT,
            ErrorKind::InvalidName | ErrorKind::InvalidArgument | ErrorKind::InvalidConfig => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (self.to_http_status(), axum::Json(self.to_body())).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
