#![forbid(unsafe_code)]

use thiserror::Error;

/// Centralized error type for fermata-net.
///
/// `Clone` because one fetch failure is fanned out to every waiter sharing
/// the in-flight request.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },
    #[error("request timed out")]
    Timeout,
    #[error("unusable response: {0}")]
    InvalidResponse(String),
    #[error("short body: expected {expected} bytes, got {got}")]
    ShortBody { expected: u64, got: u64 },
}

impl NetError {
    pub fn http<S: Into<String>>(msg: S) -> Self {
        Self::Http(msg.into())
    }

    pub fn http_status(status: u16, url: String) -> Self {
        Self::HttpStatus { status, url }
    }

    /// HTTP status code, when this is a status error.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(error.to_string())
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;
