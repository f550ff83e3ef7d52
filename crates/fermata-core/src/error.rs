#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("URL is missing required component: {0}")]
    MissingComponent(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
