use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpanlightError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("span not found: {0}")]
    SpanNotFound(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, SpanlightError>;
