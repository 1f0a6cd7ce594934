use thiserror::Error;

/// Why an image could not be produced. Every variant is retryable by asking
/// the cache for the same key again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server responded with status {0}")]
    HttpStatus(u16),

    #[error("response body was empty")]
    EmptyBody,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("decode task failed: {0}")]
    DecodeTask(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ImageError>;
