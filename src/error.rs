//! Error types for artifact generation

use thiserror::Error;

/// Main error type for thumbnail and slice operations
#[derive(Error, Debug)]
pub enum ThumbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The upstream dataset service refused the request.
    ///
    /// `status` and `message` are forwarded to the client unchanged.
    #[error("Authorization failed with status {status}: {}", message.as_deref().unwrap_or("<no message>"))]
    Authorization { status: u16, message: Option<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The external transform process exited unsuccessfully.
    #[error("Pipeline exited with status {}", code.map(|c| c.to_string()).unwrap_or_else(|| "<signal>".to_string()))]
    PipelineExecution { code: Option<i32> },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid artifact format: {0}")]
    InvalidFormat(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized Result type for artifact operations
pub type Result<T> = std::result::Result<T, ThumbError>;

impl From<bincode::Error> for ThumbError {
    fn from(err: bincode::Error) -> Self {
        ThumbError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ThumbError {
    fn from(err: serde_json::Error) -> Self {
        ThumbError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for ThumbError {
    fn from(err: image::ImageError) -> Self {
        ThumbError::Image(err.to_string())
    }
}

impl From<reqwest::Error> for ThumbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ThumbError::Timeout(err.to_string())
        } else {
            ThumbError::Network(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for ThumbError {
    fn from(err: tokio::task::JoinError) -> Self {
        ThumbError::Internal(format!("worker task failed: {}", err))
    }
}
