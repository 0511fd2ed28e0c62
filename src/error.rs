//! Error types for the feed pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::catalog::Category;

/// The bytes were not a valid GTFS-realtime `FeedMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error parsing GTFS-RT data: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        DecodeError {
            message: err.to_string(),
        }
    }
}

/// Failure of a single upstream GET.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Invalid feed URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Everything a feed operation can fail with. Each failure is scoped to one
/// request and never touches cache entries for other feeds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Invalid {}: {feed_id}", .category.invalid_label())]
    InvalidFeed { category: Category, feed_id: String },

    #[error("HTTP error: {status}")]
    Upstream { status: u16 },

    #[error("{message}")]
    Transport { message: String },

    #[error("{message}")]
    Decode { message: String },
}

impl ServiceError {
    /// Body handed to clients in place of the requested data.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.to_string(),
        }
    }
}

impl From<FetchError> for ServiceError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status(status) => ServiceError::Upstream { status },
            e @ FetchError::InvalidUrl { .. } => ServiceError::Transport {
                message: e.to_string(),
            },
            FetchError::Transport(e) => {
                let message = if e.is_timeout() {
                    format!("Upstream request timed out: {e}")
                } else {
                    e.to_string()
                };
                ServiceError::Transport { message }
            }
        }
    }
}

impl From<DecodeError> for ServiceError {
    fn from(err: DecodeError) -> Self {
        ServiceError::Decode {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}
