use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::post::PostId;

pub type Result<T> = std::result::Result<T, BoardError>;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Post not found: {0}")]
    NotFound(PostId),

    #[error("This post has no poll")]
    NoPoll,

    #[error("Invalid poll option index {index} (poll has {options} options)")]
    InvalidOption { index: i64, options: usize },

    #[error("Malformed attachment: {0}")]
    Resolution(String),

    #[error("Attachment upload failed: {0}")]
    Upload(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl BoardError {
    /// Stable, machine-checkable name carried in every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            BoardError::NotFound(_) => "not_found",
            BoardError::NoPoll => "no_poll",
            BoardError::InvalidOption { .. } => "invalid_option",
            BoardError::Resolution(_) => "resolution_error",
            BoardError::Upload(_) => "upload_failed",
            BoardError::MalformedRequest(_) => "malformed_request",
            BoardError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BoardError::NotFound(_) => StatusCode::NOT_FOUND,
            BoardError::NoPoll
            | BoardError::InvalidOption { .. }
            | BoardError::Resolution(_)
            | BoardError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            BoardError::Upload(_) => StatusCode::BAD_GATEWAY,
            BoardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<redis::RedisError> for BoardError {
    fn from(err: redis::RedisError) -> Self {
        BoardError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        (status, Json(body)).into_response()
    }
}
