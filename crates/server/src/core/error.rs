use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Request Errors
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("missing caller identity")]
    MissingIdentity,

    // Collaborator Errors
    #[error("media store failure: {0}")]
    Media(String),
    #[error("storage failure: {0}")]
    Store(#[from] sqlx::Error),

    // Generic
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            Error::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                "Missing caller identity".to_string(),
            ),
            Error::Media(msg) => {
                error!("Media store failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "Media upload failed".to_string())
            }
            Error::Store(err) => {
                error!("Storage failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage unavailable".to_string(),
                )
            }
            Error::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Outcome of a failed push to a single connection handle.
///
/// Never surfaced to the sender; the delivery router logs and drops it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    #[error("connection closed")]
    Closed,
    #[error("connection buffer full")]
    Saturated,
}
