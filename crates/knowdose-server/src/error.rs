//! HTTP error type shared by all handlers.
//!
//! Every error renders as `{"error": "<message>"}` with the matching status.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use knowdose_core::{CoreError, IdError};
use knowdose_storage::StorageError;
use serde_json::json;

use crate::ai::AiError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed body, failed validation, bad path id.
    #[error("{0}")]
    BadRequest(String),

    #[error("Missing x-user-id")]
    MissingTenant,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after: u64 },

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingTenant => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Ai(AiError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ai(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        if e.is_client_error() {
            Self::BadRequest(e.to_string())
        } else {
            tracing::error!(category = %e.category(), error = %e, "Domain operation failed");
            Self::Internal(e.to_string())
        }
    }
}

impl From<IdError> for ApiError {
    fn from(e: IdError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { .. } => Self::NotFound("Medication not found".into()),
            other => {
                tracing::error!(category = %other.category(), error = %other, "Storage operation failed");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let retry_after = match &self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
