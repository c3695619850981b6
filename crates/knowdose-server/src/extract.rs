//! Request extractors: the tenant header and validated JSON bodies.

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use knowdose_core::{Validate, validate_id};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, taken verbatim from `x-user-id`.
///
/// Rejects with 401 before the body is read, so a request without the
/// header never reaches the store. The id becomes a path segment in the
/// nested layout, so values that are not valid document ids get 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub String);

impl Tenant {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::MissingTenant)?;
        validate_id(user_id)?;

        tracing::Span::current().record("user_id", user_id);
        Ok(Tenant(user_id.to_string()))
    }
}

/// JSON body that is deserialized and then validated.
///
/// A malformed body and a failed validation reject with 400, a body over
/// the configured limit with 413.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::PayloadTooLarge
                } else {
                    ApiError::bad_request(rejection.body_text())
                }
            })?;
        value.validate()?;
        Ok(ApiJson(value))
    }
}
