//! Request handlers, grouped by resource. Each handler documents itself for
//! the OpenAPI document through `#[utoipa::path]`; access control lives in the
//! route layers, never in the handler bodies.

use axum::{
    Json,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
};

use crate::error::ApiError;

pub mod auth;
pub mod comments;
pub mod health;
pub mod posts;
pub mod users;

/// Unwraps a JSON body, turning axum's plain-text rejection into the error envelope.
pub(crate) fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub(crate) fn read_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(format!("id: {}", e.body_text())))
}

/// Answers a known path hit with a method it does not serve. Registered as the
/// router's method-not-allowed fallback so route layers never see the request.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed("method not allowed".to_string())
}
