use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// StoreError
///
/// Failure of a repository call. Every backend (Postgres, in-memory) reports
/// through this type so the layers above never see driver-specific errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,
    #[error("resource already exists")]
    Duplicate,
    #[error("database query timed out")]
    Timeout,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate,
            // A dangling reference (e.g. comment on a deleted post) is a missing resource.
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }
}

/// AuthError
///
/// Everything that can go wrong while issuing, checking or revoking a session,
/// or while checking a role level.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is missing or malformed")]
    MalformedHeader,
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    Expired,
    #[error("insufficient role level")]
    Forbidden,
    #[error("invalid email or password")]
    CredentialMismatch,
    #[error("account is not verified")]
    Unverified,
    #[error("password: must not exceed 72 bytes")]
    PasswordTooLong,
    #[error("required role could not be resolved: {0}")]
    AuthorizationLookupFailure(#[source] StoreError),
    #[error("password hashing failed: {0}")]
    HashingFailure(#[source] bcrypt::BcryptError),
    #[error("token generation failed: {0}")]
    TokenGeneration(#[source] rand::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ApiError
///
/// The HTTP-visible outcome class of a failed request. Handlers and middleware
/// return it directly; `IntoResponse` logs and renders the error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    // The cause is logged but never sent to the client.
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound(err.to_string()),
            StoreError::Duplicate => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MalformedHeader | AuthError::CredentialMismatch => {
                ApiError::Unauthorized(err.to_string())
            }
            // Expiry is deliberately indistinguishable from an unknown token.
            AuthError::SessionNotFound | AuthError::Expired => {
                ApiError::Unauthorized("unauthorized".to_string())
            }
            AuthError::Forbidden => ApiError::Forbidden("forbidden".to_string()),
            AuthError::Unverified => ApiError::Forbidden(err.to_string()),
            AuthError::PasswordTooLong => ApiError::BadRequest(err.to_string()),
            AuthError::AuthorizationLookupFailure(_)
            | AuthError::HashingFailure(_)
            | AuthError::TokenGeneration(_)
            | AuthError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// ErrorEnvelope
///
/// Body of every non-2xx response: `{"error": {"status", "message", "timestamp"}}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    pub timestamp: i64,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = ErrorEnvelope {
            error: ErrorBody {
                status: status.as_u16(),
                message: self.public_message(),
                timestamp: Utc::now().timestamp(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_and_unknown_sessions_render_identically() {
        let expired = ApiError::from(AuthError::Expired);
        let unknown = ApiError::from(AuthError::SessionNotFound);

        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.public_message(), unknown.public_message());
    }

    #[test]
    fn overlong_password_is_a_client_error() {
        let err = ApiError::from(AuthError::PasswordTooLong);

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "password: must not exceed 72 bytes");
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = ApiError::from(AuthError::AuthorizationLookupFailure(StoreError::NotFound));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn store_errors_map_to_outcome_classes() {
        assert_eq!(ApiError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(StoreError::Duplicate).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(StoreError::Timeout).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
