use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;

use super::read_json;
use crate::{
    AppState,
    auth::expiry_after,
    config::Env,
    credential::Password,
    error::{ApiError, AuthError, ErrorEnvelope, StoreError},
    models::{
        DataEnvelope, LoginUserPayload, LogoutUserPayload, NewUser, RegisterUserPayload,
        RegisteredUser, TokenResponse, User, VerifyUserPayload,
    },
};

/// Role every newly registered account starts with.
pub const DEFAULT_ROLE: &str = "user";

/// bcrypt is CPU-bound; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("credential task failed: {e}")))?
        .map_err(ApiError::from)
}

/// register_user
///
/// Creates an unverified account with the default role and a verification id
/// that expires after the configured verification lifetime. The id is echoed
/// back only in local mode.
#[utoipa::path(
    post,
    path = "/v1/authentication/register",
    tag = "authentication",
    request_body = RegisterUserPayload,
    responses(
        (status = 201, description = "User registered", body = DataEnvelope<RegisteredUser>),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 409, description = "Email or username taken", body = ErrorEnvelope)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<RegisteredUser>>), ApiError> {
    let payload = read_json(payload)?;
    payload.validate()?;

    let cost = state.config.bcrypt_cost;
    let plaintext = payload.password;
    let password = blocking(move || Password::hashed(&plaintext, cost)).await?;

    let new_user = NewUser {
        email: payload.email,
        username: payload.username,
        password,
    };
    let expired_at = expiry_after(Utc::now(), state.config.verification_lifetime);

    let (user, verification) = state
        .storage
        .users
        .create_with_verification(new_user, DEFAULT_ROLE, expired_at)
        .await?;

    tracing::info!(user_id = user.id, "user registered");
    tracing::debug!(user_id = user.id, verification_id = %verification.id, "verification issued");

    let verification_id = (state.config.env == Env::Local).then_some(verification.id);

    Ok((
        StatusCode::CREATED,
        Json(DataEnvelope::new(RegisteredUser {
            user,
            verification_id,
        })),
    ))
}

/// verify_user
///
/// Redeems a verification id. Unknown, expired and already-used ids are all 404.
#[utoipa::path(
    post,
    path = "/v1/authentication/verify",
    tag = "authentication",
    request_body = VerifyUserPayload,
    responses(
        (status = 200, description = "User verified", body = DataEnvelope<User>),
        (status = 404, description = "Verification not found", body = ErrorEnvelope)
    )
)]
pub async fn verify_user(
    State(state): State<AppState>,
    payload: Result<Json<VerifyUserPayload>, JsonRejection>,
) -> Result<Json<DataEnvelope<User>>, ApiError> {
    let payload = read_json(payload)?;

    let user = state.storage.users.verify(payload.id).await?;

    tracing::info!(user_id = user.id, "user verified");
    Ok(Json(DataEnvelope::new(user)))
}

/// login_user
///
/// Checks credentials and opens a new session. The raw token in the response
/// is the only copy the server ever hands out.
#[utoipa::path(
    post,
    path = "/v1/authentication/login",
    tag = "authentication",
    request_body = LoginUserPayload,
    responses(
        (status = 202, description = "Session created", body = DataEnvelope<TokenResponse>),
        (status = 401, description = "Invalid email or password", body = ErrorEnvelope),
        (status = 403, description = "Account not verified", body = ErrorEnvelope)
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    payload: Result<Json<LoginUserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<TokenResponse>>), ApiError> {
    let payload = read_json(payload)?;
    payload.validate()?;

    // An unknown email must look exactly like a wrong password.
    let user = match state.storage.users.find_by_email(&payload.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AuthError::CredentialMismatch.into()),
        Err(e) => return Err(e.into()),
    };

    let stored = user.password.clone();
    let candidate = payload.password;
    blocking(move || stored.compare(&candidate)).await?;

    if !user.verified {
        return Err(AuthError::Unverified.into());
    }

    let authenticator = &state.authenticator;
    let token = authenticator.generate_token()?;
    authenticator
        .create_session(state.storage.sessions.as_ref(), &token, user.id)
        .await?;

    tracing::info!(user_id = user.id, "session created");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataEnvelope::new(TokenResponse { token })),
    ))
}

/// logout_user
///
/// Deletes the session behind the given token. A token with no session is 404.
#[utoipa::path(
    delete,
    path = "/v1/authentication/logout",
    tag = "authentication",
    request_body = LogoutUserPayload,
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ErrorEnvelope)
    )
)]
pub async fn logout_user(
    State(state): State<AppState>,
    payload: Result<Json<LogoutUserPayload>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let payload = read_json(payload)?;
    payload.validate()?;

    match state
        .authenticator
        .invalidate_token(state.storage.sessions.as_ref(), &payload.token)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(AuthError::SessionNotFound) => Err(ApiError::NotFound("session not found".to_string())),
        Err(e) => Err(e.into()),
    }
}
