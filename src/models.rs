use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    credential::{MAX_PASSWORD_BYTES, Password},
    error::ApiError,
};

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// Static reference data from the `roles` table. `level` is a total order:
/// a higher level subsumes every lower one.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Role {
    pub id: i64,
    pub level: i32,
    pub name: String,
    pub description: String,
}

/// User
///
/// The identity record from the `users` table. `role` is populated whenever
/// the user is loaded through a session lookup; the password hash never
/// leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub role_id: i64,
    #[serde(skip)]
    #[ts(skip)]
    pub role: Role,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    #[ts(skip)]
    pub password: Password,
    pub verified: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Session
///
/// A server-side login session. `id` is the hex SHA-256 digest of the bearer
/// token handed to the client; the token itself is never stored.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expired_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expired_at
    }
}

/// Verification
///
/// One-shot registration confirmation. Redeeming it marks the owner verified.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: i64,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub verified: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub content: String,
    pub verified: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Insert Shapes (Handler -> Repository) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: Password,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: i64,
    pub post_id: i64,
    pub content: String,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct RegisterUserPayload {
    #[schema(example = "reader@example.com")]
    pub email: String,
    #[schema(example = "reader")]
    pub username: String,
    pub password: String,
}

impl RegisterUserPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email("email", &self.email)?;
        validate_length("username", &self.username, 3, 32)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct VerifyUserPayload {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct LoginUserPayload {
    pub email: String,
    pub password: String,
}

impl LoginUserPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_email("email", &self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct LogoutUserPayload {
    pub token: String,
}

impl LogoutUserPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.token.trim().is_empty() {
            return Err(ApiError::BadRequest("token: required field is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreatePostPayload {
    pub title: String,
    pub content: String,
}

impl CreatePostPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_length("title", &self.title, 1, 128)?;
        validate_length("content", &self.content, 1, 1024)
    }
}

/// UpdatePostPayload
///
/// Partial update: absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdatePostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl UpdatePostPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(title) = &self.title {
            validate_length("title", title, 1, 128)?;
        }
        if let Some(content) = &self.content {
            validate_length("content", content, 1, 1024)?;
        }
        Ok(())
    }

    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct CreateCommentPayload {
    pub content: String,
}

impl CreateCommentPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_length("content", &self.content, 1, 512)
    }
}

// --- Response Schemas ---

/// DataEnvelope
///
/// Every successful JSON body is wrapped as `{"data": ...}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// TokenResponse
///
/// The raw session token. Returned exactly once, at login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// RegisteredUser
///
/// `verification_id` is only exposed in `Env::Local`, where no mail delivery exists.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisteredUser {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthEnvelope {
    pub title: String,
    pub description: String,
    pub version: String,
    pub url: String,
}

// --- Pagination ---

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 20;

/// FilterQuery
///
/// `?limit=&offset=` pagination, extracted and validated from the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FilterQuery {
    pub limit: i64,
    pub offset: i64,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFilterQuery {
    limit: Option<String>,
    offset: Option<String>,
}

impl FilterQuery {
    fn parse(raw: RawFilterQuery) -> Result<Self, ApiError> {
        let mut filter = FilterQuery::default();

        if let Some(limit) = raw.limit.filter(|l| !l.is_empty()) {
            filter.limit = limit
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("limit: {limit:?} is not a number")))?;
        }
        if let Some(offset) = raw.offset.filter(|o| !o.is_empty()) {
            filter.offset = offset
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("offset: {offset:?} is not a number")))?;
        }

        if !(0..=MAX_PAGE_LIMIT).contains(&filter.limit) {
            return Err(ApiError::BadRequest(format!(
                "limit: must be between 0 and {MAX_PAGE_LIMIT}"
            )));
        }
        if filter.offset < 0 {
            return Err(ApiError::BadRequest("offset: must not be negative".to_string()));
        }

        Ok(filter)
    }
}

impl<S> FromRequestParts<S> for FilterQuery
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<RawFilterQuery>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        FilterQuery::parse(raw)
    }
}

// --- Field Checks ---

fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if value.trim().is_empty() && min > 0 {
        return Err(ApiError::BadRequest(format!("{field}: required field is empty")));
    }
    if len < min {
        return Err(ApiError::BadRequest(format!(
            "{field}: must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(ApiError::BadRequest(format!("{field}: text is exceeding length")));
    }
    Ok(())
}

/// 8..=64 characters, and no more bytes than bcrypt reads.
fn validate_password(value: &str) -> Result<(), ApiError> {
    validate_length("password", value, 8, 64)?;
    if value.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "password: must not exceed {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

fn validate_email(field: &str, value: &str) -> Result<(), ApiError> {
    let well_formed = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));

    if !well_formed {
        return Err(ApiError::BadRequest(format!("{field}: not a valid email address")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(limit: Option<&str>, offset: Option<&str>) -> RawFilterQuery {
        RawFilterQuery {
            limit: limit.map(str::to_string),
            offset: offset.map(str::to_string),
        }
    }

    #[test]
    fn filter_defaults_when_absent() {
        assert_eq!(FilterQuery::parse(raw(None, None)).unwrap(), FilterQuery::default());
    }

    #[test]
    fn filter_rejects_out_of_range_and_garbage() {
        assert!(FilterQuery::parse(raw(Some("21"), None)).is_err());
        assert!(FilterQuery::parse(raw(Some("-1"), None)).is_err());
        assert!(FilterQuery::parse(raw(None, Some("-5"))).is_err());
        assert!(FilterQuery::parse(raw(Some("ten"), None)).is_err());
    }

    #[test]
    fn filter_accepts_bounds() {
        let filter = FilterQuery::parse(raw(Some("0"), Some("40"))).unwrap();
        assert_eq!(filter, FilterQuery { limit: 0, offset: 40 });
    }

    #[test]
    fn register_payload_checks_every_field() {
        let ok = RegisterUserPayload {
            email: "a@b.io".to_string(),
            username: "abc".to_string(),
            password: "12345678".to_string(),
        };
        assert!(ok.validate().is_ok());

        let short_name = RegisterUserPayload {
            username: "ab".to_string(),
            ..ok.clone()
        };
        assert!(short_name.validate().is_err());

        let bad_email = RegisterUserPayload {
            email: "not-an-email".to_string(),
            ..ok.clone()
        };
        assert!(bad_email.validate().is_err());

        let long_password = RegisterUserPayload {
            password: "x".repeat(65),
            ..ok
        };
        assert!(long_password.validate().is_err());
    }

    #[test]
    fn password_limit_counts_bytes_as_well_as_characters() {
        let login = LoginUserPayload {
            email: "a@b.io".to_string(),
            password: "€".repeat(24),
        };
        assert!(login.validate().is_ok());

        let too_wide = LoginUserPayload {
            password: "€".repeat(25),
            ..login
        };
        assert!(too_wide.validate().is_err());
    }

    #[test]
    fn update_payload_applies_only_present_fields() {
        let mut post = Post {
            title: "old".to_string(),
            content: "body".to_string(),
            ..Post::default()
        };

        UpdatePostPayload {
            title: Some("new".to_string()),
            content: None,
        }
        .apply(&mut post);

        assert_eq!(post.title, "new");
        assert_eq!(post.content, "body");
    }

    #[test]
    fn user_json_never_contains_the_password_hash() {
        let user = User {
            email: "a@b.io".to_string(),
            password: Password::from_hash(b"$2b$04$hash".to_vec()),
            ..User::default()
        };
        let json = serde_json::to_string(&user).unwrap();

        assert!(!json.contains("password"));
        assert!(!json.contains("$2b$"));
    }
}
