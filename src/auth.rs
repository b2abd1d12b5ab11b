use std::time::Duration;

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, TimeDelta, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::{
    error::{ApiError, AuthError, StoreError},
    models::{Session, User},
    repository::SessionRepository,
};

/// Number of random bytes behind every session token (256 bits of entropy).
pub const TOKEN_BYTES: usize = 32;

/// SessionAuthenticator
///
/// Issues, checks and revokes opaque bearer tokens. Holds no mutable state:
/// every session lives in the `SessionRepository` handed to each call, keyed
/// by the SHA-256 digest of the token rather than the token itself.
#[derive(Clone, Debug)]
pub struct SessionAuthenticator {
    lifetime: Duration,
}

impl SessionAuthenticator {
    pub fn new(lifetime: Duration) -> Self {
        Self { lifetime }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// generate_token
    ///
    /// Draws `TOKEN_BYTES` from the operating system CSPRNG and encodes them
    /// as unpadded base32. This raw value is handed to the client once.
    pub fn generate_token(&self) -> Result<String, AuthError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(AuthError::TokenGeneration)?;
        Ok(BASE32_NOPAD.encode(&bytes))
    }

    /// Lowercase hex SHA-256 of the raw token. Used as the session id.
    pub fn digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// create_session
    ///
    /// Persists `{digest(token), user_id, now + lifetime}`. Expiry is absolute;
    /// sessions are never renewed.
    pub async fn create_session(
        &self,
        sessions: &dyn SessionRepository,
        token: &str,
        user_id: i64,
    ) -> Result<Session, AuthError> {
        let session = Session {
            id: Self::digest(token),
            user_id,
            expired_at: expiry_after(Utc::now(), self.lifetime),
        };
        sessions.create(&session).await?;
        Ok(session)
    }

    /// validate_token
    ///
    /// Resolves a raw token to its owner (role included). An expired session
    /// is removed before `Expired` is returned; a failed removal is only logged.
    pub async fn validate_token(
        &self,
        sessions: &dyn SessionRepository,
        token: &str,
    ) -> Result<User, AuthError> {
        let id = Self::digest(token);

        let (session, user) = match sessions.find_with_owner(&id).await {
            Ok(found) => found,
            Err(StoreError::NotFound) => return Err(AuthError::SessionNotFound),
            Err(e) => return Err(e.into()),
        };

        if session.is_expired_at(Utc::now()) {
            if let Err(e) = sessions.delete(&session.id).await {
                tracing::warn!(user_id = session.user_id, error = %e, "failed to delete expired session");
            }
            return Err(AuthError::Expired);
        }

        Ok(user)
    }

    /// Deletes the session behind `token`. Unknown tokens yield `SessionNotFound`.
    pub async fn invalidate_token(
        &self,
        sessions: &dyn SessionRepository,
        token: &str,
    ) -> Result<(), AuthError> {
        match sessions.delete(&Self::digest(token)).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound) => Err(AuthError::SessionNotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// `now + lifetime`, saturating at the largest representable instant.
pub fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lifetime)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// AuthUser
///
/// The identity attached by the `authenticate` middleware. Taking it as a
/// handler argument on a route without that middleware rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("unauthorized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        credential::Password,
        models::NewUser,
        repository::{MemoryStore, UserRepository},
    };

    async fn store_with_user() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let (user, _) = store
            .create_with_verification(
                NewUser {
                    email: "owner@example.com".to_string(),
                    username: "owner".to_string(),
                    password: Password::from_hash(b"hash".to_vec()),
                },
                "user",
                Utc::now() + TimeDelta::hours(1),
            )
            .await
            .unwrap();
        (store, user)
    }

    fn authenticator() -> SessionAuthenticator {
        SessionAuthenticator::new(Duration::from_secs(60))
    }

    #[test]
    fn tokens_are_unique_and_fixed_length() {
        let auth = authenticator();
        let tokens: Vec<String> = (0..10_000).map(|_| auth.generate_token().unwrap()).collect();

        let expected_len = BASE32_NOPAD.encode_len(TOKEN_BYTES);
        assert!(tokens.iter().all(|t| t.len() == expected_len));
        assert!(tokens.iter().all(|t| !t.contains('=')));

        let distinct: HashSet<_> = tokens.iter().collect();
        assert_eq!(distinct.len(), tokens.len());
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let digest = SessionAuthenticator::digest("some-token");

        assert_eq!(digest, SessionAuthenticator::digest("some-token"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn created_session_validates_and_is_keyed_by_digest() {
        let (store, user) = store_with_user().await;
        let auth = authenticator();
        let token = auth.generate_token().unwrap();

        let session = auth.create_session(&store, &token, user.id).await.unwrap();
        assert_ne!(session.id, token);
        assert!(store.session(&token).await.is_none());
        assert!(store.session(&SessionAuthenticator::digest(&token)).await.is_some());

        let resolved = auth.validate_token(&store, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.role.name, "user");
    }

    #[tokio::test]
    async fn expired_session_fails_and_is_removed() {
        let (store, user) = store_with_user().await;
        let auth = authenticator();
        let token = auth.generate_token().unwrap();
        let session = auth.create_session(&store, &token, user.id).await.unwrap();

        store
            .set_session_expiry(&session.id, Utc::now() - TimeDelta::seconds(1))
            .await;

        let err = auth.validate_token(&store, &token).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(store.session(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_session_not_found() {
        let (store, _) = store_with_user().await;
        let auth = authenticator();

        let err = auth.validate_token(&store, "never-issued").await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));

        let err = auth.invalidate_token(&store, "never-issued").await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn invalidated_token_no_longer_validates() {
        let (store, user) = store_with_user().await;
        let auth = authenticator();
        let token = auth.generate_token().unwrap();
        auth.create_session(&store, &token, user.id).await.unwrap();

        auth.invalidate_token(&store, &token).await.unwrap();

        assert!(matches!(
            auth.validate_token(&store, &token).await.unwrap_err(),
            AuthError::SessionNotFound
        ));
    }

    #[test]
    fn expiry_saturates_instead_of_overflowing() {
        let now = Utc::now();

        assert_eq!(expiry_after(now, Duration::from_secs(60)), now + TimeDelta::seconds(60));
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
