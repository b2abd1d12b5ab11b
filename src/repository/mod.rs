use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{
        Comment, FilterQuery, NewComment, NewPost, NewUser, Post, Role, Session, User,
        Verification,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresRepository;

/// Upper bound for a single store round-trip, so a stalled backend cannot
/// hold a request task forever.
pub const DATABASE_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// SessionRepository
///
/// Persistence contract for login sessions. Implementations key rows by the
/// token digest and must tolerate concurrent create/delete/lookup from many
/// request tasks; atomicity is the backend's job, not the caller's.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;
    /// Loads the session together with its owner, the owner's role included.
    async fn find_with_owner(&self, id: &str) -> Result<(Session, User), StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Removes every session whose expiry lies before `now`. Returns the count.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts the user under `role_name` and its verification in one transaction.
    async fn create_with_verification(
        &self,
        user: NewUser,
        role_name: &str,
        expired_at: DateTime<Utc>,
    ) -> Result<(User, Verification), StoreError>;
    /// Redeems an unexpired verification of an unverified user, then drops
    /// every verification that user still has.
    async fn verify(&self, verification_id: Uuid) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn find(&self, id: i64) -> Result<Post, StoreError>;
    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Post>, StoreError>;
    async fn find_all_by_user_id(
        &self,
        filter: FilterQuery,
        user_id: i64,
    ) -> Result<Vec<Post>, StoreError>;
    async fn update(&self, post: &Post) -> Result<Post, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Fails with `NotFound` when the referenced post does not exist.
    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError>;
    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Comment>, StoreError>;
    async fn find_all_by_post_id(
        &self,
        filter: FilterQuery,
        post_id: i64,
    ) -> Result<Vec<Comment>, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Storage
///
/// One shared handle per repository capability. Cloning is cheap.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
}

impl Storage {
    pub fn postgres(repo: PostgresRepository) -> Self {
        Self::from_backend(Arc::new(repo))
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self::from_backend(store)
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepository
            + RoleRepository
            + SessionRepository
            + PostRepository
            + CommentRepository
            + 'static,
    {
        Self {
            users: backend.clone(),
            roles: backend.clone(),
            sessions: backend.clone(),
            posts: backend.clone(),
            comments: backend,
        }
    }
}

/// Runs a driver call under `DATABASE_QUERY_TIMEOUT`.
pub(crate) async fn bounded<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(DATABASE_QUERY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout),
    }
}
