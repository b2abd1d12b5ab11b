use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CommentRepository, PostRepository, RoleRepository, SessionRepository, UserRepository,
};
use crate::{
    error::StoreError,
    models::{
        Comment, FilterQuery, NewComment, NewPost, NewUser, Post, Role, Session, User,
        Verification,
    },
};

/// MemoryStore
///
/// An in-process implementation of every repository capability, used by the
/// test suites and for running the API without Postgres. A single lock guards
/// all tables so multi-table operations (register, verify) are atomic the same
/// way a database transaction would make them.
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    roles: Vec<Role>,
    users: BTreeMap<i64, User>,
    verifications: HashMap<Uuid, Verification>,
    sessions: HashMap<String, Session>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    next_user_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
}

impl Tables {
    fn user_with_role(&self, id: i64) -> Result<User, StoreError> {
        let mut user = self.users.get(&id).cloned().ok_or(StoreError::NotFound)?;
        if let Some(role) = self.roles.iter().find(|r| r.id == user.role_id) {
            user.role = role.clone();
        }
        Ok(user)
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, filter: FilterQuery) -> Vec<T> {
    items
        .skip(filter.offset.max(0) as usize)
        .take(filter.limit.max(0) as usize)
        .collect()
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store seeded with the same reference roles as the migration.
    pub fn new() -> Self {
        let roles = vec![
            Role {
                id: 1,
                level: 1,
                name: "user".to_string(),
                description: "Can create posts and comments".to_string(),
            },
            Role {
                id: 2,
                level: 2,
                name: "moderator".to_string(),
                description: "Can update and delete any post or comment".to_string(),
            },
            Role {
                id: 3,
                level: 3,
                name: "admin".to_string(),
                description: "Can manage users".to_string(),
            },
        ];

        Self {
            inner: RwLock::new(Tables {
                roles,
                next_user_id: 1,
                next_post_id: 1,
                next_comment_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// Moves a user to another role, the way an operator would in SQL.
    pub async fn assign_role(&self, user_id: i64, role_name: &str) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let role_id = tables
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .map(|r| r.id)
            .ok_or(StoreError::NotFound)?;
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.role_id = role_id;
        Ok(())
    }

    /// Raw session row by digest, if present.
    pub async fn session(&self, id: &str) -> Option<Session> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Rewrites a session's expiry. Lets tests age a session without sleeping.
    pub async fn set_session_expiry(&self, id: &str, expired_at: DateTime<Utc>) -> bool {
        match self.inner.write().await.sessions.get_mut(id) {
            Some(session) => {
                session.expired_at = expired_at;
                true
            }
            None => false,
        }
    }

    pub async fn set_verification_expiry(&self, id: Uuid, expired_at: DateTime<Utc>) -> bool {
        match self.inner.write().await.verifications.get_mut(&id) {
            Some(verification) => {
                verification.expired_at = expired_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.users.contains_key(&session.user_id) {
            return Err(StoreError::NotFound);
        }
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate);
        }
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_with_owner(&self, id: &str) -> Result<(Session, User), StoreError> {
        let tables = self.inner.read().await;
        let session = tables.sessions.get(id).cloned().ok_or(StoreError::NotFound)?;
        let user = tables.user_with_role(session.user_id)?;
        Ok((session, user))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .sessions
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.inner.write().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError> {
        self.inner
            .read()
            .await
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_with_verification(
        &self,
        user: NewUser,
        role_name: &str,
        expired_at: DateTime<Utc>,
    ) -> Result<(User, Verification), StoreError> {
        let mut tables = self.inner.write().await;

        let role = tables
            .roles
            .iter()
            .find(|r| r.name == role_name)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let taken = tables
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username);
        if taken {
            return Err(StoreError::Duplicate);
        }

        let id = tables.next_user_id;
        tables.next_user_id += 1;

        let now = Utc::now();
        let mut password = user.password;
        password.forget_raw();

        let created = User {
            id,
            role_id: role.id,
            role,
            email: user.email,
            username: user.username,
            password,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, created.clone());

        let verification = Verification {
            id: Uuid::new_v4(),
            user_id: id,
            expired_at,
        };
        tables
            .verifications
            .insert(verification.id, verification.clone());

        Ok((created, verification))
    }

    async fn verify(&self, verification_id: Uuid) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;
        let now = Utc::now();

        let user_id = tables
            .verifications
            .get(&verification_id)
            .filter(|v| v.expired_at > now)
            .map(|v| v.user_id)
            .ok_or(StoreError::NotFound)?;

        let user = tables
            .users
            .get_mut(&user_id)
            .filter(|u| !u.verified)
            .ok_or(StoreError::NotFound)?;
        user.verified = true;
        user.updated_at = now;

        tables.verifications.retain(|_, v| v.user_id != user_id);
        tables.user_with_role(user_id)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let tables = self.inner.read().await;
        let id = tables
            .users
            .values()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .ok_or(StoreError::NotFound)?;
        tables.user_with_role(id)
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<User>, StoreError> {
        let tables = self.inner.read().await;
        let ids = page(tables.users.keys().copied(), filter);
        ids.into_iter().map(|id| tables.user_with_role(id)).collect()
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.users.contains_key(&post.user_id) {
            return Err(StoreError::NotFound);
        }

        let id = tables.next_post_id;
        tables.next_post_id += 1;

        let now = Utc::now();
        let created = Post {
            id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn find(&self, id: i64) -> Result<Post, StoreError> {
        self.inner
            .read()
            .await
            .posts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Post>, StoreError> {
        let tables = self.inner.read().await;
        Ok(page(tables.posts.values().cloned(), filter))
    }

    async fn find_all_by_user_id(
        &self,
        filter: FilterQuery,
        user_id: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let tables = self.inner.read().await;
        Ok(page(
            tables.posts.values().filter(|p| p.user_id == user_id).cloned(),
            filter,
        ))
    }

    async fn update(&self, post: &Post) -> Result<Post, StoreError> {
        let mut tables = self.inner.write().await;
        let stored = tables.posts.get_mut(&post.id).ok_or(StoreError::NotFound)?;
        stored.title = post.title.clone();
        stored.content = post.content.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        tables.posts.remove(&id).ok_or(StoreError::NotFound)?;
        tables.comments.retain(|_, c| c.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut tables = self.inner.write().await;
        if !tables.posts.contains_key(&comment.post_id)
            || !tables.users.contains_key(&comment.user_id)
        {
            return Err(StoreError::NotFound);
        }

        let id = tables.next_comment_id;
        tables.next_comment_id += 1;

        let now = Utc::now();
        let created = Comment {
            id,
            user_id: comment.user_id,
            post_id: comment.post_id,
            content: comment.content,
            verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.comments.insert(id, created.clone());
        Ok(created)
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Comment>, StoreError> {
        let tables = self.inner.read().await;
        Ok(page(tables.comments.values().cloned(), filter))
    }

    async fn find_all_by_post_id(
        &self,
        filter: FilterQuery,
        post_id: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let tables = self.inner.read().await;
        Ok(page(
            tables.comments.values().filter(|c| c.post_id == post_id).cloned(),
            filter,
        ))
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .comments
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
