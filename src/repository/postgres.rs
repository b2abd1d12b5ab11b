use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{
    CommentRepository, PostRepository, RoleRepository, SessionRepository, UserRepository, bounded,
};
use crate::{
    credential::Password,
    error::StoreError,
    models::{
        Comment, FilterQuery, NewComment, NewPost, NewUser, Post, Role, Session, User,
        Verification,
    },
};

/// Users are always read joined with their role so authorization never needs
/// a second round-trip.
const SELECT_USER: &str = r#"
    SELECT u.id, u.role_id, u.email, u.username, u.password, u.verified,
           u.created_at, u.updated_at,
           r.level AS role_level, r.name AS role_name, r.description AS role_description
    FROM users u
    INNER JOIN roles r ON r.id = u.role_id
"#;

const POST_COLUMNS: &str = "id, user_id, title, content, verified, created_at, updated_at";
const COMMENT_COLUMNS: &str =
    "id, user_id, post_id, content, verified, created_at, updated_at";

/// PostgresRepository
///
/// The sqlx-backed implementation of every repository capability.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role_id: i64 = row.try_get("role_id")?;
    let password: Vec<u8> = row.try_get("password")?;

    Ok(User {
        id: row.try_get("id")?,
        role_id,
        role: Role {
            id: role_id,
            level: row.try_get("role_level")?,
            name: row.try_get("role_name")?,
            description: row.try_get("role_description")?,
        },
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password: Password::from_hash(password),
        verified: row.try_get("verified")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn affected(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl SessionRepository for PostgresRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        bounded(
            sqlx::query("INSERT INTO sessions (id, user_id, expired_at) VALUES ($1, $2, $3)")
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expired_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    /// find_with_owner
    ///
    /// Single query joining session -> user -> role.
    async fn find_with_owner(&self, id: &str) -> Result<(Session, User), StoreError> {
        let sql = r#"
            SELECT s.id AS session_id, s.user_id AS session_user_id, s.expired_at,
                   u.id, u.role_id, u.email, u.username, u.password, u.verified,
                   u.created_at, u.updated_at,
                   r.level AS role_level, r.name AS role_name, r.description AS role_description
            FROM sessions s
            INNER JOIN users u ON s.user_id = u.id
            INNER JOIN roles r ON u.role_id = r.id
            WHERE s.id = $1
        "#;

        let row = bounded(sqlx::query(sql).bind(id).fetch_one(&self.pool)).await?;

        let session = Session {
            id: row.try_get("session_id").map_err(StoreError::from)?,
            user_id: row.try_get("session_user_id").map_err(StoreError::from)?,
            expired_at: row.try_get("expired_at").map_err(StoreError::from)?,
        };
        let user = user_from_row(&row)?;

        Ok((session, user))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = bounded(
            sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        affected(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = bounded(
            sqlx::query("DELETE FROM sessions WHERE expired_at < $1")
                .bind(now)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RoleRepository for PostgresRepository {
    async fn find_by_name(&self, name: &str) -> Result<Role, StoreError> {
        bounded(
            sqlx::query_as::<_, Role>(
                "SELECT id, level, name, description FROM roles WHERE name = $1",
            )
            .bind(name)
            .fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    /// create_with_verification
    ///
    /// The role is resolved by name inside the INSERT; an unknown role name
    /// inserts nothing and surfaces as `NotFound`.
    async fn create_with_verification(
        &self,
        user: NewUser,
        role_name: &str,
        expired_at: DateTime<Utc>,
    ) -> Result<(User, Verification), StoreError> {
        let pool = self.pool.clone();
        let role_name = role_name.to_string();

        let verification = bounded(async move {
            let mut tx = pool.begin().await?;

            let user_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO users (role_id, email, username, password)
                SELECT r.id, $1, $2, $3 FROM roles r WHERE r.name = $4
                RETURNING id
                "#,
            )
            .bind(&user.email)
            .bind(&user.username)
            .bind(user.password.hash())
            .bind(&role_name)
            .fetch_one(&mut *tx)
            .await?;

            let verification = sqlx::query_as::<_, Verification>(
                r#"
                INSERT INTO verifications (id, user_id, expired_at)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, expired_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(expired_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(verification)
        })
        .await?;

        let user = self.find_by_id(verification.user_id).await?;
        Ok((user, verification))
    }

    async fn verify(&self, verification_id: Uuid) -> Result<User, StoreError> {
        let pool = self.pool.clone();

        let user_id = bounded(async move {
            let mut tx = pool.begin().await?;

            let user_id: i64 = sqlx::query_scalar(
                r#"
                UPDATE users SET verified = TRUE, updated_at = NOW()
                FROM verifications v
                WHERE users.id = v.user_id
                  AND users.verified = FALSE
                  AND v.expired_at > NOW()
                  AND v.id = $1
                RETURNING users.id
                "#,
            )
            .bind(verification_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM verifications WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(user_id)
        })
        .await?;

        self.find_by_id(user_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("{SELECT_USER} WHERE u.email = $1");
        let row = bounded(sqlx::query(&sql).bind(email).fetch_one(&self.pool)).await?;
        Ok(user_from_row(&row)?)
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<User>, StoreError> {
        let sql = format!("{SELECT_USER} ORDER BY u.id LIMIT $1 OFFSET $2");
        let rows = bounded(
            sqlx::query(&sql)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| user_from_row(row).map_err(StoreError::from))
            .collect()
    }
}

impl PostgresRepository {
    async fn find_by_id(&self, id: i64) -> Result<User, StoreError> {
        let sql = format!("{SELECT_USER} WHERE u.id = $1");
        let row = bounded(sqlx::query(&sql).bind(id).fetch_one(&self.pool)).await?;
        Ok(user_from_row(&row)?)
    }
}

#[async_trait]
impl PostRepository for PostgresRepository {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let sql = format!(
            "INSERT INTO posts (user_id, title, content) VALUES ($1, $2, $3) RETURNING {POST_COLUMNS}"
        );
        bounded(
            sqlx::query_as::<_, Post>(&sql)
                .bind(post.user_id)
                .bind(&post.title)
                .bind(&post.content)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn find(&self, id: i64) -> Result<Post, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        bounded(sqlx::query_as::<_, Post>(&sql).bind(id).fetch_one(&self.pool)).await
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id LIMIT $1 OFFSET $2");
        bounded(
            sqlx::query_as::<_, Post>(&sql)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn find_all_by_user_id(
        &self,
        filter: FilterQuery,
        user_id: i64,
    ) -> Result<Vec<Post>, StoreError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY id LIMIT $2 OFFSET $3"
        );
        bounded(
            sqlx::query_as::<_, Post>(&sql)
                .bind(user_id)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn update(&self, post: &Post) -> Result<Post, StoreError> {
        let sql = format!(
            "UPDATE posts SET title = $1, content = $2, updated_at = NOW() WHERE id = $3 RETURNING {POST_COLUMNS}"
        );
        bounded(
            sqlx::query_as::<_, Post>(&sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(post.id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = bounded(
            sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        affected(result.rows_affected())
    }
}

#[async_trait]
impl CommentRepository for PostgresRepository {
    async fn create(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let sql = format!(
            "INSERT INTO comments (user_id, post_id, content) VALUES ($1, $2, $3) RETURNING {COMMENT_COLUMNS}"
        );
        bounded(
            sqlx::query_as::<_, Comment>(&sql)
                .bind(comment.user_id)
                .bind(comment.post_id)
                .bind(&comment.content)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_all(&self, filter: FilterQuery) -> Result<Vec<Comment>, StoreError> {
        let sql =
            format!("SELECT {COMMENT_COLUMNS} FROM comments ORDER BY id LIMIT $1 OFFSET $2");
        bounded(
            sqlx::query_as::<_, Comment>(&sql)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn find_all_by_post_id(
        &self,
        filter: FilterQuery,
        post_id: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY id LIMIT $2 OFFSET $3"
        );
        bounded(
            sqlx::query_as::<_, Comment>(&sql)
                .bind(post_id)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool),
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = bounded(
            sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        affected(result.rows_affected())
    }
}
