use crate::error::RepoError;
use crate::models::{NewUser, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Repository Trait
///
/// The persistence contract for user records. Handlers and the token filter only
/// see this trait, so the Postgres store and the in-memory store are interchangeable.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Looks a user up by surrogate id.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
    /// Looks a user up by username (exact, case-sensitive).
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    /// Inserts a user and returns it with its assigned id.
    /// Fails with `RepoError::UsernameTaken` when the username exists.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
}

/// RepositoryState
///
/// The shared handle placed in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the `tb_users` table.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ensure_schema
    ///
    /// Creates `tb_users` when missing. Username uniqueness and non-null columns
    /// are declared here so the store enforces them.
    pub async fn ensure_schema(&self) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tb_users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password FROM tb_users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("find_by_id error: {:?}", e);
            e
        })?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password FROM tb_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("find_by_username error: {:?}", e);
            e
        })?;
        Ok(user)
    }

    /// create_user
    ///
    /// Inserts and returns the stored row. A unique-constraint violation on
    /// `username` is reported as `UsernameTaken` rather than a database error.
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO tb_users (username, password)
            VALUES ($1, $2)
            RETURNING id, username, password
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepoError::UsernameTaken(user.username))
            }
            Err(e) => {
                tracing::error!("create_user error: {:?}", e);
                Err(e.into())
            }
        }
    }
}

/// InMemoryRepository
///
/// `Repository` kept in process memory. Used by the test suite and for running the
/// gateway without a database. Ids come from a counter that only moves forward.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<InMemoryUsers>,
}

#[derive(Default)]
struct InMemoryUsers {
    last_id: i64,
    by_id: BTreeMap<i64, User>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a user. Its id stays consumed.
    pub fn remove(&self, id: i64) -> Option<User> {
        let mut users = self.inner.write().unwrap_or_else(|p| p.into_inner());
        users.by_id.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let users = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Ok(users.by_id.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        let users = self.inner.read().unwrap_or_else(|p| p.into_inner());
        Ok(users
            .by_id
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut users = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if users.by_id.values().any(|u| u.username == user.username) {
            return Err(RepoError::UsernameTaken(user.username));
        }

        users.last_id += 1;
        let created = User {
            id: users.last_id,
            username: user.username,
            password: user.password_hash,
        };
        users.by_id.insert(created.id, created.clone());
        Ok(created)
    }
}
