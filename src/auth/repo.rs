use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::auth::repo_types::{Role, User};

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("user not found")]
    NotFound,
    #[error("email already registered")]
    EmailTaken,
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Account records keyed by id, unique by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserStoreError>;
    /// Fails with `EmailTaken` when the address is already registered.
    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
    ) -> Result<User, UserStoreError>;
    async fn update_profile(
        &self,
        id: i64,
        name: &str,
        diploma: Option<&str>,
    ) -> Result<User, UserStoreError>;
    /// Swaps the stored CV key and returns the one it replaced.
    async fn set_cv_key(&self, id: i64, cv_key: &str) -> Result<Option<String>, UserStoreError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, role, diploma, cv_key, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserStoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, name, role, diploma, cv_key, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
    ) -> Result<User, UserStoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, name, role, diploma, cv_key, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                UserStoreError::EmailTaken
            }
            other => UserStoreError::Storage(other),
        })
    }

    async fn update_profile(
        &self,
        id: i64,
        name: &str,
        diploma: Option<&str>,
    ) -> Result<User, UserStoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = $2, diploma = $3
             WHERE id = $1
            RETURNING id, email, password_hash, name, role, diploma, cv_key, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(diploma)
        .fetch_optional(&self.db)
        .await?
        .ok_or(UserStoreError::NotFound)
    }

    async fn set_cv_key(&self, id: i64, cv_key: &str) -> Result<Option<String>, UserStoreError> {
        let previous: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE users u
               SET cv_key = $2
              FROM (SELECT id, cv_key FROM users WHERE id = $1 FOR UPDATE) old
             WHERE u.id = old.id
            RETURNING old.cv_key
            "#,
        )
        .bind(id)
        .bind(cv_key)
        .fetch_optional(&self.db)
        .await?;
        previous.map(|(key,)| key).ok_or(UserStoreError::NotFound)
    }
}

#[derive(Default)]
struct MemoryUsers {
    last_id: i64,
    users: BTreeMap<i64, User>,
}

/// User store backed by a map; used by tests and `AppState::fake`.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, UserStoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
    ) -> Result<User, UserStoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == email) {
            return Err(UserStoreError::EmailTaken);
        }
        inner.last_id += 1;
        let user = User {
            id: inner.last_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            role,
            diploma: None,
            cv_key: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: i64,
        name: &str,
        diploma: Option<&str>,
    ) -> Result<User, UserStoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(UserStoreError::NotFound)?;
        user.name = name.to_string();
        user.diploma = diploma.map(str::to_owned);
        Ok(user.clone())
    }

    async fn set_cv_key(&self, id: i64, cv_key: &str) -> Result<Option<String>, UserStoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(UserStoreError::NotFound)?;
        Ok(user.cv_key.replace(cv_key.to_string()))
    }
}
