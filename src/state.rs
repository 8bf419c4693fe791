use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::offers::repo::{OfferStore, PgOfferStore};
use crate::storage::{S3Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub offers: Arc<dyn OfferStore>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(S3Storage::connect(&config.storage).await?) as Arc<dyn StorageClient>;
        let offers = Arc::new(PgOfferStore::new(db.clone())) as Arc<dyn OfferStore>;
        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;

        Ok(Self::from_parts(db, config, storage, offers, users))
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
        offers: Arc<dyn OfferStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            db,
            config,
            storage,
            offers,
            users,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory stores and storage; the pool connects lazily and is only
    /// touched by migrations.
    pub fn fake_with(
        storage: Arc<crate::storage::MemoryStorage>,
        offers: Arc<crate::offers::repo::MemoryOfferStore>,
    ) -> Self {
        let config = Arc::new(AppConfig::for_tests());
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");
        let users = Arc::new(crate::auth::repo::MemoryUserStore::new());
        Self::from_parts(db, config, storage, offers, users)
    }

    /// Swaps in a user store the test keeps a handle to.
    pub fn with_users(mut self, users: Arc<crate::auth::repo::MemoryUserStore>) -> Self {
        self.users = users;
        self
    }

    pub fn fake() -> Self {
        Self::fake_with(Default::default(), Default::default())
    }
}
