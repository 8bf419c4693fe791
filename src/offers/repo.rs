use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::repo_types::{Offer, OfferDraft};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("offer not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Durable offer records keyed by id.
#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Offer>, StoreError>;
    async fn get(&self, id: i64) -> Result<Offer, StoreError>;
    async fn list_by_recruiter(&self, recruiter_id: i64) -> Result<Vec<Offer>, StoreError>;
    /// Assigns the id and creation timestamp.
    async fn insert(&self, recruiter_id: i64, draft: OfferDraft) -> Result<Offer, StoreError>;
    /// Writes the recruiter-editable fields; id, created_at, recruiter_id and
    /// document_key are left alone.
    async fn update(&self, offer: &Offer) -> Result<(), StoreError>;
    /// Swaps the attached document key and returns the one it replaced.
    async fn set_document_key(&self, id: i64, key: &str) -> Result<Option<String>, StoreError>;
    /// Returns the removed record so callers can clean up its attachment.
    async fn delete(&self, id: i64) -> Result<Offer, StoreError>;
}

pub struct PgOfferStore {
    db: PgPool,
}

impl PgOfferStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OfferStore for PgOfferStore {
    async fn list_all(&self) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query_as::<_, Offer>(
            r#"
            SELECT id, title, company, location, duration, description, tags,
                   created_at, start_date, document_key, recruiter_id
            FROM offers
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Offer, StoreError> {
        sqlx::query_as::<_, Offer>(
            r#"
            SELECT id, title, company, location, duration, description, tags,
                   created_at, start_date, document_key, recruiter_id
            FROM offers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn list_by_recruiter(&self, recruiter_id: i64) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query_as::<_, Offer>(
            r#"
            SELECT id, title, company, location, duration, description, tags,
                   created_at, start_date, document_key, recruiter_id
            FROM offers
            WHERE recruiter_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(recruiter_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert(&self, recruiter_id: i64, draft: OfferDraft) -> Result<Offer, StoreError> {
        let offer = sqlx::query_as::<_, Offer>(
            r#"
            INSERT INTO offers (title, company, location, duration, description, tags,
                                start_date, recruiter_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, title, company, location, duration, description, tags,
                      created_at, start_date, document_key, recruiter_id
            "#,
        )
        .bind(draft.title)
        .bind(draft.company)
        .bind(draft.location)
        .bind(draft.duration)
        .bind(draft.description)
        .bind(draft.tags)
        .bind(draft.start_date)
        .bind(recruiter_id)
        .fetch_one(&self.db)
        .await?;
        Ok(offer)
    }

    async fn update(&self, offer: &Offer) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE offers
               SET title = $2, company = $3, location = $4, duration = $5,
                   description = $6, tags = $7, start_date = $8
             WHERE id = $1
            "#,
        )
        .bind(offer.id)
        .bind(&offer.title)
        .bind(&offer.company)
        .bind(&offer.location)
        .bind(&offer.duration)
        .bind(&offer.description)
        .bind(&offer.tags)
        .bind(&offer.start_date)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_document_key(&self, id: i64, key: &str) -> Result<Option<String>, StoreError> {
        let previous: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE offers o
               SET document_key = $2
              FROM (SELECT id, document_key FROM offers WHERE id = $1 FOR UPDATE) old
             WHERE o.id = old.id
            RETURNING old.document_key
            "#,
        )
        .bind(id)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        previous.map(|(key,)| key).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<Offer, StoreError> {
        sqlx::query_as::<_, Offer>(
            r#"
            DELETE FROM offers
             WHERE id = $1
            RETURNING id, title, company, location, duration, description, tags,
                      created_at, start_date, document_key, recruiter_id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }
}

#[derive(Default)]
struct MemoryInner {
    last_id: i64,
    offers: BTreeMap<i64, Offer>,
}

/// Offer store backed by a map; used by tests and `AppState::fake`.
#[derive(Default)]
pub struct MemoryOfferStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with already-built records, keeping their ids and timestamps.
    pub async fn with_offers(offers: impl IntoIterator<Item = Offer>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().await;
            for offer in offers {
                inner.last_id = inner.last_id.max(offer.id);
                inner.offers.insert(offer.id, offer);
            }
        }
        store
    }
}

#[async_trait]
impl OfferStore for MemoryOfferStore {
    async fn list_all(&self) -> Result<Vec<Offer>, StoreError> {
        Ok(self.inner.read().await.offers.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Offer, StoreError> {
        self.inner
            .read()
            .await
            .offers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_by_recruiter(&self, recruiter_id: i64) -> Result<Vec<Offer>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .offers
            .values()
            .filter(|o| o.recruiter_id == recruiter_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, recruiter_id: i64, draft: OfferDraft) -> Result<Offer, StoreError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let mut offer = Offer {
            id: inner.last_id,
            title: String::new(),
            company: String::new(),
            location: String::new(),
            duration: String::new(),
            description: None,
            tags: None,
            created_at: OffsetDateTime::now_utc(),
            start_date: None,
            document_key: None,
            recruiter_id,
        };
        offer.apply(draft);
        inner.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn update(&self, offer: &Offer) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.offers.get_mut(&offer.id).ok_or(StoreError::NotFound)?;
        let document_key = stored.document_key.take();
        let Offer {
            id,
            created_at,
            recruiter_id,
            ..
        } = *stored;
        *stored = Offer {
            id,
            created_at,
            recruiter_id,
            document_key,
            ..offer.clone()
        };
        Ok(())
    }

    async fn set_document_key(&self, id: i64, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.offers.get_mut(&id).ok_or(StoreError::NotFound)?;
        Ok(stored.document_key.replace(key.to_string()))
    }

    async fn delete(&self, id: i64) -> Result<Offer, StoreError> {
        self.inner
            .write()
            .await
            .offers
            .remove(&id)
            .ok_or(StoreError::NotFound)
    }
}
