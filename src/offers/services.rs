use axum::http::StatusCode;
use tracing::{error, info, warn};

use super::repo::StoreError;
use super::repo_types::{Offer, OfferDraft};
use crate::attachments::{self, DocumentOwner, UploadError, UploadItem};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum OfferActionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("you can only modify your own offers")]
    NotOwner,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("document storage failed: {0}")]
    Storage(anyhow::Error),
}

impl OfferActionError {
    pub fn status(&self) -> StatusCode {
        match self {
            OfferActionError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            OfferActionError::NotOwner => StatusCode::FORBIDDEN,
            OfferActionError::Upload(_) => StatusCode::BAD_REQUEST,
            OfferActionError::Store(StoreError::Storage(_)) | OfferActionError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<OfferActionError> for (StatusCode, String) {
    fn from(e: OfferActionError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            error!(error = %e, "offer action failed");
        } else {
            warn!(error = %e, "offer action rejected");
        }
        (status, e.to_string())
    }
}

/// Loads an offer and checks that `user_id` owns it.
async fn owned_offer(st: &AppState, user_id: i64, offer_id: i64) -> Result<Offer, OfferActionError> {
    let offer = st.offers.get(offer_id).await?;
    if offer.recruiter_id != user_id {
        return Err(OfferActionError::NotOwner);
    }
    Ok(offer)
}

pub async fn create_offer(
    st: &AppState,
    recruiter_id: i64,
    draft: OfferDraft,
) -> Result<Offer, OfferActionError> {
    let offer = st.offers.insert(recruiter_id, draft).await?;
    info!(offer_id = offer.id, recruiter_id, "offer created");
    Ok(offer)
}

pub async fn update_offer(
    st: &AppState,
    user_id: i64,
    offer_id: i64,
    draft: OfferDraft,
) -> Result<Offer, OfferActionError> {
    let mut offer = owned_offer(st, user_id, offer_id).await?;
    offer.apply(draft);
    st.offers.update(&offer).await?;
    info!(offer_id, "offer updated");
    Ok(offer)
}

/// Removes the offer, then its attached document.
pub async fn delete_offer(st: &AppState, user_id: i64, offer_id: i64) -> Result<(), OfferActionError> {
    owned_offer(st, user_id, offer_id).await?;
    let removed = st.offers.delete(offer_id).await?;
    if let Some(key) = removed.document_key.as_deref() {
        attachments::discard_document(st, key).await;
    }
    info!(offer_id, "offer deleted");
    Ok(())
}

/// Stores a new document for the offer and drops the one it replaces.
pub async fn attach_document(
    st: &AppState,
    user_id: i64,
    offer_id: i64,
    item: UploadItem,
) -> Result<Offer, OfferActionError> {
    let mut offer = owned_offer(st, user_id, offer_id).await?;
    let key = attachments::store_document(st, DocumentOwner::Offer(offer_id), item)
        .await
        .map_err(OfferActionError::Storage)?;
    let previous = match st.offers.set_document_key(offer_id, &key).await {
        Ok(previous) => previous,
        Err(e) => {
            attachments::discard_document(st, &key).await;
            return Err(e.into());
        }
    };
    if let Some(old) = previous.as_deref() {
        attachments::discard_document(st, old).await;
    }
    info!(offer_id, "offer document attached");
    offer.document_key = Some(key);
    Ok(offer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offers::repo::{MemoryOfferStore, OfferStore};
    use crate::storage::MemoryStorage;
    use bytes::Bytes;
    use std::sync::Arc;

    fn draft(title: &str) -> OfferDraft {
        OfferDraft {
            title: title.into(),
            company: "Acme".into(),
            location: "Tokyo".into(),
            duration: "6 mois".into(),
            description: None,
            tags: None,
            start_date: None,
        }
    }

    fn pdf(name: &str) -> UploadItem {
        UploadItem {
            filename: name.into(),
            body: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    #[tokio::test]
    async fn only_the_owner_can_update() {
        let state = AppState::fake();
        let offer = create_offer(&state, 1, draft("First")).await.unwrap();

        let err = update_offer(&state, 2, offer.id, draft("Hijack")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let updated = update_offer(&state, 1, offer.id, draft("Second")).await.unwrap();
        assert_eq!(updated.title, "Second");
        assert_eq!(updated.created_at, offer.created_at);
    }

    #[tokio::test]
    async fn missing_offer_is_not_found() {
        let state = AppState::fake();
        let err = delete_offer(&state, 1, 404).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn replacing_and_deleting_cleans_up_documents() {
        let storage = Arc::new(MemoryStorage::new());
        let offers = Arc::new(MemoryOfferStore::new());
        let state = AppState::fake_with(storage.clone(), offers.clone());

        let offer = create_offer(&state, 5, draft("With brief")).await.unwrap();
        let first = attach_document(&state, 5, offer.id, pdf("a.pdf")).await.unwrap();
        let first_key = first.document_key.clone().unwrap();
        assert!(storage.contains(&first_key));

        let second = attach_document(&state, 5, offer.id, pdf("b.pdf")).await.unwrap();
        let second_key = second.document_key.clone().unwrap();
        assert!(!storage.contains(&first_key));
        assert!(storage.contains(&second_key));
        assert_eq!(offers.get(offer.id).await.unwrap().document_key, Some(second_key.clone()));

        delete_offer(&state, 5, offer.id).await.unwrap();
        assert!(!storage.contains(&second_key));
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn editing_after_an_upload_keeps_the_document() {
        let storage = Arc::new(MemoryStorage::new());
        let offers = Arc::new(MemoryOfferStore::new());
        let state = AppState::fake_with(storage.clone(), offers.clone());

        let offer = create_offer(&state, 5, draft("Brief")).await.unwrap();
        let with_doc = attach_document(&state, 5, offer.id, pdf("a.pdf")).await.unwrap();
        let key = with_doc.document_key.unwrap();

        update_offer(&state, 5, offer.id, draft("Renamed")).await.unwrap();
        let stored = offers.get(offer.id).await.unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.document_key, Some(key.clone()));
        assert!(storage.contains(&key));
    }

    #[tokio::test]
    async fn foreign_recruiter_cannot_attach() {
        let storage = Arc::new(MemoryStorage::new());
        let state = AppState::fake_with(storage.clone(), Default::default());
        let offer = create_offer(&state, 1, draft("Mine")).await.unwrap();

        let err = attach_document(&state, 2, offer.id, pdf("x.pdf")).await.unwrap_err();
        assert!(matches!(err, OfferActionError::NotOwner));
        assert_eq!(storage.len(), 0);
    }
}
