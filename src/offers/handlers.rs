use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, put},
    Json, Router,
};
use tracing::{error, instrument, warn};

use super::catalog::{aggregate_companies, extract_facets, filter_offers, sort_by_recency, CompanySummary, OfferFilter};
use super::dto::{CreatedOfferResponse, OfferForm, OfferListResponse, OfferView};
use super::repo::StoreError;
use super::services::{attach_document, create_offer, delete_offer, update_offer};
use crate::{
    attachments::{self, read_pdf_field},
    auth::{jwt::AuthUser, repo_types::Role},
    state::AppState,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/offers", get(list_offers))
        .route("/offers/:id", get(get_offer))
        .route("/offers/:id/document", get(get_offer_document))
        .route("/companies", get(list_companies))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/recruiter/offers", get(dashboard).post(create))
        .route("/recruiter/offers/:id", put(update).delete(remove))
        .route(
            "/recruiter/offers/:id/document",
            put(upload_document).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

// --- handlers ---

/// GET /offers?location=..&duration=..&company=.. (keys may repeat)
#[instrument(skip(state))]
pub async fn list_offers(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<OfferListResponse>, (StatusCode, String)> {
    let selected = OfferFilter::from_query_pairs(pairs);
    let corpus = state.offers.list_all().await.map_err(store_err)?;

    let offers = filter_offers(&corpus, &selected)
        .into_iter()
        .map(OfferView::from)
        .collect();
    Ok(Json(OfferListResponse {
        offers,
        facets: extract_facets(&corpus),
        selected,
    }))
}

#[instrument(skip(state))]
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OfferView>, (StatusCode, String)> {
    let offer = state.offers.get(id).await.map_err(store_err)?;
    Ok(Json(offer.into()))
}

/// 307 to a short-lived URL of the attached PDF.
#[instrument(skip(state))]
pub async fn get_offer_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, (StatusCode, String)> {
    let offer = state.offers.get(id).await.map_err(store_err)?;
    let Some(key) = offer.document_key else {
        return Err((StatusCode::NOT_FOUND, "Document not found".into()));
    };
    let url = attachments::presign_document(&state, &key)
        .await
        .map_err(|e| {
            error!(error = %e, offer_id = id, "presign failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "presign failed".to_string())
        })?;
    Ok(Redirect::temporary(&url).into_response())
}

#[instrument(skip(state))]
pub async fn list_companies(
    State(state): State<AppState>,
) -> Result<Json<Vec<CompanySummary>>, (StatusCode, String)> {
    let corpus = state.offers.list_all().await.map_err(store_err)?;
    Ok(Json(aggregate_companies(&corpus)))
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OfferView>>, (StatusCode, String)> {
    user.require(Role::Recruiter)?;
    let mut mine = state
        .offers
        .list_by_recruiter(user.id)
        .await
        .map_err(store_err)?;
    sort_by_recency(&mut mine);
    Ok(Json(mine.into_iter().map(OfferView::from).collect()))
}

/// POST /recruiter/offers
#[instrument(skip(state, form))]
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Json(form): Json<OfferForm>,
) -> Result<(StatusCode, HeaderMap, Json<CreatedOfferResponse>), (StatusCode, String)> {
    user.require(Role::Recruiter)?;
    let draft = form.into_draft().map_err(bad_request)?;
    let offer = create_offer(&state, user.id, draft).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/offers/{}", offer.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((
        StatusCode::CREATED,
        headers,
        Json(CreatedOfferResponse {
            id: offer.id,
            created_at: offer.created_at,
        }),
    ))
}

#[instrument(skip(state, form))]
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(form): Json<OfferForm>,
) -> Result<Json<OfferView>, (StatusCode, String)> {
    user.require(Role::Recruiter)?;
    let draft = form.into_draft().map_err(bad_request)?;
    let offer = update_offer(&state, user.id, id, draft).await?;
    Ok(Json(offer.into()))
}

#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    user.require(Role::Recruiter)?;
    delete_offer(&state, user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /recruiter/offers/:id/document (multipart, field `pdf_file`)
#[instrument(skip(state, mp))]
pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    mut mp: Multipart,
) -> Result<Json<OfferView>, (StatusCode, String)> {
    user.require(Role::Recruiter)?;
    let item = read_pdf_field(&mut mp, "pdf_file")
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    let offer = attach_document(&state, user.id, id, item).await?;
    Ok(Json(offer.into()))
}

fn bad_request(msg: String) -> (StatusCode, String) {
    warn!(%msg, "rejected offer request");
    (StatusCode::BAD_REQUEST, msg)
}

fn store_err(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound => (StatusCode::NOT_FOUND, "Offer not found".into()),
        StoreError::Storage(e) => {
            error!(error = %e, "offer store failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure".into())
        }
    }
}
