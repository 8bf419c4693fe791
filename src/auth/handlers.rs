use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    attachments::{self, read_pdf_field, DocumentOwner},
    auth::{
        dto::{AuthResponse, LoginRequest, ProfileRequest, PublicUser, RefreshRequest, RegisterRequest},
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        repo::UserStoreError,
        repo_types::{Role, User},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub fn student_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/student/profile", put(update_profile))
        .route(
            "/student/profile/cv",
            put(upload_cv)
                .get(get_cv)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 120;

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

fn internal<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> (StatusCode, String) {
    move |e| {
        error!(error = %e, "{} failed", context);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{} failed", context))
    }
}

fn user_err(context: &'static str) -> impl FnOnce(UserStoreError) -> (StatusCode, String) {
    move |e| match e {
        UserStoreError::NotFound => (StatusCode::UNAUTHORIZED, "User not found".into()),
        UserStoreError::EmailTaken => {
            warn!("email already registered");
            (StatusCode::CONFLICT, "Email already registered".into())
        }
        UserStoreError::Storage(e) => internal(context)(e),
    }
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys
        .sign_access(user.id, user.role)
        .map_err(internal("jwt sign access"))?;
    let refresh_token = keys
        .sign_refresh(user.id, user.role)
        .map_err(internal("jwt sign refresh"))?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();
    let name = payload.name.trim();

    if payload.email.chars().count() > MAX_EMAIL_LEN || !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err((StatusCode::BAD_REQUEST, "Name is required (max 100 characters)".into()));
    }

    let hash = hash_password(&payload.password).map_err(internal("hash_password"))?;
    // The unique index decides between concurrent registrations.
    let user = state
        .users
        .create(&payload.email, &hash, name, payload.role)
        .await
        .map_err(user_err("create user"))?;

    info!(user_id = user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match state.users.find_by_email(&payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid email or password".into()));
        }
        Err(e) => return Err(user_err("find_by_email")(e)),
    };

    let ok = verify_password(&payload.password, &user.password_hash)
        .map_err(internal("verify_password"))?;
    if !ok {
        warn!(email = %payload.email, user_id = user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid email or password".into()));
    }

    info!(user_id = user.id, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    // Reload so a changed role is reflected in the new pair.
    let user = state
        .users
        .find_by_id(claims.sub)
        .await
        .map_err(user_err("find_by_id"))?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    Ok(Json(issue_tokens(&state, user)?))
}

async fn current_user(state: &AppState, auth: AuthUser) -> Result<User, (StatusCode, String)> {
    state
        .users
        .find_by_id(auth.id)
        .await
        .map_err(user_err("find_by_id"))?
        .ok_or_else(|| {
            warn!(user_id = auth.id, "token for missing user");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    Ok(Json(current_user(&state, auth).await?.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProfileRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    auth.require(Role::Student)?;
    let name = payload.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err((StatusCode::BAD_REQUEST, "Name is required (max 100 characters)".into()));
    }
    let diploma = payload
        .diploma
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());
    if diploma.is_some_and(|d| d.chars().count() > MAX_NAME_LEN) {
        return Err((StatusCode::BAD_REQUEST, "Diploma must be at most 100 characters".into()));
    }

    let user = state
        .users
        .update_profile(auth.id, name, diploma)
        .await
        .map_err(user_err("update profile"))?;
    info!(user_id = user.id, "profile updated");
    Ok(Json(user.into()))
}

/// PUT /student/profile/cv (multipart, field `cv_file`); replaces any previous CV.
#[instrument(skip(state, mp))]
pub async fn upload_cv(
    State(state): State<AppState>,
    auth: AuthUser,
    mut mp: Multipart,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    auth.require(Role::Student)?;
    let item = read_pdf_field(&mut mp, "cv_file").await.map_err(|e| {
        warn!(error = %e, "cv upload rejected");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let mut user = current_user(&state, auth).await?;
    let key = attachments::store_document(&state, DocumentOwner::Student(user.id), item)
        .await
        .map_err(internal("store cv"))?;
    let previous = match state.users.set_cv_key(user.id, &key).await {
        Ok(previous) => previous,
        Err(e) => {
            attachments::discard_document(&state, &key).await;
            return Err(user_err("save cv key")(e));
        }
    };
    if let Some(old) = previous.as_deref() {
        attachments::discard_document(&state, old).await;
    }
    info!(user_id = user.id, "cv stored");
    user.cv_key = Some(key);
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_cv(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, (StatusCode, String)> {
    auth.require(Role::Student)?;
    let user = current_user(&state, auth).await?;
    let Some(key) = user.cv_key else {
        return Err((StatusCode::NOT_FOUND, "No CV uploaded".into()));
    };
    let url = attachments::presign_document(&state, &key)
        .await
        .map_err(internal("presign cv"))?;
    Ok(Redirect::temporary(&url).into_response())
}
