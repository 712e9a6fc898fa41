use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use carpool_shared::{ContactInfo, Match};

use crate::{error::AppError, middleware::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub accept: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matches/mine", get(my_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/confirm", post(confirm_match))
        .route("/matches/{id}/contact", get(contact_info))
}

/// GET /v1/matches/mine
async fn my_matches(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Match>>, AppError> {
    Ok(Json(state.matches.get_my_matches(user.user_id).await?))
}

/// GET /v1/matches/{id}
async fn get_match(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Match>, AppError> {
    Ok(Json(state.matches.get(match_id, user.user_id).await?))
}

/// POST /v1/matches/{id}/confirm
async fn confirm_match(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<Match>, AppError> {
    Ok(Json(state.matches.confirm(match_id, user.user_id, req.accept).await?))
}

/// GET /v1/matches/{id}/contact
async fn contact_info(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<ContactInfo>, AppError> {
    Ok(Json(state.matches.get_contact_info(match_id, user.user_id).await?))
}
