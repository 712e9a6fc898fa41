use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use carpool_shared::NotificationPage;

use crate::{error::AppError, middleware::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarkedResponse {
    pub updated: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}

/// GET /v1/notifications
async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Result<Json<NotificationPage>, AppError> {
    let page = state
        .notifications
        .list(user.user_id, params.page, params.page_size)
        .await?;
    Ok(Json(page))
}

/// POST /v1/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<MarkedResponse>, AppError> {
    state.notifications.mark_read(notification_id, user.user_id).await?;
    Ok(Json(MarkedResponse { updated: 1 }))
}

/// POST /v1/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MarkedResponse>, AppError> {
    let updated = state.notifications.mark_all_read(user.user_id).await?;
    Ok(Json(MarkedResponse { updated }))
}
