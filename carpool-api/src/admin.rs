use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, middleware::AuthUser, state::AppState, trips::Ack};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips/{id}/ban", post(ban_trip))
        .route("/trips/{id}/unban", post(unban_trip))
}

/// POST /v1/admin/trips/{id}/ban
async fn ban_trip(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Ack>, AppError> {
    info!(admin_id = %admin.user_id, trip_id = %trip_id, "Admin ban requested");
    state.trips.admin_ban(trip_id).await?;
    Ok(Json(Ack { success: true }))
}

/// POST /v1/admin/trips/{id}/unban
async fn unban_trip(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Ack>, AppError> {
    info!(admin_id = %admin.user_id, trip_id = %trip_id, "Admin unban requested");
    state.trips.admin_unban(trip_id).await?;
    Ok(Json(Ack { success: true }))
}
