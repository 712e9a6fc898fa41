use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use carpool_core::TripListQuery;
use carpool_shared::{Trip, TripDraft, TripPage, TripPatch};
use carpool_trip::{GrabOutcome, TripDetail, UpdateOutcome};

use crate::{error::AppError, middleware::AuthUser, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct GrabRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips", post(create_trip).get(list_trips))
        .route("/trips/mine", get(my_trips))
        .route("/trips/{id}", get(get_trip).patch(update_trip).delete(delete_trip))
        .route("/trips/{id}/detail", get(trip_detail))
        .route("/trips/{id}/cancel", post(cancel_trip))
        .route("/trips/{id}/complete", post(complete_trip))
        .route("/trips/{id}/grab", post(grab_trip))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/trips
async fn create_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(draft): Json<TripDraft>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.create(user.user_id, draft).await?))
}

/// GET /v1/trips
async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<TripListQuery>,
) -> Result<Json<TripPage>, AppError> {
    Ok(Json(state.trips.list(query).await?))
}

/// GET /v1/trips/mine
async fn my_trips(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.trips.my_trips(user.user_id).await?))
}

/// GET /v1/trips/{id}
/// Counts a view unless the caller owns the trip
async fn get_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.get_and_count_view(trip_id, Some(user.user_id)).await?))
}

/// GET /v1/trips/{id}/detail
async fn trip_detail(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripDetail>, AppError> {
    Ok(Json(state.trips.get_owned_detail(trip_id, user.user_id).await?))
}

/// PATCH /v1/trips/{id}
async fn update_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    Json(patch): Json<TripPatch>,
) -> Result<Json<UpdateOutcome>, AppError> {
    Ok(Json(state.trips.update_trip(trip_id, user.user_id, patch).await?))
}

/// DELETE /v1/trips/{id}
async fn delete_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Ack>, AppError> {
    state.trips.delete(trip_id, user.user_id).await?;
    Ok(Json(Ack { success: true }))
}

/// POST /v1/trips/{id}/cancel
async fn cancel_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Ack>, AppError> {
    state.trips.cancel(trip_id, user.user_id).await?;
    Ok(Json(Ack { success: true }))
}

/// POST /v1/trips/{id}/complete
async fn complete_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Ack>, AppError> {
    state.trips.complete(trip_id, user.user_id).await?;
    Ok(Json(Ack { success: true }))
}

/// POST /v1/trips/{id}/grab
async fn grab_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    body: Option<Json<GrabRequest>>,
) -> Result<Json<GrabOutcome>, AppError> {
    let Json(req) = body.unwrap_or_default();
    Ok(Json(state.trips.grab(trip_id, user.user_id, req.message).await?))
}
