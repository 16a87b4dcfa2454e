use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use busline_catalog::NewSchedule;
use busline_order::SweepReport;
use busline_shared::{Schedule, ScheduleStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListSchedulesQuery {
    pub status: Option<ScheduleStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CancelScheduleRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub schedule_id: Uuid,
    pub affected_bookings: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/schedules/{id}", get(get_schedule))
}

/// Mounted behind `admin_auth_middleware`
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/schedules", post(create_schedule).get(list_schedules))
        .route("/admin/schedules/{id}/complete", post(complete_schedule))
        .route("/admin/schedules/{id}/cancel", post(cancel_schedule))
        .route("/admin/bookings/{id}", delete(delete_booking))
        .route("/admin/sweeps", post(run_sweep))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/schedules/{id}
async fn get_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Schedule>, AppError> {
    Ok(Json(state.schedules.get(id).await?))
}

/// POST /v1/admin/schedules
async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<NewSchedule>,
) -> Result<(StatusCode, Json<Schedule>), AppError> {
    let schedule = state.schedules.create(req).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// GET /v1/admin/schedules?status=
async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<ListSchedulesQuery>,
) -> Result<Json<Vec<Schedule>>, AppError> {
    Ok(Json(state.schedules.list(query.status).await?))
}

/// POST /v1/admin/schedules/{id}/complete
async fn complete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CascadeResponse>, AppError> {
    let completed = state.bookings.complete_schedule(id).await?;
    Ok(Json(CascadeResponse {
        schedule_id: id,
        affected_bookings: completed.into_iter().map(|b| b.id).collect(),
    }))
}

/// POST /v1/admin/schedules/{id}/cancel
async fn cancel_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelScheduleRequest>>,
) -> Result<Json<CascadeResponse>, AppError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let cancelled = state.bookings.cancel_schedule(id, reason).await?;
    Ok(Json(CascadeResponse {
        schedule_id: id,
        affected_bookings: cancelled.into_iter().map(|b| b.id).collect(),
    }))
}

/// DELETE /v1/admin/bookings/{id}
async fn delete_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.bookings.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/admin/sweeps
/// Runs every sweep duty now, outside the regular interval.
async fn run_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    Json(state.sweeper.run_once().await)
}
