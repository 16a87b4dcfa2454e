use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use busline_shared::{ScheduleAvailability, SeatLock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LockSeatsRequest {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<u32>,
    pub session_id: String,
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseSeatsRequest {
    pub schedule_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtendLocksRequest {
    pub schedule_id: Uuid,
    pub session_id: String,
    pub additional_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LockResponse {
    fn from_locks(schedule_id: Uuid, locks: Vec<SeatLock>) -> Self {
        let expires_at = locks.iter().map(|l| l.expires_at).min();
        Self {
            schedule_id,
            seat_numbers: locks.into_iter().map(|l| l.seat_number).collect(),
            expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: u64,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub session_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/seats/lock", post(lock_seats))
        .route("/seats/release", post(release_seats))
        .route("/seats/extend", post(extend_locks))
        .route("/seats/availability/{schedule_id}", get(availability))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/seats/lock
async fn lock_seats(
    State(state): State<AppState>,
    Json(req): Json<LockSeatsRequest>,
) -> Result<Json<LockResponse>, AppError> {
    let locks = state
        .seats
        .lock(req.schedule_id, &req.seat_numbers, &req.session_id, req.ttl_minutes)
        .await?;
    Ok(Json(LockResponse::from_locks(req.schedule_id, locks)))
}

/// POST /v1/seats/release
async fn release_seats(
    State(state): State<AppState>,
    Json(req): Json<ReleaseSeatsRequest>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state.seats.release(req.schedule_id, &req.session_id).await?;
    Ok(Json(ReleaseResponse { released }))
}

/// POST /v1/seats/extend
async fn extend_locks(
    State(state): State<AppState>,
    Json(req): Json<ExtendLocksRequest>,
) -> Result<Json<LockResponse>, AppError> {
    let locks = state
        .seats
        .extend(req.schedule_id, &req.session_id, req.additional_minutes)
        .await?;
    Ok(Json(LockResponse::from_locks(req.schedule_id, locks)))
}

/// GET /v1/seats/availability/{schedule_id}?session_id=
/// Seats held by `session_id` come back as `held` rather than `locked`.
async fn availability(
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ScheduleAvailability>, AppError> {
    let view = state
        .seats
        .query_availability(schedule_id, query.session_id.as_deref())
        .await?;
    Ok(Json(view))
}
