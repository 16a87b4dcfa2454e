use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use busline_order::{Actor, CreateBooking};
use busline_shared::Booking;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, middleware::Caller, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    /// Admin only
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub count: usize,
    pub booking_ids: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/reference/{code}", get(get_booking_by_reference))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
}

/// Mounted behind `admin_auth_middleware`
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/bookings/expire-pending", post(expire_pending))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
/// Anyone holding the seat locks may book; customers get their account attached.
async fn create_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let profile = caller.customer_profile();
    let booking = state.bookings.create(req, profile.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let actor = caller.actor()?;
    let booking = state.bookings.get(id).await?;
    if !actor.can_access(&booking) {
        // Same answer as a missing booking
        return Err(AppError::NotFoundError(format!("booking {} not found", id)));
    }
    Ok(Json(booking))
}

/// GET /v1/bookings/reference/{code}
/// The reference is what guests get by email, so knowing it is enough.
async fn get_booking_by_reference(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_by_reference(&code).await?))
}

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = match (caller.actor()?, query.schedule_id) {
        (Actor::Admin, Some(schedule_id)) => state.bookings.list_for_schedule(schedule_id).await?,
        (Actor::Customer(id), None) => state.bookings.list_for_customer(&id).await?,
        (Actor::Customer(_), Some(_)) => {
            return Err(AppError::AuthorizationError("Listing by schedule requires admin".to_string()))
        }
        _ => return Err(AppError::ValidationError("schedule_id is required".to_string())),
    };
    Ok(Json(bookings))
}

/// POST /v1/bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let actor = caller.actor()?;
    let booking = state.bookings.get(id).await?;
    if !actor.can_access(&booking) {
        return Err(AppError::AuthorizationError("Booking belongs to another customer".to_string()));
    }
    Ok(Json(state.bookings.confirm(id).await?))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> Result<Json<Booking>, AppError> {
    let actor = caller.actor()?;
    let reason = body.and_then(|Json(req)| req.reason);
    Ok(Json(state.bookings.cancel(id, &actor, reason).await?))
}

/// POST /v1/bookings/expire-pending
async fn expire_pending(State(state): State<AppState>) -> Result<Json<ExpireResponse>, AppError> {
    let expired = state.bookings.expire_pending().await?;
    Ok(Json(ExpireResponse {
        count: expired.len(),
        booking_ids: expired.into_iter().map(|b| b.id).collect(),
    }))
}
