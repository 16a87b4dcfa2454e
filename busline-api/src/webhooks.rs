use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use busline_core::PaymentSignal;
use busline_shared::Booking;

use crate::{error::AppError, state::AppState};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Gateway outcome for a booking: success confirms it, failure cancels it while still pending.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(signal): Json<PaymentSignal>,
) -> Result<Json<Booking>, AppError> {
    let presented = headers.get(WEBHOOK_SECRET_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(state.auth.webhook_secret.as_str()) || state.auth.webhook_secret.is_empty() {
        tracing::warn!(booking_id = %signal.booking_id(), "Rejected payment webhook with bad secret");
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }

    tracing::info!(booking_id = %signal.booking_id(), "Received payment webhook");
    let booking = state.bookings.handle_payment_signal(signal).await?;
    tracing::info!(booking_id = %booking.id, status = %booking.status, "Payment webhook applied");
    Ok(Json(booking))
}
