use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busline_order::BookingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    /// Seat conflicts carry the seats so clients can re-render the seat map
    #[error("Seats unavailable")]
    SeatConflict(Vec<u32>),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::SeatConflict(seats) => {
                let body = Json(json!({
                    "error": "Seats unavailable",
                    "seats": seats,
                }));
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::SeatConflict { seats } => AppError::SeatConflict(seats),
            BookingError::ScheduleUnavailable(msg) => AppError::AuthorizationError(format!("Schedule unavailable: {}", msg)),
            BookingError::Unauthorized => AppError::AuthenticationError("Authentication required".to_string()),
            BookingError::Forbidden(msg) => AppError::AuthorizationError(msg),
            BookingError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            e @ (BookingError::AlreadyInState(_) | BookingError::InvalidTransition { .. }) => {
                AppError::ConflictError(e.to_string())
            }
            BookingError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}
