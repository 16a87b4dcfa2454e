use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::{Claims, ROLE_GUEST}, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    session_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/guest", post(login_guest))
}

/// POST /v1/auth/guest
/// Anonymous checkout token. The subject doubles as the seat lock session id.
async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let session_id = format!("guest-{}", Uuid::new_v4());
    let claims = Claims {
        sub: session_id.clone(),
        email: None,
        name: None,
        role: ROLE_GUEST.to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    Ok(Json(AuthResponse { token, session_id }))
}
