use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use busline_order::{Actor, CustomerProfile};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_GUEST: &str = "GUEST";
pub const ROLE_CUSTOMER: &str = "CUSTOMER";
pub const ROLE_ADMIN: &str = "ADMIN";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub role: String,
    pub exp: usize,
}

/// Identity attached to every request by `optional_auth_middleware`
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Authenticated(Claims),
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Authenticated(c) if c.role == ROLE_ADMIN)
    }

    /// Account holder placing a booking. Guests book without one.
    pub fn customer_profile(&self) -> Option<CustomerProfile> {
        match self {
            Caller::Authenticated(c) if c.role == ROLE_CUSTOMER => Some(CustomerProfile {
                id: c.sub.clone(),
                name: c.name.clone(),
                email: c.email.clone(),
            }),
            _ => None,
        }
    }

    /// Actor for ownership checks; anonymous callers are rejected
    pub fn actor(&self) -> Result<Actor, AppError> {
        match self {
            Caller::Anonymous => Err(AppError::AuthenticationError("Authentication required".to_string())),
            Caller::Authenticated(c) if c.role == ROLE_ADMIN => Ok(Actor::Admin),
            Caller::Authenticated(c) => Ok(Actor::Customer(c.sub.clone())),
        }
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

// ============================================================================
// Optional Authentication Middleware
// ============================================================================

/// No header means anonymous; a header that does not verify is rejected.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let caller = match bearer_token(&req) {
        None => Caller::Anonymous,
        Some(token) => {
            let token_data = decode::<Claims>(
                token,
                &DecodingKey::from_secret(state.auth.secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
            Caller::Authenticated(token_data.claims)
        }
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

/// Runs inside `optional_auth_middleware`, which has already verified the token.
pub async fn admin_auth_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<Caller>() {
        Some(caller) if caller.is_admin() => Ok(next.run(req).await),
        Some(Caller::Authenticated(_)) => Err(StatusCode::FORBIDDEN),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
