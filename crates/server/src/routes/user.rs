//! Caller profile and token status

use axum::{Extension, Json, http::HeaderMap};
use chrono::Utc;
use serde::Serialize;

use crate::middleware::Identity;
use crate::middleware::auth::authenticate;

#[derive(Serialize)]
pub struct UserInfo {
    name: Option<String>,
    email: Option<String>,
}

/// GET /user_info - Profile fields from the token claims
pub async fn user_info(Extension(identity): Extension<Identity>) -> Json<UserInfo> {
    Json(UserInfo {
        name: identity.name().map(str::to_string),
        email: identity.email().map(str::to_string),
    })
}

#[derive(Debug, Serialize)]
pub struct TokenStatus {
    valid: bool,
    /// Seconds left before the token expires
    expires_in: f64,
}

/// GET /validate_token - Whether the request carries a usable token.
///
/// Never fails; an invalid token is reported in the body.
pub async fn validate_token(headers: HeaderMap) -> Json<TokenStatus> {
    let status = match authenticate(&headers) {
        Ok(identity) => TokenStatus {
            valid: true,
            // Tokens without `exp` never expire
            expires_in: identity.expires_in(Utc::now()).unwrap_or(f64::MAX),
        },
        Err(_) => TokenStatus {
            valid: false,
            expires_in: 0.0,
        },
    };
    Json(status)
}
