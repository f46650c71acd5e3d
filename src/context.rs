use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_EMAIL: &str = "x-user-email";
pub const HEADER_REQUEST_ID: &str = "x-request-id";
pub const HEADER_INTERNAL_TOKEN: &str = "x-internal-token";

/// Caller identity as injected by the gateway after token verification.
/// Backend services read these headers instead of re-verifying the JWT.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub email: Option<String>,
    pub request_id: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for UserContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, HEADER_USER_ID)
            .ok_or_else(|| ApiError::unauthorized("missing user context"))?;

        Ok(UserContext {
            user_id,
            email: header_value(parts, HEADER_USER_EMAIL),
            request_id: header_value(parts, HEADER_REQUEST_ID),
        })
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
