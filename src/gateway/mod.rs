pub mod broker;
pub mod proxy;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use axum::extract::{FromRequestParts, Request};
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::context::HEADER_REQUEST_ID;
use crate::error::ApiError;
use crate::token::{self, Claims};

use broker::Broker;
use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct GatewayState {
    pub cfg: Arc<Config>,
    pub broker: Arc<Broker>,
    pub limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
}

/// Verified bearer identity. Verification is purely local: the HMAC
/// signature and expiry are checked against the shared secret, never by
/// calling identity.
pub struct AuthUser {
    pub claims: Claims,
}

impl FromRequestParts<GatewayState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> Result<Self, Self::Rejection> {
        let claims = verify_bearer(parts, &state.cfg.jwt_secret)?;
        Ok(AuthUser { claims })
    }
}

pub fn verify_bearer(parts: &Parts, secret: &str) -> Result<Claims, ApiError> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    let bearer = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization format"))?;

    token::verify(bearer, secret).map_err(|_| ApiError::unauthorized("invalid or expired token"))
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({ "status": "ok", "service": "gateway" }))
}

/// Request-id stamping plus the access log, in one pass. The id is
/// propagated downstream and echoed back to the caller.
async fn stamp_and_log(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(HEADER_REQUEST_ID, value);
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(HEADER_REQUEST_ID, value);
    }
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        request_id = %request_id,
        "request"
    );
    response
}

pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/events", get(broker::event_stream))
        .route("/api/v1/events/broadcast", post(broker::broadcast))
        .fallback(proxy::proxy)
        .layer(cors)
        .layer(middleware::from_fn(stamp_and_log))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_default();

    let state = GatewayState {
        cfg: Arc::new(cfg.clone()),
        broker: Arc::new(Broker::new()),
        limiter: Arc::new(RateLimiter::new()),
        http,
    };
    let broker = state.broker.clone();

    let result = crate::serve::run("gateway", cfg.port, router(state)).await;

    // Close every SSE client before exit.
    broker.shutdown();
    result
}
