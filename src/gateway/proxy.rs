use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::json;

use crate::client;
use crate::config::Config;
use crate::context::{HEADER_REQUEST_ID, HEADER_USER_EMAIL, HEADER_USER_ID};
use crate::error::ApiError;
use crate::gateway::rate_limit::RouteClass;

use super::{GatewayState, verify_bearer};

/// Endpoints reachable without a bearer token.
const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/identity/auth/register",
    "/api/v1/identity/auth/login",
    "/health",
];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Map the segment after `/api/v1/` to a backend base URL.
pub fn backend_for<'a>(cfg: &'a Config, path: &str) -> Option<&'a str> {
    let rest = path.strip_prefix("/api/v1/")?;
    let segment = rest.split('/').next()?;
    match segment {
        "identity" | "rbac" => Some(&cfg.identity_url),
        "ledger" => Some(&cfg.ledger_url),
        "wallet" | "wallets" => Some(&cfg.wallet_url),
        "transaction" | "transactions" => Some(&cfg.transaction_url),
        "risk" => Some(&cfg.risk_url),
        "notification" | "notifications" => Some(&cfg.notification_url),
        _ => None,
    }
}

/// Fine-grained permission requirements beyond plain authentication.
fn required_permission(path: &str) -> Option<&'static str> {
    if path.starts_with("/api/v1/transactions/") && path.ends_with("/reverse") {
        return Some("transactions:reverse");
    }
    None
}

/// The reverse proxy: classify, throttle, authenticate, inject identity
/// headers, forward, and relay the backend's response untouched.
pub async fn proxy(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/api/v1/") {
        return Err(ApiError::not_found("no such route"));
    }

    let backend = backend_for(&state.cfg, &path)
        .ok_or_else(|| ApiError::not_found("no service for this path"))?
        .to_string();

    let class = RouteClass::classify(req.method(), &path);
    state
        .limiter
        .check(&addr.ip().to_string(), class)
        .await
        .map_err(ApiError::rate_limited)?;

    let mut identity_headers: Vec<(&str, String)> = Vec::new();
    if !is_public(&path) {
        let (parts, body) = req.into_parts();
        let claims = verify_bearer(&parts, &state.cfg.jwt_secret)?;

        if let Some(required) = required_permission(&path)
            && !claims.has_permission(required)
        {
            return Err(ApiError::forbidden("missing required permission")
                .with_details(json!({ "required_permission": required })));
        }

        identity_headers.push((HEADER_USER_ID, claims.sub.clone()));
        identity_headers.push((HEADER_USER_EMAIL, claims.email.clone()));
        return forward(&state, &backend, Request::from_parts(parts, body), identity_headers).await;
    }

    forward(&state, &backend, req, identity_headers).await
}

async fn forward(
    state: &GatewayState,
    backend: &str,
    req: Request,
    identity_headers: Vec<(&str, String)>,
) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| ApiError::bad_request("unsupported method"))?;
    let query = parts
        .uri
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let url = format!("{backend}{}{query}", parts.uri.path());

    let bytes = axum::body::to_bytes(body, client::MAX_RESPONSE_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("request body too large"))?;

    let mut builder = state.http.request(method, url).body(bytes.to_vec());
    for name in [CONTENT_TYPE.as_str(), HEADER_REQUEST_ID] {
        if let Some(value) = parts.headers.get(name).and_then(|v| v.to_str().ok()) {
            builder = builder.header(name, value);
        }
    }
    for (name, value) in identity_headers {
        builder = builder.header(name, value);
    }

    let upstream = builder
        .send()
        .await
        .map_err(|_| ApiError::bad_gateway("backend unreachable"))?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let body = client::read_bounded(upstream).await?;

    let mut response = Response::builder().status(status);
    if let Some(ct) = content_type
        && let Ok(value) = HeaderValue::from_str(&ct)
    {
        response = response.header(CONTENT_TYPE, value);
    }
    response
        .body(Body::from(body))
        .map_err(|e| ApiError::internal(format!("building response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Service, SimConfig};

    fn cfg() -> Config {
        Config {
            service: Service::Gateway,
            port: 8080,
            data_dir: "./data".into(),
            database_url: None,
            jwt_secret: "secret".into(),
            internal_token: "secret".into(),
            gateway_url: "http://gw".into(),
            identity_url: "http://identity".into(),
            ledger_url: "http://ledger".into(),
            wallet_url: "http://wallet".into(),
            transaction_url: "http://txn".into(),
            risk_url: "http://risk".into(),
            notification_url: "http://notify".into(),
            risk_fail_closed: false,
            sim: SimConfig {
                demo: true,
                delivery_delay_ms: 0,
                final_delay_ms: 0,
                failure_rate_percent: 0,
                max_retry_attempts: 0,
                retry_delay_ms: 0,
            },
        }
    }

    #[test]
    fn path_segments_map_to_backends() {
        let cfg = cfg();
        assert_eq!(backend_for(&cfg, "/api/v1/wallets"), Some("http://wallet"));
        assert_eq!(
            backend_for(&cfg, "/api/v1/transactions/transfer"),
            Some("http://txn")
        );
        assert_eq!(
            backend_for(&cfg, "/api/v1/identity/auth/login"),
            Some("http://identity")
        );
        assert_eq!(backend_for(&cfg, "/api/v1/rbac/roles"), Some("http://identity"));
        assert_eq!(backend_for(&cfg, "/api/v1/unknown/x"), None);
        assert_eq!(backend_for(&cfg, "/other"), None);
    }

    #[test]
    fn only_the_allow_list_is_public() {
        assert!(is_public("/api/v1/identity/auth/register"));
        assert!(is_public("/api/v1/identity/auth/login"));
        assert!(is_public("/health"));
        assert!(!is_public("/api/v1/wallets"));
        assert!(!is_public("/api/v1/identity/auth/login2"));
    }

    #[test]
    fn reverse_routes_need_a_permission() {
        assert_eq!(
            required_permission("/api/v1/transactions/abc/reverse"),
            Some("transactions:reverse")
        );
        assert_eq!(required_permission("/api/v1/transactions/transfer"), None);
    }
}
