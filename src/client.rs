use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ErrorBody};

/// Upper bound on any inter-service response body. A broken or malicious
/// peer must not be able to balloon this process.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// JSON client for one backend service. Enforces the body cap and
/// transcribes upstream failure envelopes into local `ApiError`s without
/// leaking which backend produced them.
#[derive(Clone)]
pub struct ServiceClient {
    base: String,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        ServiceClient {
            base: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(|_| ApiError::unavailable("upstream service unreachable"))?;
        handle(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await
            .map_err(|_| ApiError::unavailable("upstream service unreachable"))?;
        handle(response).await
    }
}

async fn handle<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ApiError> {
    let status = response.status();
    let bytes = read_bounded(response).await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::internal(format!("decoding upstream response: {e}")));
    }

    if status.is_server_error() {
        return Err(ApiError::unavailable("upstream service failed"));
    }

    Err(transcribe(&bytes))
}

/// Read a response body, aborting past `MAX_RESPONSE_BYTES`.
pub async fn read_bounded(response: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    use tokio_stream::StreamExt;

    let mut body = Vec::new();
    let mut stream = std::pin::pin!(response.bytes_stream());
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|_| ApiError::bad_gateway("error reading upstream response"))?;
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(ApiError::bad_gateway("upstream response too large"));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn transcribe(bytes: &[u8]) -> ApiError {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => ApiError::from_envelope(body.error),
        Err(_) => ApiError::bad_gateway("unintelligible upstream failure"),
    }
}
