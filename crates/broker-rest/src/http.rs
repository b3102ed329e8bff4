//! Rate-limited, authenticated HTTP layer.

use broker_core::{BrokerError, RateLimitConfig, RateLimiter};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client with the broker's rate limits enforced before every call.
pub struct HttpClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl HttpClient {
    /// Client for the given base URL.
    pub fn new(base_url: &str, limits: RateLimitConfig) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(limits),
        })
    }

    /// GET returning a decoded JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        auth_header: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::GET, path, query, None, auth_header)
            .await
    }

    /// POST with a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        auth_header: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::POST, path, None, Some(body), auth_header)
            .await
    }

    /// PATCH with a JSON body.
    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        auth_header: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::PATCH, path, None, Some(body), auth_header)
            .await
    }

    /// DELETE with an optional JSON body.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        auth_header: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.request(Method::DELETE, path, None, body, auth_header)
            .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<serde_json::Value>,
        auth_header: Option<&str>,
    ) -> Result<T, BrokerError> {
        self.limiter
            .try_acquire(chrono::Utc::now().timestamp_millis())?;

        let url = build_url(&self.base_url, path, query);
        debug!(%url, method = %method, "broker request");

        let mut request = self.client.request(method, &url);
        if let Some(header) = auth_header {
            request = request.header("Authorization", header);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        decode_response(response).await
    }
}

fn build_url(base: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
        _ => format!("{base}{path}"),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BrokerError {
    if err.is_timeout() {
        BrokerError::Timeout
    } else if err.is_connect() {
        BrokerError::Transport(err.to_string())
    } else if err.is_decode() {
        BrokerError::Parse(err.to_string())
    } else {
        BrokerError::Transport(err.to_string())
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, BrokerError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BrokerError::AuthExpired);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1_000)
            .unwrap_or(60_000);
        return Err(BrokerError::RateLimited { retry_after_ms });
    }
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(BrokerError::Upstream(format!("{status}: {body}")));
    }

    let body = response.text().await.map_err(map_reqwest_error)?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(error = %e, "failed to decode broker response");
        BrokerError::Parse(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        assert_eq!(
            build_url("https://api.example.in", "/data/quotes", Some("symbols=NSE:TCS-EQ")),
            "https://api.example.in/data/quotes?symbols=NSE:TCS-EQ"
        );
        assert_eq!(
            build_url("https://api.example.in", "/api/v3/profile", None),
            "https://api.example.in/api/v3/profile"
        );
        assert_eq!(
            build_url("https://api.example.in", "/x", Some("")),
            "https://api.example.in/x"
        );
    }
}
