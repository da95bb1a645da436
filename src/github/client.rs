// GitHub API HTTP client.
// Handles authentication, rate limiting, and request/response processing.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::{
    Client, Method, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde_json::Value;
use tracing::debug;

use crate::error::{OctodashError, Result};

use super::types::RateLimit;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Connection settings for [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Applied to every request; a timeout surfaces as [`OctodashError::Api`].
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: GITHUB_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// GitHub API client with authentication and rate limit tracking.
///
/// Requests use the server token unless a caller token is passed explicitly.
/// Every successful response body is parsed as JSON.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
    rate_limit: Mutex<RateLimit>,
}

impl GitHubClient {
    /// Create a new GitHub client with the given server token.
    pub fn new(token: &str, options: &ClientOptions) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(OctodashError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("octodash"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .build()
            .map_err(OctodashError::Api)?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    /// Get the most recently observed rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .map(|rl| rl.clone())
            .unwrap_or_default()
    }

    /// Make a GET request. `target` is a path with optional query string.
    pub async fn get(
        &self,
        target: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Value> {
        self.send(Method::GET, target, query, None, token).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post(&self, target: &str, body: &Value, token: Option<&str>) -> Result<Value> {
        self.send(Method::POST, target, &[], Some(body), token).await
    }

    async fn send(
        &self,
        method: Method,
        target: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, target);
        debug!(%method, %url, ?query, "github request");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token.unwrap_or(&self.token));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(OctodashError::Api)?;

        self.update_rate_limit(&response);
        let response = self.check_response(response).await?;
        let text = response.text().await.map_err(OctodashError::Api)?;

        serde_json::from_str(&text)
            .map_err(|e| OctodashError::Malformed(format!("{} returned invalid JSON: {}", target, e)))
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let header = |name: &str| -> Option<u64> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };

        let Ok(mut rate_limit) = self.rate_limit.lock() else {
            return;
        };
        if let Some(limit) = header("x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header("x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header("x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

        match status {
            StatusCode::UNAUTHORIZED => Err(OctodashError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(OctodashError::NotFound(url))
            }
            StatusCode::FORBIDDEN if exhausted => {
                let reset_at = chrono::DateTime::from_timestamp(self.rate_limit().reset as i64, 0)
                    .map(|dt| dt.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Err(OctodashError::RateLimited { reset_at })
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(OctodashError::Upstream {
                    status: status.as_u16(),
                    message: error_message(&text),
                })
            }
        }
    }
}

/// Pull the `message` out of a GitHub error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.to_string())
}
