// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request composition, dispatch, and bounded retry.

use crate::envelope::UpstreamErrorBody;
use crate::proof::app_secret_proof;
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorCode, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// Production Graph API host.
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// HTTP methods the caller supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Idempotent read; parameters travel in the query string.
    Get,
    /// Mutation; parameters are form-encoded unless a JSON body is supplied.
    Post,
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded, deterministic retry settings.
///
/// Only idempotent methods retry, and only on transport errors or upstream
/// errors whose code marks them transient.  No jitter: the delay for attempt
/// `n` is `base_delay * n`, raised to the server's `Retry-After` when that
/// is larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base backoff unit.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let base = policy.base_delay * attempt;
    match retry_after {
        Some(server) if server > base => server,
        _ => base,
    }
}

// ---------------------------------------------------------------------------
// GraphRequest
// ---------------------------------------------------------------------------

/// One upstream request, before credential attachment.
#[derive(Debug, Clone)]
pub struct GraphRequest {
    /// HTTP method.
    pub method: Method,
    /// Graph version segment, e.g. `v25.0`.
    pub version: String,
    /// Path below the version segment, e.g. `debug_token` or `10152/feed`.
    pub path: String,
    /// Query (GET) or form (POST) parameters.
    pub params: BTreeMap<String, String>,
    /// Explicit JSON body; when set on a POST, `params` move to the query.
    pub json_body: Option<serde_json::Value>,
    /// Access token to attach as `access_token`.
    pub token: Option<String>,
    /// App secret; with a token present, adds `appsecret_proof`.
    pub app_secret: Option<String>,
}

impl GraphRequest {
    /// Start a GET request.
    pub fn get(version: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Get, version, path)
    }

    /// Start a POST request.
    pub fn post(version: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Post, version, path)
    }

    fn new(method: Method, version: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            version: version.into(),
            path: path.into(),
            params: BTreeMap::new(),
            json_body: None,
            token: None,
            app_secret: None,
        }
    }

    /// Add one parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Supply an explicit JSON body (POST only).
    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.json_body = Some(body);
        self
    }

    /// Attach an access token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach an app secret for proof computation.
    pub fn app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(secret.into());
        self
    }

    /// Final parameter map with credentials attached.
    ///
    /// The map is keyed, so the result carries exactly one `access_token`
    /// and exactly one `appsecret_proof` no matter what the caller put in
    /// `params`.
    fn authenticated_params(&self) -> Result<BTreeMap<String, String>> {
        let mut params = self.params.clone();
        if let Some(token) = &self.token {
            params.insert("access_token".to_string(), token.clone());
            if let Some(secret) = &self.app_secret {
                params.insert(
                    "appsecret_proof".to_string(),
                    app_secret_proof(token, secret)?,
                );
            }
        }
        Ok(params)
    }
}

// ---------------------------------------------------------------------------
// GraphClient
// ---------------------------------------------------------------------------

/// Single entry point for authenticated upstream requests.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl Default for GraphClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single send, before retry classification.
struct AttemptError {
    error: Error,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl GraphClient {
    /// Client against the production host with the default retry policy.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against an explicit host (tests point this at a mock server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Compose `<base>/<version>/<path>`, rejecting empty segments.
    fn compose_url(&self, version: &str, path: &str) -> Result<String> {
        if version.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "graph version must not be empty",
            ));
        }
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "request path must not be empty",
            ));
        }
        if trimmed.split('/').any(|seg| seg.is_empty()) {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                format!("request path '{path}' contains an empty segment"),
            ));
        }
        Ok(format!("{}/{}/{}", self.base_url, version.trim_matches('/'), trimmed))
    }

    /// Execute a request and JSON-decode the response body.
    ///
    /// Decode order follows the upstream contract: a body with a top-level
    /// `error` object becomes an upstream-api error regardless of status;
    /// then a non-2xx status becomes a transport error carrying the raw
    /// body; otherwise the body is parsed as JSON.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: &GraphRequest,
    ) -> Result<serde_json::Value> {
        let url = self.compose_url(&request.version, &request.path)?;
        let params = request.authenticated_params()?;

        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            match self.send_once(cancel, request, &url, &params).await {
                Ok(value) => return Ok(value),
                Err(outcome) => {
                    let may_retry = outcome.retryable
                        && request.method == Method::Get
                        && attempt < self.retry.max_attempts;
                    if !may_retry {
                        return Err(outcome.error);
                    }
                    let delay = backoff_delay(&self.retry, attempt, outcome.retry_after);
                    tracing::debug!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying transient upstream failure"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(cancelled()),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// [`execute`](Self::execute), then deserialize into `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        request: &GraphRequest,
    ) -> Result<T> {
        let value = self.execute(cancel, request).await?;
        serde_json::from_value(value).map_err(|e| {
            Error::new(
                ErrorCode::HttpTransport,
                "response body does not match the expected shape",
            )
            .with_source(e)
        })
    }

    async fn send_once(
        &self,
        cancel: &CancellationToken,
        request: &GraphRequest,
        url: &str,
        params: &BTreeMap<String, String>,
    ) -> std::result::Result<serde_json::Value, AttemptError> {
        let builder = match (request.method, &request.json_body) {
            (Method::Get, _) => self.http.get(url).query(params),
            (Method::Post, None) => self.http.post(url).form(params),
            (Method::Post, Some(body)) => self.http.post(url).query(params).json(body),
        };

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(AttemptError {
                    error: cancelled(),
                    retryable: false,
                    retry_after: None,
                });
            }
            sent = builder.send() => sent,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return Err(AttemptError {
                    error: Error::new(
                        ErrorCode::HttpTransport,
                        format!("request to {url} failed"),
                    )
                    .with_source(e),
                    retryable: true,
                    retry_after: None,
                });
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return Err(AttemptError {
                    error: Error::new(ErrorCode::HttpTransport, "failed to read response body")
                        .with_source(e),
                    retryable: true,
                    retry_after,
                });
            }
        };

        // Error envelope wins over status.
        if let Some(envelope) = UpstreamErrorBody::recognize(&body) {
            let retryable = envelope.is_transient();
            return Err(AttemptError {
                error: envelope.into_error(),
                retryable,
                retry_after,
            });
        }

        if !status.is_success() {
            return Err(AttemptError {
                error: Error::new(
                    ErrorCode::HttpTransport,
                    format!("upstream returned HTTP {status}"),
                )
                .with_context("status", status.as_u16())
                .with_context("body", body),
                retryable: true,
                retry_after,
            });
        }

        serde_json::from_str(&body).map_err(|e| AttemptError {
            error: Error::new(ErrorCode::HttpTransport, "response body is not valid JSON")
                .with_source(e),
            retryable: false,
            retry_after: None,
        })
    }
}

fn cancelled() -> Error {
    Error::new(ErrorCode::OperationCancelled, "operation cancelled by caller")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
