// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot loopback listener for the OAuth redirect.
//!
//! The listener binds on construction, serves a single GET handler on the
//! callback path, and rendezvouses with the waiting flow through a
//! single-slot channel. Exactly one resolution is ever delivered; requests
//! arriving after resolution still get an HTTP answer but cannot reopen the
//! slot. Every terminal path of [`CallbackListener::wait`] shuts the server
//! down exactly once.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorCode, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use url::Url;

/// How the callback request resolved.
#[derive(Debug)]
enum Outcome {
    Success(String),
    ProviderError(String),
    StateMismatch,
    CodeMissing,
}

#[derive(Clone)]
struct HandlerState {
    expected_state: String,
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

/// A bound, serving OAuth callback listener.
pub struct CallbackListener {
    local_url: String,
    resolution: oneshot::Receiver<Outcome>,
    shutdown: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<()>,
}

impl CallbackListener {
    /// Validate `redirect_uri`, bind the loopback listener, and start serving.
    ///
    /// The URI must use `http`, host `localhost` or `127.0.0.1`, and an
    /// explicit port; port `0` asks the OS for an ephemeral port, and
    /// [`local_url`](Self::local_url) reports the URI with the actual port
    /// substituted.
    pub async fn bind(redirect_uri: &str, expected_state: &str) -> Result<Self> {
        let (host, port, path) = validate_redirect(redirect_uri)?;

        let listener = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| {
                Error::new(
                    ErrorCode::Io,
                    format!("failed to bind callback listener on {host}:{port}"),
                )
                .with_source(e)
            })?;
        let actual_port = listener
            .local_addr()
            .map_err(|e| {
                Error::new(ErrorCode::Io, "failed to read callback listener address")
                    .with_source(e)
            })?
            .port();
        let local_url = format!("http://{host}:{actual_port}{path}");

        let (resolve_tx, resolve_rx) = oneshot::channel();
        let state = HandlerState {
            expected_state: expected_state.to_string(),
            slot: Arc::new(Mutex::new(Some(resolve_tx))),
        };
        let app = Router::new()
            .route(&path, get(handle_callback))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::warn!(error = %e, "callback server terminated abnormally");
            }
        });

        tracing::debug!(url = %local_url, "callback listener bound");
        Ok(Self {
            local_url,
            resolution: resolve_rx,
            shutdown: shutdown_tx,
            server,
        })
    }

    /// The callback URL with the actual bound port substituted.
    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    /// Await the first resolution, the caller's cancellation, or the timeout.
    ///
    /// Consumes the listener; the server is shut down on every path.
    pub async fn wait(self, cancel: &CancellationToken, timeout: Duration) -> Result<String> {
        if timeout.is_zero() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "callback wait timeout must be greater than zero",
            ));
        }
        let Self {
            resolution,
            shutdown,
            server,
            ..
        } = self;

        let outcome = tokio::select! {
            resolved = resolution => match resolved {
                Ok(outcome) => outcome_to_result(outcome),
                // The serving task dropped the slot without resolving.
                Err(_) => Err(Error::new(
                    ErrorCode::Io,
                    "callback server stopped before a resolution arrived",
                )),
            },
            () = cancel.cancelled() => Err(Error::new(
                ErrorCode::OperationCancelled,
                "callback wait cancelled by caller",
            )),
            () = tokio::time::sleep(timeout) => Err(Error::new(
                ErrorCode::ListenerTimeout,
                format!(
                    "no OAuth callback arrived within {} ms",
                    timeout.as_millis()
                ),
            )),
        };

        // Single shutdown for every terminal state.
        let _ = shutdown.send(());
        if tokio::time::timeout(Duration::from_secs(2), server).await.is_err() {
            tracing::warn!("callback server did not shut down in time");
        }
        outcome
    }
}

fn outcome_to_result(outcome: Outcome) -> Result<String> {
    match outcome {
        Outcome::Success(code) => Ok(code),
        Outcome::ProviderError(detail) => Err(Error::new(
            ErrorCode::ProviderError,
            format!("authorization provider returned an error: {detail}"),
        )),
        Outcome::StateMismatch => Err(Error::new(
            ErrorCode::StateMismatch,
            "callback state parameter does not match the expected state",
        )),
        Outcome::CodeMissing => Err(Error::new(
            ErrorCode::CodeMissing,
            "callback carried no authorization code",
        )),
    }
}

/// `(host, port, path)` from a validated loopback redirect URI.
fn validate_redirect(redirect_uri: &str) -> Result<(String, u16, String)> {
    let malformed = |why: &str| {
        Error::new(
            ErrorCode::MalformedRedirect,
            format!("invalid redirect URI '{redirect_uri}': {why}"),
        )
    };

    if redirect_uri.trim().is_empty() {
        return Err(malformed("URI must not be empty"));
    }
    let url = Url::parse(redirect_uri).map_err(|_| malformed("not a valid URL"))?;
    if url.scheme() != "http" {
        return Err(malformed("scheme must be http"));
    }
    match url.host_str() {
        Some("localhost") | Some("127.0.0.1") => {}
        _ => return Err(malformed("host must be localhost or 127.0.0.1")),
    }
    let port = url.port().ok_or_else(|| malformed("port must be explicit"))?;
    let path = if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    };
    Ok((url.host_str().unwrap_or_default().to_string(), port, path))
}

fn state_matches(received: Option<&String>, expected: &str) -> bool {
    let received = received.map(String::as_bytes).unwrap_or_default();
    received.ct_eq(expected.as_bytes()).into()
}

async fn handle_callback(
    State(state): State<HandlerState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let (status, body, outcome) = if let Some(detail) = params.get("error") {
        (
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {detail}"),
            Outcome::ProviderError(detail.clone()),
        )
    } else if !state_matches(params.get("state"), &state.expected_state) {
        (
            StatusCode::BAD_REQUEST,
            "State parameter mismatch.".to_string(),
            Outcome::StateMismatch,
        )
    } else {
        match params.get("code").filter(|c| !c.is_empty()) {
            None => (
                StatusCode::BAD_REQUEST,
                "Missing authorization code.".to_string(),
                Outcome::CodeMissing,
            ),
            Some(code) => (
                StatusCode::OK,
                "Authentication complete. You can close this window.".to_string(),
                Outcome::Success(code.clone()),
            ),
        }
    };

    // First resolution wins; later requests only get the HTTP answer.
    if let Some(tx) = state.slot.lock().expect("callback slot lock").take() {
        let _ = tx.send(outcome);
    }
    (status, body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
