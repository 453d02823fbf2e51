// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream error envelope recognition.

use gg_error::{Error, ErrorCode};
use serde::{Deserialize, Serialize};

/// The `error` object the Graph API wraps failures in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamErrorBody {
    /// Top-level error code (e.g. `4` for application-level throttling).
    #[serde(default)]
    pub code: i64,
    /// Finer-grained subcode, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_subcode: Option<i64>,
    /// Opaque trace id for support escalation.
    #[serde(default)]
    pub fbtrace_id: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: UpstreamErrorBody,
}

/// Upstream codes that mark an error as transient (rate limiting).
const TRANSIENT_CODES: &[i64] = &[4, 17, 32, 613];

impl UpstreamErrorBody {
    /// Try to recognize an error envelope in a raw response body.
    ///
    /// Returns `None` when the body is not JSON or carries no top-level
    /// `error` object; the caller then falls back to status-code handling.
    pub fn recognize(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorWrapper>(body).ok().map(|w| w.error)
    }

    /// Whether a bounded retry is permitted for this error.
    pub fn is_transient(&self) -> bool {
        TRANSIENT_CODES.contains(&self.code)
            || self
                .error_subcode
                .is_some_and(|sub| TRANSIENT_CODES.contains(&sub))
    }

    /// Convert into the workspace error, carrying all four envelope fields.
    pub fn into_error(self) -> Error {
        let message = if self.message.is_empty() {
            "upstream API error".to_string()
        } else {
            self.message.clone()
        };
        Error::new(ErrorCode::UpstreamError, message)
            .with_context("code", self.code)
            .with_context("error_subcode", self.error_subcode)
            .with_context("fbtrace_id", self.fbtrace_id)
            .with_context("message", self.message)
    }
}
