// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debug-token introspection payloads and normalization.

use chrono::{DateTime, TimeZone, Utc};
use gg_error::{Error, ErrorCode, Result};
use gg_graph::JsonScalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw `/debug_token` response: a `data` object whose field shapes drift
/// across Graph versions, preserved as dynamic JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugTokenResponse {
    /// The introspection payload.
    pub data: serde_json::Value,
}

/// Normalized introspection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Whether the upstream considers the token valid.
    pub is_valid: bool,
    /// Granted scopes, sorted and de-duplicated.
    pub scopes: Vec<String>,
    /// Expiry instant; `None` when the upstream reports zero (never expires).
    pub expires_at: Option<DateTime<Utc>>,
}

/// Normalize a debug-token response into [`TokenMetadata`].
///
/// Rejects responses whose `is_valid` is not a boolean, or whose `scopes`
/// is present but not an array of non-blank strings. A zero `expires_at`
/// maps to `None`.
pub fn normalize_debug_metadata(response: &DebugTokenResponse) -> Result<TokenMetadata> {
    let data = response.data.as_object().ok_or_else(|| {
        Error::new(
            ErrorCode::DebugResponseInvalid,
            "debug_token response has no data object",
        )
    })?;

    let is_valid = data
        .get("is_valid")
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| {
            Error::new(
                ErrorCode::DebugResponseInvalid,
                "debug_token response is_valid is not a boolean",
            )
        })?;

    let scopes = match data.get("scopes") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(value) => {
            let entries = value.as_array().ok_or_else(|| {
                Error::new(
                    ErrorCode::DebugResponseInvalid,
                    "debug_token scopes is not an array",
                )
            })?;
            let mut set = BTreeSet::new();
            for entry in entries {
                let scope = entry.as_str().ok_or_else(|| {
                    Error::new(
                        ErrorCode::DebugResponseInvalid,
                        "debug_token scopes contains a non-string entry",
                    )
                })?;
                if scope.trim().is_empty() {
                    return Err(Error::new(
                        ErrorCode::DebugResponseInvalid,
                        "debug_token scopes contains a blank entry",
                    ));
                }
                set.insert(scope.to_string());
            }
            set.into_iter().collect()
        }
    };

    let expires_at = match data.get("expires_at") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => {
            let scalar: JsonScalar = serde_json::from_value(value.clone()).map_err(|e| {
                Error::new(
                    ErrorCode::DebugResponseInvalid,
                    "debug_token expires_at has an unusable shape",
                )
                .with_source(e)
            })?;
            let seconds = scalar.as_seconds()?;
            if seconds == 0 {
                None
            } else {
                Some(Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
                    Error::new(
                        ErrorCode::DebugResponseInvalid,
                        format!("debug_token expires_at {seconds} is out of range"),
                    )
                })?)
            }
        }
    };

    Ok(TokenMetadata {
        is_valid,
        scopes,
        expires_at,
    })
}

impl TokenMetadata {
    /// Rebuild the debug-token shape this metadata normalizes from.
    ///
    /// Exists so the normalize-is-idempotent law is checkable: normalizing
    /// the envelope of a normalized result yields the same metadata.
    pub fn to_envelope(&self) -> DebugTokenResponse {
        let expires = self
            .expires_at
            .map(|t| t.timestamp())
            .unwrap_or_default();
        DebugTokenResponse {
            data: serde_json::json!({
                "is_valid": self.is_valid,
                "scopes": self.scopes,
                "expires_at": expires,
            }),
        }
    }
}
