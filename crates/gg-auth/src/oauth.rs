// SPDX-License-Identifier: MIT OR Apache-2.0

//! PKCE material, state generation, and authorization URL composition.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gg_error::{Error, ErrorCode, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use url::Url;

/// Host serving the interactive OAuth dialog.
pub const DEFAULT_DIALOG_HOST: &str = "https://www.facebook.com";

/// Number of random bytes behind a fresh verifier.
const VERIFIER_BYTES: usize = 64;

/// Number of random bytes behind a fresh state value.
const STATE_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// PKCE
// ---------------------------------------------------------------------------

/// A PKCE verifier/challenge pair.
///
/// The verifier is `BASE64URL(64 random bytes)` without padding; the
/// challenge is `BASE64URL(SHA256(verifier))` over the verifier's ASCII
/// bytes, per RFC 7636 S256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    /// Secret half, sent only on the code exchange.
    pub verifier: String,
    /// Public half, embedded in the authorization URL.
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut raw = [0u8; VERIFIER_BYTES];
        OsRng.fill_bytes(&mut raw);
        let verifier = URL_SAFE_NO_PAD.encode(raw);
        let challenge = pkce_challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// The S256 challenge for a given verifier string.
pub fn pkce_challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// 32 CSPRNG bytes as unpadded base64url; used as the OAuth `state`.
pub fn generate_oauth_state() -> String {
    let mut raw = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

// ---------------------------------------------------------------------------
// Authorization URL
// ---------------------------------------------------------------------------

/// Legacy variant without a `state` parameter.
///
/// The interactive flow never uses this; it exists for scripted callers
/// that manage CSRF protection themselves.
pub fn build_oauth_url(
    app_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    challenge: &str,
    version: &str,
) -> Result<String> {
    compose_dialog_url(app_id, redirect_uri, scopes, challenge, None, version)
}

/// Authorization URL with a mandatory `state`.
pub fn build_oauth_url_with_state(
    app_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    challenge: &str,
    state: &str,
    version: &str,
) -> Result<String> {
    if state.is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            "oauth state must not be empty",
        ));
    }
    compose_dialog_url(app_id, redirect_uri, scopes, challenge, Some(state), version)
}

fn compose_dialog_url(
    app_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    challenge: &str,
    state: Option<&str>,
    version: &str,
) -> Result<String> {
    for (name, value) in [
        ("app id", app_id),
        ("redirect URI", redirect_uri),
        ("code challenge", challenge),
        ("graph version", version),
    ] {
        if value.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                format!("{name} must not be empty"),
            ));
        }
    }
    if scopes.iter().any(|s| s.trim().is_empty()) {
        return Err(Error::new(
            ErrorCode::BlankScope,
            "scope entries must not be blank",
        ));
    }

    let mut url = Url::parse(&format!("{DEFAULT_DIALOG_HOST}/{version}/dialog/oauth"))
        .map_err(|e| {
            Error::new(ErrorCode::InvalidArgument, "failed to compose dialog URL").with_source(e)
        })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", app_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("response_type", "code");
        query.append_pair("code_challenge", challenge);
        query.append_pair("code_challenge_method", "S256");
        if !scopes.is_empty() {
            query.append_pair("scope", &scopes.join(","));
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
