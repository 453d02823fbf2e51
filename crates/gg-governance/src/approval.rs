// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed ephemeral approval tokens for high-risk commands.
//!
//! Request and grant tokens are bearer artifacts: an unpadded base64url
//! JSON payload plus an HMAC-SHA256 signature keyed by a config-level
//! secret, verified in constant time. Grants embed the request they answer;
//! acceptance requires an `approved` decision, an unexpired grant, an exact
//! context match, and a never-before-seen nonce.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gg_error::{Error, ErrorCode, Result};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// An approver's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// The command may proceed.
    Approved,
    /// The command is refused.
    Rejected,
}

/// The payload of a request token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Principal asking to run the command.
    pub principal: String,
    /// Command reference, e.g. `auth rotate`.
    pub command: String,
    /// Org name the command targets.
    pub org: String,
    /// Workspace name the command targets.
    pub workspace: String,
    /// Mint instant.
    pub issued_at: DateTime<Utc>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Unique nonce.
    pub nonce: String,
}

/// The payload of a grant token: the request it answers plus the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGrant {
    /// The embedded request.
    pub request: ApprovalRequest,
    /// Principal who decided.
    pub approver: String,
    /// The verdict.
    pub decision: ApprovalDecision,
    /// Mint instant.
    pub issued_at: DateTime<Utc>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Unique nonce, tracked for replay.
    pub nonce: String,
}

// ---------------------------------------------------------------------------
// Replay storage
// ---------------------------------------------------------------------------

/// Pluggable nonce-uniqueness tracking across the lifetime of grants.
pub trait ReplayStore: Send + Sync {
    /// Register a nonce, failing if it was ever registered before.
    fn register(&self, nonce: &str) -> Result<()>;
}

/// In-memory [`ReplayStore`]; sufficient for a single-process CLI.
#[derive(Debug, Default)]
pub struct MemoryReplayStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryReplayStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayStore for MemoryReplayStore {
    fn register(&self, nonce: &str) -> Result<()> {
        let mut seen = self.seen.lock().expect("replay store lock");
        if !seen.insert(nonce.to_string()) {
            return Err(Error::new(
                ErrorCode::ApprovalInvalid,
                "approval grant nonce was already used",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TokenSigner
// ---------------------------------------------------------------------------

/// Mints and verifies approval tokens with a shared HMAC key.
#[derive(Debug)]
pub struct TokenSigner {
    key: Vec<u8>,
    max_ttl: ChronoDuration,
}

impl TokenSigner {
    /// Signer with a non-empty key and a cap on token lifetimes.
    pub fn new(key: impl AsRef<[u8]>, max_ttl: Duration) -> Result<Self> {
        let key = key.as_ref().to_vec();
        if key.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "approval signing key must not be empty",
            ));
        }
        let max_ttl = ChronoDuration::from_std(max_ttl).map_err(|e| {
            Error::new(ErrorCode::InvalidArgument, "approval max TTL out of range")
                .with_source(e)
        })?;
        if max_ttl <= ChronoDuration::zero() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "approval max TTL must be greater than zero",
            ));
        }
        Ok(Self { key, max_ttl })
    }

    /// Mint a signed request token.
    pub fn mint_request(
        &self,
        principal: &str,
        command: &str,
        org: &str,
        workspace: &str,
        ttl: Duration,
    ) -> Result<String> {
        for (name, value) in [
            ("principal", principal),
            ("command", command),
            ("org", org),
            ("workspace", workspace),
        ] {
            if value.trim().is_empty() {
                return Err(Error::new(
                    ErrorCode::InvalidArgument,
                    format!("approval request {name} must not be empty"),
                ));
            }
        }
        let ttl = self.bounded_ttl(ttl)?;
        let now = Utc::now();
        let request = ApprovalRequest {
            principal: principal.to_string(),
            command: command.to_string(),
            org: org.to_string(),
            workspace: workspace.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            nonce: Uuid::new_v4().to_string(),
        };
        self.encode(&request)
    }

    /// Verify a request token's signature and parse its payload.
    pub fn verify_request(&self, token: &str) -> Result<ApprovalRequest> {
        self.decode(token)
    }

    /// Answer a request token with a signed grant.
    ///
    /// The request must verify and must not itself be expired.
    pub fn mint_grant(
        &self,
        request_token: &str,
        approver: &str,
        decision: ApprovalDecision,
        ttl: Duration,
    ) -> Result<String> {
        if approver.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "approver must not be empty",
            ));
        }
        let request = self.verify_request(request_token)?;
        let now = Utc::now();
        if request.expires_at <= now {
            return Err(Error::new(
                ErrorCode::ApprovalExpired,
                "approval request has already expired",
            ));
        }
        let ttl = self.bounded_ttl(ttl)?;
        let grant = ApprovalGrant {
            request,
            approver: approver.to_string(),
            decision,
            issued_at: now,
            expires_at: now + ttl,
            nonce: Uuid::new_v4().to_string(),
        };
        self.encode(&grant)
    }

    /// Verify a grant token's signature and parse its payload.
    ///
    /// Acceptance checks (decision, expiry, context match, nonce replay)
    /// are the pipeline's concern; this only authenticates.
    pub fn verify_grant(&self, token: &str) -> Result<ApprovalGrant> {
        self.decode(token)
    }

    fn bounded_ttl(&self, ttl: Duration) -> Result<ChronoDuration> {
        let ttl = ChronoDuration::from_std(ttl).map_err(|e| {
            Error::new(ErrorCode::InvalidArgument, "approval TTL out of range").with_source(e)
        })?;
        if ttl <= ChronoDuration::zero() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "approval TTL must be greater than zero",
            ));
        }
        if ttl > self.max_ttl {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                format!(
                    "approval TTL {}s exceeds the configured maximum {}s",
                    ttl.num_seconds(),
                    self.max_ttl.num_seconds()
                ),
            ));
        }
        Ok(ttl)
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(payload);
        mac
    }

    fn encode<T: Serialize>(&self, payload: &T) -> Result<String> {
        let bytes = serde_json::to_vec(payload).map_err(|e| {
            Error::new(ErrorCode::ApprovalInvalid, "failed to serialize approval payload")
                .with_source(e)
        })?;
        let signature = self.mac(&bytes).finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&bytes),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let invalid = || Error::new(ErrorCode::ApprovalInvalid, "approval token is not valid");

        let (payload_b64, signature_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid())?;

        // Mac::verify_slice is constant-time.
        self.mac(&payload)
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        serde_json::from_slice(&payload).map_err(|_| invalid())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
