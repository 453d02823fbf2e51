// SPDX-License-Identifier: MIT OR Apache-2.0

//! Namespaced secret references and keychain-backed secret storage.
//!
//! Tokens and app secrets never live in the profile config file; profiles
//! hold opaque references of the form `keychain://<service>/<profile>/<kind>`
//! and the actual material lives behind a [`SecretStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gg_error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// URI scheme every secret reference must carry.
pub const REF_SCHEME: &str = "keychain";

/// Default keychain service namespace used by the CLI.
pub const DEFAULT_SERVICE: &str = "graphgate";

// ---------------------------------------------------------------------------
// SecretKind
// ---------------------------------------------------------------------------

/// What a stored secret is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// An access token.
    Token,
    /// An application secret.
    AppSecret,
}

impl SecretKind {
    /// Stable path segment for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::AppSecret => "app_secret",
        }
    }
}

impl FromStr for SecretKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "token" => Ok(Self::Token),
            "app_secret" => Ok(Self::AppSecret),
            other => Err(Error::new(
                ErrorCode::MalformedSecretRef,
                format!("unknown secret kind '{other}' (expected token or app_secret)"),
            )),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SecretRef
// ---------------------------------------------------------------------------

/// Parsed form of `keychain://<service>/<profile>/<kind>`.
///
/// A reference is a pointer to a store entry; it carries no secret material
/// and is safe to persist and log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef {
    /// Keychain service namespace (e.g. `graphgate`).
    pub service: String,
    /// Profile name the entry belongs to.
    pub profile: String,
    /// Which secret this is.
    pub kind: SecretKind,
}

impl SecretRef {
    /// Build a reference from parts.
    pub fn new(service: impl Into<String>, profile: impl Into<String>, kind: SecretKind) -> Self {
        Self {
            service: service.into(),
            profile: profile.into(),
            kind,
        }
    }

    /// Parse a `keychain://<service>/<profile>/<kind>` string.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |why: &str| {
            Error::new(
                ErrorCode::MalformedSecretRef,
                format!("invalid secret reference '{raw}': {why}"),
            )
        };

        let rest = raw
            .strip_prefix("keychain://")
            .ok_or_else(|| malformed("expected keychain:// scheme"))?;

        let mut parts = rest.split('/');
        let service = parts.next().unwrap_or_default();
        let profile = parts.next().unwrap_or_default();
        let kind = parts.next().unwrap_or_default();
        if parts.next().is_some() {
            return Err(malformed("too many path segments"));
        }
        if service.is_empty() {
            return Err(malformed("service must not be empty"));
        }
        if profile.is_empty() {
            return Err(malformed("profile must not be empty"));
        }
        let kind = kind.parse::<SecretKind>()?;

        Ok(Self {
            service: service.to_string(),
            profile: profile.to_string(),
            kind,
        })
    }

    /// Backend account key: `<profile>:<kind>`.
    pub fn account_key(&self) -> String {
        format!("{}:{}", self.profile, self.kind.as_str())
    }
}

// Display is the canonical serialized form; serde stays in lockstep so a
// profile file round-trips references byte-for-byte.
impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{REF_SCHEME}://{}/{}/{}",
            self.service,
            self.profile,
            self.kind.as_str()
        )
    }
}

impl Serialize for SecretRef {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretRef {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// SecretStore
// ---------------------------------------------------------------------------

/// Keyed, process-external storage for tokens and app secrets.
///
/// Implementations must reject empty values on both read and write, and must
/// surface a missing entry on `get` as [`ErrorCode::SecretNotFound`] so
/// callers can treat it as a recoverable condition. Same-ref concurrent
/// writes are last-writer-wins.
pub trait SecretStore: Send + Sync {
    /// Store `value` under `reference`, replacing any previous value.
    fn set(&self, reference: &SecretRef, value: &str) -> Result<()>;

    /// Fetch the value stored under `reference`.
    fn get(&self, reference: &SecretRef) -> Result<String>;

    /// Remove the entry stored under `reference`.
    fn delete(&self, reference: &SecretRef) -> Result<()>;
}

fn check_service(expected: &str, reference: &SecretRef) -> Result<()> {
    if reference.service != expected {
        return Err(Error::new(
            ErrorCode::MalformedSecretRef,
            format!(
                "secret reference service '{}' does not match store service '{expected}'",
                reference.service
            ),
        ));
    }
    Ok(())
}

fn check_value(reference: &SecretRef, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::new(
            ErrorCode::SecretEmpty,
            format!("secret value for '{reference}' is empty"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MemorySecretStore
// ---------------------------------------------------------------------------

/// In-memory [`SecretStore`] for tests and single-process use.
pub struct MemorySecretStore {
    service: String,
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySecretStore {
    /// Create a store answering for the given service namespace.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of stored entries. Test helper.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("secret store lock").len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStore for MemorySecretStore {
    fn set(&self, reference: &SecretRef, value: &str) -> Result<()> {
        check_service(&self.service, reference)?;
        check_value(reference, value)?;
        self.entries
            .lock()
            .expect("secret store lock")
            .insert(reference.account_key(), value.to_string());
        Ok(())
    }

    fn get(&self, reference: &SecretRef) -> Result<String> {
        check_service(&self.service, reference)?;
        let entries = self.entries.lock().expect("secret store lock");
        let value = entries.get(&reference.account_key()).ok_or_else(|| {
            Error::new(
                ErrorCode::SecretNotFound,
                format!("no secret stored for '{reference}'"),
            )
        })?;
        check_value(reference, value)?;
        Ok(value.clone())
    }

    fn delete(&self, reference: &SecretRef) -> Result<()> {
        check_service(&self.service, reference)?;
        let removed = self
            .entries
            .lock()
            .expect("secret store lock")
            .remove(&reference.account_key());
        if removed.is_none() {
            return Err(Error::new(
                ErrorCode::SecretNotFound,
                format!("no secret stored for '{reference}'"),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringSecretStore
// ---------------------------------------------------------------------------

/// [`SecretStore`] backed by the platform keychain via the `keyring` crate.
///
/// Entries are addressed by `(service, "<profile>:<kind>")`.
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    /// Create a store answering for the given service namespace.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, reference: &SecretRef) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &reference.account_key()).map_err(|e| {
            Error::new(
                ErrorCode::SecretBackend,
                format!("keychain entry for '{reference}' unavailable"),
            )
            .with_source(e)
        })
    }
}

impl SecretStore for KeyringSecretStore {
    fn set(&self, reference: &SecretRef, value: &str) -> Result<()> {
        check_service(&self.service, reference)?;
        check_value(reference, value)?;
        tracing::debug!(reference = %reference, "writing keychain entry");
        self.entry(reference)?.set_password(value).map_err(|e| {
            Error::new(
                ErrorCode::SecretBackend,
                format!("failed to write secret for '{reference}'"),
            )
            .with_source(e)
        })
    }

    fn get(&self, reference: &SecretRef) -> Result<String> {
        check_service(&self.service, reference)?;
        let value = match self.entry(reference)?.get_password() {
            Ok(v) => v,
            Err(keyring::Error::NoEntry) => {
                return Err(Error::new(
                    ErrorCode::SecretNotFound,
                    format!("no secret stored for '{reference}'"),
                ));
            }
            Err(e) => {
                return Err(Error::new(
                    ErrorCode::SecretBackend,
                    format!("failed to read secret for '{reference}'"),
                )
                .with_source(e));
            }
        };
        check_value(reference, &value)?;
        Ok(value)
    }

    fn delete(&self, reference: &SecretRef) -> Result<()> {
        check_service(&self.service, reference)?;
        match self.entry(reference)?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(Error::new(
                ErrorCode::SecretNotFound,
                format!("no secret stored for '{reference}'"),
            )),
            Err(e) => Err(Error::new(
                ErrorCode::SecretBackend,
                format!("failed to delete secret for '{reference}'"),
            )
            .with_source(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
