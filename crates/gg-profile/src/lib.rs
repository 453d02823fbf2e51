// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, versioned mapping from profile name to credential metadata.
//!
//! The config document carries a mandatory `schema_version`; exactly one
//! version is in production at a time and a mismatch fails fast.  Writes go
//! through a sibling temp file with mode `0o600` followed by a rename, so a
//! partial document is never observable.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use gg_error::{Error, ErrorCode, Result};
use gg_secret::SecretRef;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// The single schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Product namespace filled in when a profile does not name one.
pub const DEFAULT_DOMAIN: &str = "marketing";

/// Graph version filled in when a profile does not name one.
pub const DEFAULT_GRAPH_VERSION: &str = "v25.0";

// ---------------------------------------------------------------------------
// TokenType
// ---------------------------------------------------------------------------

/// What kind of credential a profile holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Business system-user token (effectively long-lived).
    SystemUser,
    /// Interactive user token (short- or long-lived).
    User,
    /// Page token derived from a user or system-user token.
    Page,
    /// App access token (`client_credentials`).
    App,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SystemUser => "system_user",
            Self::User => "user",
            Self::Page => "page",
            Self::App => "app",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Validation detail
// ---------------------------------------------------------------------------

/// Fine-grained reasons a profile record fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileInvalid {
    /// `scopes` must contain at least one entry.
    #[error("scopes must not be empty")]
    EmptyScopes,
    /// A scope entry is blank or whitespace-only.
    #[error("scope entries must not be blank")]
    BlankScope,
    /// `issued_at` must precede `expires_at`.
    #[error("issued_at {issued_at} is not before expires_at {expires_at}")]
    TimestampOrder {
        /// Issue instant.
        issued_at: DateTime<Utc>,
        /// Expiry instant.
        expires_at: DateTime<Utc>,
    },
    /// Graph versions look like `v25.0`.
    #[error("graph_version '{0}' does not match v<major>.<minor>")]
    BadGraphVersion(String),
    /// Domain must not be blank once normalized.
    #[error("domain must not be blank")]
    BlankDomain,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A named credential record.
///
/// The profile holds references into the secret store, never secret
/// material.  `source_profile` on derived page profiles is a lookup key,
/// not an owning link; the derived profile survives deletion of its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Product namespace, e.g. `marketing`.
    #[serde(default)]
    pub domain: String,

    /// Graph version used for this profile's calls, e.g. `v25.0`.
    #[serde(default)]
    pub graph_version: String,

    /// Credential kind.
    pub token_type: TokenType,

    /// Business (organization) id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,

    /// App id the credential belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Page id for derived page profiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,

    /// Name of the profile this one was derived from. Relation only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_profile: Option<String>,

    /// Reference to the access token in the secret store.
    #[schemars(with = "String")]
    pub token_ref: SecretRef,

    /// Reference to the app secret, when the app is configured for proofs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub app_secret_ref: Option<SecretRef>,

    /// Identity provider label, e.g. `facebook`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<String>,

    /// How the credential was obtained, e.g. `oauth_pkce` or `manual`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<String>,

    /// Granted scopes. Normalized to a sorted, de-duplicated set.
    pub scopes: Vec<String>,

    /// When the credential was issued.
    pub issued_at: DateTime<Utc>,

    /// When the credential expires.
    pub expires_at: DateTime<Utc>,

    /// When the credential last passed debug-token validation.
    pub last_validated_at: DateTime<Utc>,
}

impl Profile {
    /// Fill defaults and normalize the scope set in place.
    pub fn normalize(&mut self) {
        if self.domain.trim().is_empty() {
            self.domain = DEFAULT_DOMAIN.to_string();
        }
        if self.graph_version.trim().is_empty() {
            self.graph_version = DEFAULT_GRAPH_VERSION.to_string();
        }
        self.scopes = normalize_scopes(&self.scopes);
    }

    /// Semantic validation of a (normalized) record.
    pub fn validate(&self) -> std::result::Result<(), ProfileInvalid> {
        if self.domain.trim().is_empty() {
            return Err(ProfileInvalid::BlankDomain);
        }
        if !is_graph_version(&self.graph_version) {
            return Err(ProfileInvalid::BadGraphVersion(self.graph_version.clone()));
        }
        if self.scopes.is_empty() {
            return Err(ProfileInvalid::EmptyScopes);
        }
        if self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(ProfileInvalid::BlankScope);
        }
        if self.issued_at >= self.expires_at {
            return Err(ProfileInvalid::TimestampOrder {
                issued_at: self.issued_at,
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// The app secret reference, or an error for operations that need one.
    ///
    /// System-user lifecycle operations are exempt from this requirement.
    pub fn require_app_secret_ref(&self) -> Result<&SecretRef> {
        self.app_secret_ref.as_ref().ok_or_else(|| {
            Error::new(
                ErrorCode::ConfigInvalidProfile,
                format!(
                    "{} profile has no app_secret_ref but the operation requires one",
                    self.token_type
                ),
            )
        })
    }

    /// Scope-set equality, ignoring order and duplicates.
    pub fn scopes_equal(&self, other: &[String]) -> bool {
        normalize_scopes(&self.scopes) == normalize_scopes(other)
    }
}

/// Sorted, de-duplicated, blank-free copy of `scopes`.
///
/// Blanks are dropped here; [`Profile::validate`] is where a blank entry in
/// the stored record becomes an error.
pub fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    scopes
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn is_graph_version(v: &str) -> bool {
    let Some(rest) = v.strip_prefix('v') else {
        return false;
    };
    let mut parts = rest.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), None) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// ProfileConfig
// ---------------------------------------------------------------------------

/// Top-level config document: schema version plus the profile map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Mandatory document schema version.
    pub schema_version: u32,

    /// Profile name used when the caller does not specify one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Named profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            default_profile: None,
            profiles: BTreeMap::new(),
        }
    }
}

impl ProfileConfig {
    /// Insert or replace a profile after normalizing and validating it.
    ///
    /// The first profile ever inserted becomes the `default_profile`.
    pub fn upsert_profile(&mut self, name: &str, mut profile: Profile) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "profile name must not be empty",
            ));
        }
        profile.normalize();
        profile.validate().map_err(|e| {
            Error::new(
                ErrorCode::ConfigInvalidProfile,
                format!("profile '{name}' is invalid: {e}"),
            )
            .with_source(e)
        })?;
        let first = self.profiles.is_empty();
        self.profiles.insert(name.to_string(), profile);
        if first {
            self.default_profile = Some(name.to_string());
        }
        Ok(())
    }

    /// Return the named profile, falling back to `default_profile`.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<(&str, &Profile)> {
        let effective = match name {
            Some(n) if !n.trim().is_empty() => n,
            _ => self.default_profile.as_deref().ok_or_else(|| {
                Error::new(
                    ErrorCode::ConfigProfileNotFound,
                    "no profile named and no default_profile configured",
                )
            })?,
        };
        let (key, profile) = self.profiles.get_key_value(effective).ok_or_else(|| {
            Error::new(
                ErrorCode::ConfigProfileNotFound,
                format!("profile '{effective}' not found"),
            )
        })?;
        Ok((key.as_str(), profile))
    }

    /// Remove a profile by name. Removal is the only way a profile dies.
    pub fn remove_profile(&mut self, name: &str) -> Result<Profile> {
        let removed = self.profiles.remove(name).ok_or_else(|| {
            Error::new(
                ErrorCode::ConfigProfileNotFound,
                format!("profile '{name}' not found"),
            )
        })?;
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        Ok(removed)
    }

    /// Validate every profile in the document.
    pub fn validate(&self) -> Result<()> {
        for (name, profile) in &self.profiles {
            profile.validate().map_err(|e| {
                Error::new(
                    ErrorCode::ConfigInvalidProfile,
                    format!("profile '{name}' is invalid: {e}"),
                )
                .with_source(e)
            })?;
        }
        if let Some(default) = &self.default_profile
            && !self.profiles.contains_key(default)
        {
            return Err(Error::new(
                ErrorCode::ConfigInvalidProfile,
                format!("default_profile '{default}' names a profile that does not exist"),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading / saving
// ---------------------------------------------------------------------------

/// Parse a TOML string into a validated [`ProfileConfig`].
pub fn parse_config(content: &str) -> Result<ProfileConfig> {
    let config: ProfileConfig = toml::from_str(content).map_err(|e| {
        Error::new(ErrorCode::ConfigParse, "failed to parse profile config").with_source(e)
    })?;
    if config.schema_version != SCHEMA_VERSION {
        return Err(Error::new(
            ErrorCode::ConfigSchemaVersion,
            format!(
                "config schema_version {} is not supported (expected {SCHEMA_VERSION})",
                config.schema_version
            ),
        ));
    }
    config.validate()?;
    Ok(config)
}

/// Load and validate the config document at `path`.
pub fn load(path: &Path) -> Result<ProfileConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::new(
            ErrorCode::ConfigRead,
            format!("failed to read profile config '{}'", path.display()),
        )
        .with_source(e)
    })?;
    parse_config(&content)
}

/// Serialize `config` and atomically replace the document at `path`.
///
/// The document is written to a sibling temp file (mode `0o600` on unix)
/// and renamed over the destination, so readers never observe a partial
/// write.
pub fn save(path: &Path, config: &ProfileConfig) -> Result<()> {
    config.validate()?;
    let serialized = toml::to_string_pretty(config).map_err(|e| {
        Error::new(ErrorCode::ConfigWrite, "failed to serialize profile config").with_source(e)
    })?;

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent
        && !dir.exists()
    {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::new(
                ErrorCode::ConfigWrite,
                format!("failed to create config directory '{}'", dir.display()),
            )
            .with_source(e)
        })?;
    }

    let dir = parent.map(Path::to_path_buf).unwrap_or_else(|| ".".into());
    let write_err = |e: &dyn fmt::Display| {
        Error::new(
            ErrorCode::ConfigWrite,
            format!("failed to write profile config '{}': {e}", path.display()),
        )
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_err(&e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tmp.as_file().set_permissions(perms).map_err(|e| write_err(&e))?;
    }

    use std::io::Write;
    tmp.write_all(serialized.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| write_err(&e))?;

    tmp.persist(path).map_err(|e| write_err(&e))?;
    tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "profile config written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gg_secret::{SecretKind, SecretRef};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sample_profile() -> Profile {
        Profile {
            domain: String::new(),
            graph_version: String::new(),
            token_type: TokenType::User,
            business_id: None,
            app_id: Some("1234567890".into()),
            page_id: None,
            source_profile: None,
            token_ref: SecretRef::new("graphgate", "main", SecretKind::Token),
            app_secret_ref: Some(SecretRef::new("graphgate", "main", SecretKind::AppSecret)),
            auth_provider: Some("facebook".into()),
            auth_mode: Some("oauth_pkce".into()),
            scopes: vec!["ads_read".into(), "ads_management".into()],
            issued_at: ts("2026-08-01T10:00:00Z"),
            expires_at: ts("2026-09-30T10:00:00Z"),
            last_validated_at: ts("2026-08-01T10:00:00Z"),
        }
    }

    // -- 1. Normalization fills defaults --------------------------------------

    #[test]
    fn normalize_fills_domain_and_version() {
        let mut p = sample_profile();
        p.normalize();
        assert_eq!(p.domain, DEFAULT_DOMAIN);
        assert_eq!(p.graph_version, DEFAULT_GRAPH_VERSION);
    }

    // -- 2. Normalization dedupes and sorts scopes ----------------------------

    #[test]
    fn normalize_dedupes_scopes() {
        let mut p = sample_profile();
        p.scopes = vec![
            "ads_read".into(),
            " ads_read ".into(),
            "pages_show_list".into(),
            "ads_read".into(),
        ];
        p.normalize();
        assert_eq!(p.scopes, vec!["ads_read", "pages_show_list"]);
    }

    // -- 3. Scope comparison is order-independent -----------------------------

    #[test]
    fn scopes_equal_ignores_order() {
        let mut p = sample_profile();
        p.normalize();
        assert!(p.scopes_equal(&["ads_management".into(), "ads_read".into()]));
        assert!(p.scopes_equal(&["ads_read".into(), "ads_management".into()]));
        assert!(!p.scopes_equal(&["ads_read".into()]));
    }

    // -- 4. Validation rejects bad records ------------------------------------

    #[test]
    fn validate_rejects_empty_scopes() {
        let mut p = sample_profile();
        p.normalize();
        p.scopes.clear();
        assert_eq!(p.validate(), Err(ProfileInvalid::EmptyScopes));
    }

    #[test]
    fn validate_rejects_blank_scope_entry() {
        let mut p = sample_profile();
        p.normalize();
        p.scopes = vec!["ads_read".into(), "  ".into()];
        assert_eq!(p.validate(), Err(ProfileInvalid::BlankScope));
    }

    #[test]
    fn validate_rejects_timestamp_inversion() {
        let mut p = sample_profile();
        p.normalize();
        p.expires_at = p.issued_at;
        assert!(matches!(
            p.validate(),
            Err(ProfileInvalid::TimestampOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_graph_version() {
        let mut p = sample_profile();
        p.normalize();
        p.graph_version = "25.0".into();
        assert!(matches!(p.validate(), Err(ProfileInvalid::BadGraphVersion(_))));
        p.graph_version = "v25".into();
        assert!(matches!(p.validate(), Err(ProfileInvalid::BadGraphVersion(_))));
        p.graph_version = "v25.0".into();
        p.scopes = vec!["ads_read".into()];
        assert!(p.validate().is_ok());
    }

    // -- 5. Upsert sets default_profile on first insert -----------------------

    #[test]
    fn first_upsert_sets_default_profile() {
        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", sample_profile()).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("main"));

        cfg.upsert_profile("second", sample_profile()).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("main"));
    }

    // -- 6. Upsert validates --------------------------------------------------

    #[test]
    fn upsert_rejects_invalid_profile() {
        let mut cfg = ProfileConfig::default();
        let mut p = sample_profile();
        p.scopes.clear();
        let err = cfg.upsert_profile("main", p).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidProfile);
        assert!(cfg.profiles.is_empty());
        assert!(cfg.default_profile.is_none());
    }

    #[test]
    fn upsert_rejects_empty_name() {
        let mut cfg = ProfileConfig::default();
        let err = cfg.upsert_profile("  ", sample_profile()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    // -- 7. Resolution falls back to default ----------------------------------

    #[test]
    fn resolve_named_and_default() {
        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", sample_profile()).unwrap();
        cfg.upsert_profile("eu", sample_profile()).unwrap();

        let (name, _) = cfg.resolve_profile(Some("eu")).unwrap();
        assert_eq!(name, "eu");

        let (name, _) = cfg.resolve_profile(None).unwrap();
        assert_eq!(name, "main");
    }

    #[test]
    fn resolve_fails_without_default() {
        let cfg = ProfileConfig::default();
        let err = cfg.resolve_profile(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigProfileNotFound);

        let err = cfg.resolve_profile(Some("ghost")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigProfileNotFound);
    }

    // -- 8. Removal ------------------------------------------------------------

    #[test]
    fn remove_clears_dangling_default() {
        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", sample_profile()).unwrap();
        cfg.remove_profile("main").unwrap();
        assert!(cfg.default_profile.is_none());
        assert!(cfg.profiles.is_empty());

        let err = cfg.remove_profile("main").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigProfileNotFound);
    }

    // -- 9. Schema version gate -------------------------------------------------

    #[test]
    fn parse_rejects_schema_mismatch() {
        let content = "schema_version = 2\n";
        let err = parse_config(content).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigSchemaVersion);
    }

    #[test]
    fn parse_requires_schema_version() {
        let err = parse_config("").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParse);
    }

    // -- 10. Unknown fields reject the load -------------------------------------

    #[test]
    fn parse_rejects_unknown_top_level_field() {
        let content = "schema_version = 1\nfuture_field = true\n";
        let err = parse_config(content).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParse);
    }

    #[test]
    fn parse_rejects_unknown_profile_field() {
        let content = r#"
schema_version = 1

[profiles.main]
token_type = "user"
token_ref = "keychain://graphgate/main/token"
scopes = ["ads_read"]
issued_at = "2026-08-01T10:00:00Z"
expires_at = "2026-09-30T10:00:00Z"
last_validated_at = "2026-08-01T10:00:00Z"
surprise = 1
"#;
        let err = parse_config(content).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParse);
    }

    // -- 11. Save -> load -> save is a fixed point -------------------------------

    #[test]
    fn save_load_save_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", sample_profile()).unwrap();
        let mut derived = sample_profile();
        derived.token_type = TokenType::Page;
        derived.page_id = Some("424242".into());
        derived.source_profile = Some("main".into());
        cfg.upsert_profile("main-page", derived).unwrap();

        save(&path, &cfg).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, cfg);

        save(&path, &loaded).unwrap();
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded, loaded);

        let first = std::fs::read_to_string(&path).unwrap();
        save(&path, &reloaded).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    // -- 12. Saved file has owner-only permissions --------------------------------

    #[cfg(unix)]
    #[test]
    fn save_sets_mode_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", sample_profile()).unwrap();
        save(&path, &cfg).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // -- 13. Round-trip preserves every field --------------------------------------

    #[test]
    fn round_trip_preserves_fields() {
        let mut p = sample_profile();
        p.business_id = Some("987".into());
        p.normalize();

        let mut cfg = ProfileConfig::default();
        cfg.upsert_profile("main", p.clone()).unwrap();

        let serialized = toml::to_string_pretty(&cfg).unwrap();
        let parsed = parse_config(&serialized).unwrap();
        let (_, loaded) = parsed.resolve_profile(Some("main")).unwrap();

        p.normalize();
        assert_eq!(*loaded, p);
        assert_eq!(loaded.issued_at, ts("2026-08-01T10:00:00Z"));
        assert_eq!(
            loaded.token_ref.to_string(),
            "keychain://graphgate/main/token"
        );
    }

    // -- 14. Dangling default_profile rejected --------------------------------------

    #[test]
    fn dangling_default_profile_rejected() {
        let content = r#"
schema_version = 1
default_profile = "ghost"
"#;
        let err = parse_config(content).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidProfile);
    }

    // -- 15. Timestamps parse as RFC 3339 UTC ----------------------------------------

    #[test]
    fn timestamps_parse_rfc3339() {
        let when = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        assert_eq!(ts("2026-08-01T10:00:00Z"), when);
        assert_eq!(ts("2026-08-01T12:00:00+02:00"), when);
    }
}
