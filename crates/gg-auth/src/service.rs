// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credential service: lifecycle commands, exchanges, and pre-flight.

use crate::debug::{DebugTokenResponse, TokenMetadata, normalize_debug_metadata};
use chrono::{Duration as ChronoDuration, Utc};
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorCode, Result};
use gg_graph::{GraphClient, GraphRequest, JsonScalar};
use gg_profile::{Profile, ProfileConfig, TokenType, normalize_scopes};
use gg_secret::{DEFAULT_SERVICE, SecretKind, SecretRef, SecretStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime for user tokens obtained without an explicit expiry.
pub const USER_TOKEN_LIFETIME_DAYS: i64 = 60;

/// Effective lifetime recorded for system-user and app tokens.
pub const SYSTEM_TOKEN_LIFETIME_DAYS: i64 = 3650;

/// Scope every derived page profile carries.
const DERIVED_PAGE_SCOPE: &str = "pages_read_engagement";

/// Result of the long-lived token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongLivedToken {
    /// The long-lived access token.
    pub token: String,
    /// Upstream-reported lifetime; zero when the upstream omitted it.
    pub expires_in_seconds: i64,
}

/// Parameters for [`CredentialService::add_user`].
#[derive(Debug, Clone)]
pub struct AddUserParams {
    /// The user access token to persist.
    pub token: String,
    /// App the token belongs to.
    pub app_id: String,
    /// App secret, persisted for proof computation.
    pub app_secret: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Seconds until expiry; defaults to sixty days when absent.
    pub expires_in_seconds: Option<i64>,
}

/// OAuth flows, token exchanges, derivations, debug, and pre-flight.
///
/// Stateless apart from its collaborators: the secret store, the
/// authenticated Graph caller, and the profile config the dispatcher
/// passes per invocation.
pub struct CredentialService {
    secrets: Arc<dyn SecretStore>,
    graph: GraphClient,
    service_name: String,
}

impl CredentialService {
    /// Service using the default keychain namespace.
    pub fn new(secrets: Arc<dyn SecretStore>, graph: GraphClient) -> Self {
        Self::with_service_name(secrets, graph, DEFAULT_SERVICE)
    }

    /// Service with an explicit keychain namespace (tests).
    pub fn with_service_name(
        secrets: Arc<dyn SecretStore>,
        graph: GraphClient,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            graph,
            service_name: service_name.into(),
        }
    }

    fn token_ref(&self, profile: &str) -> SecretRef {
        SecretRef::new(&self.service_name, profile, SecretKind::Token)
    }

    fn app_secret_ref(&self, profile: &str) -> SecretRef {
        SecretRef::new(&self.service_name, profile, SecretKind::AppSecret)
    }

    // -----------------------------------------------------------------
    // Lifecycle commands
    // -----------------------------------------------------------------

    /// Persist a system-user token under a new or existing profile.
    ///
    /// System-user tokens are effectively long-lived and need no app
    /// secret for their own lifecycle.
    pub fn add_system_user(
        &self,
        config: &mut ProfileConfig,
        name: &str,
        token: &str,
        business_id: Option<String>,
        app_id: Option<String>,
        scopes: Vec<String>,
    ) -> Result<()> {
        require_non_empty("token", token)?;
        let now = Utc::now();
        let token_ref = self.token_ref(name);
        self.secrets.set(&token_ref, token)?;

        let profile = Profile {
            domain: String::new(),
            graph_version: String::new(),
            token_type: TokenType::SystemUser,
            business_id,
            app_id,
            page_id: None,
            source_profile: None,
            token_ref,
            app_secret_ref: None,
            auth_provider: Some("facebook".into()),
            auth_mode: Some("manual".into()),
            scopes,
            issued_at: now,
            expires_at: now + ChronoDuration::days(SYSTEM_TOKEN_LIFETIME_DAYS),
            last_validated_at: now,
        };
        config.upsert_profile(name, profile)
    }

    /// Persist a user token (and its app secret) under a profile.
    pub fn add_user(
        &self,
        config: &mut ProfileConfig,
        name: &str,
        params: AddUserParams,
    ) -> Result<()> {
        require_non_empty("token", &params.token)?;
        require_non_empty("app id", &params.app_id)?;
        require_non_empty("app secret", &params.app_secret)?;

        let now = Utc::now();
        let lifetime = match params.expires_in_seconds {
            Some(seconds) if seconds > 0 => ChronoDuration::seconds(seconds),
            _ => ChronoDuration::days(USER_TOKEN_LIFETIME_DAYS),
        };

        let token_ref = self.token_ref(name);
        let secret_ref = self.app_secret_ref(name);
        self.secrets.set(&token_ref, &params.token)?;
        self.secrets.set(&secret_ref, &params.app_secret)?;

        let profile = Profile {
            domain: String::new(),
            graph_version: String::new(),
            token_type: TokenType::User,
            business_id: None,
            app_id: Some(params.app_id),
            page_id: None,
            source_profile: None,
            token_ref,
            app_secret_ref: Some(secret_ref),
            auth_provider: Some("facebook".into()),
            auth_mode: Some("oauth_pkce".into()),
            scopes: params.scopes,
            issued_at: now,
            expires_at: now + lifetime,
            last_validated_at: now,
        };
        config.upsert_profile(name, profile)
    }

    /// Persist an app access token and its secret under a profile.
    pub fn set_app_token(
        &self,
        config: &mut ProfileConfig,
        name: &str,
        app_id: &str,
        app_secret: &str,
        token: &str,
        scopes: Vec<String>,
    ) -> Result<()> {
        require_non_empty("token", token)?;
        require_non_empty("app id", app_id)?;
        require_non_empty("app secret", app_secret)?;

        let now = Utc::now();
        let token_ref = self.token_ref(name);
        let secret_ref = self.app_secret_ref(name);
        self.secrets.set(&token_ref, token)?;
        self.secrets.set(&secret_ref, app_secret)?;

        let profile = Profile {
            domain: String::new(),
            graph_version: String::new(),
            token_type: TokenType::App,
            business_id: None,
            app_id: Some(app_id.to_string()),
            page_id: None,
            source_profile: None,
            token_ref,
            app_secret_ref: Some(secret_ref),
            auth_provider: Some("facebook".into()),
            auth_mode: Some("client_credentials".into()),
            scopes,
            issued_at: now,
            expires_at: now + ChronoDuration::days(SYSTEM_TOKEN_LIFETIME_DAYS),
            last_validated_at: now,
        };
        config.upsert_profile(name, profile)
    }

    // -----------------------------------------------------------------
    // Exchanges
    // -----------------------------------------------------------------

    /// Exchange an authorization code (PKCE) for an access token.
    pub async fn exchange_oauth_code(
        &self,
        cancel: &CancellationToken,
        app_id: &str,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
        version: &str,
    ) -> Result<String> {
        require_non_empty("app id", app_id)?;
        require_non_empty("redirect URI", redirect_uri)?;
        require_non_empty("authorization code", code)?;
        require_non_empty("code verifier", code_verifier)?;

        let request = GraphRequest::post(version, "oauth/access_token")
            .param("client_id", app_id)
            .param("redirect_uri", redirect_uri)
            .param("code", code)
            .param("code_verifier", code_verifier);
        let body = self.graph.execute(cancel, &request).await?;
        extract_access_token(&body)
    }

    /// Exchange a short-lived user token for a long-lived one.
    pub async fn exchange_long_lived_user_token(
        &self,
        cancel: &CancellationToken,
        app_id: &str,
        app_secret: &str,
        short_token: &str,
        version: &str,
    ) -> Result<LongLivedToken> {
        require_non_empty("app id", app_id)?;
        require_non_empty("app secret", app_secret)?;
        require_non_empty("token", short_token)?;

        let request = GraphRequest::get(version, "oauth/access_token")
            .param("grant_type", "fb_exchange_token")
            .param("client_id", app_id)
            .param("client_secret", app_secret)
            .param("fb_exchange_token", short_token);
        let body = self.graph.execute(cancel, &request).await?;
        let token = extract_access_token(&body)?;

        // Upstream encodes expires_in as an integer or a numeric string
        // depending on version; absent means already long-lived.
        let expires_in_seconds = match body.get("expires_in") {
            None | Some(serde_json::Value::Null) => 0,
            Some(value) => serde_json::from_value::<JsonScalar>(value.clone())
                .map_err(|e| {
                    Error::new(
                        ErrorCode::UpstreamError,
                        "token exchange returned an unusable expires_in",
                    )
                    .with_source(e)
                })?
                .as_seconds()
                .map_err(|e| {
                    Error::new(
                        ErrorCode::UpstreamError,
                        "token exchange returned an unusable expires_in",
                    )
                    .with_source(e)
                })?,
        };

        Ok(LongLivedToken {
            token,
            expires_in_seconds,
        })
    }

    /// Fetch a fresh app access token via `client_credentials`.
    pub async fn fetch_app_token(
        &self,
        cancel: &CancellationToken,
        app_id: &str,
        app_secret: &str,
        version: &str,
    ) -> Result<String> {
        require_non_empty("app id", app_id)?;
        require_non_empty("app secret", app_secret)?;

        let request = GraphRequest::get(version, "oauth/access_token")
            .param("grant_type", "client_credentials")
            .param("client_id", app_id)
            .param("client_secret", app_secret);
        let body = self.graph.execute(cancel, &request).await?;
        extract_access_token(&body)
    }

    // -----------------------------------------------------------------
    // Derivation
    // -----------------------------------------------------------------

    /// Derive a page token from a source profile and persist it as a new
    /// profile named `name`.
    pub async fn derive_page_token(
        &self,
        cancel: &CancellationToken,
        config: &mut ProfileConfig,
        name: &str,
        page_id: &str,
        source: Option<&str>,
    ) -> Result<()> {
        require_non_empty("page id", page_id)?;

        let (source_name, source_profile) = {
            let (n, p) = config.resolve_profile(source)?;
            (n.to_string(), p.clone())
        };
        let source_token = self.secrets.get(&source_profile.token_ref)?;
        let source_app_secret = match &source_profile.app_secret_ref {
            Some(r) => Some(self.secrets.get(r)?),
            None => None,
        };

        let mut request = GraphRequest::get(&source_profile.graph_version, page_id)
            .param("fields", "access_token")
            .token(&source_token);
        if let Some(secret) = &source_app_secret {
            request = request.app_secret(secret);
        }
        let body = self.graph.execute(cancel, &request).await?;
        let page_token = extract_access_token(&body)?;

        let now = Utc::now();
        let token_ref = self.token_ref(name);
        self.secrets.set(&token_ref, &page_token)?;

        // The derived profile owns copies of its secrets so it survives
        // deletion of the source profile.
        let app_secret_ref = match &source_app_secret {
            Some(secret) => {
                let r = self.app_secret_ref(name);
                self.secrets.set(&r, secret)?;
                Some(r)
            }
            None => None,
        };

        let mut scopes = source_profile.scopes.clone();
        scopes.push(DERIVED_PAGE_SCOPE.to_string());

        let profile = Profile {
            domain: source_profile.domain.clone(),
            graph_version: source_profile.graph_version.clone(),
            token_type: TokenType::Page,
            business_id: source_profile.business_id.clone(),
            app_id: source_profile.app_id.clone(),
            page_id: Some(page_id.to_string()),
            source_profile: Some(source_name),
            token_ref,
            app_secret_ref,
            auth_provider: source_profile.auth_provider.clone(),
            auth_mode: Some("derived".into()),
            scopes,
            issued_at: now,
            expires_at: source_profile.expires_at,
            last_validated_at: now,
        };
        config.upsert_profile(name, profile)
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// Raw `/debug_token` call.
    pub async fn debug_token(
        &self,
        cancel: &CancellationToken,
        version: &str,
        token: &str,
        access_token: &str,
    ) -> Result<DebugTokenResponse> {
        require_non_empty("token", token)?;
        require_non_empty("access token", access_token)?;

        let request = GraphRequest::get(version, "debug_token")
            .param("input_token", token)
            .token(access_token);
        self.graph.execute_as(cancel, &request).await
    }

    /// Debug-token the profile's token and return normalized metadata.
    ///
    /// When the profile has an app configured, introspection authenticates
    /// with a freshly-fetched app access token instead of asking the
    /// subject token to introspect itself.
    pub async fn introspect_profile(
        &self,
        cancel: &CancellationToken,
        profile: &Profile,
    ) -> Result<TokenMetadata> {
        let token = self.secrets.get(&profile.token_ref)?;
        let access_token = match (&profile.app_id, &profile.app_secret_ref) {
            (Some(app_id), Some(secret_ref)) => {
                let app_secret = self.secrets.get(secret_ref)?;
                self.fetch_app_token(cancel, app_id, &app_secret, &profile.graph_version)
                    .await?
            }
            _ => token.clone(),
        };
        let response = self
            .debug_token(cancel, &profile.graph_version, &token, &access_token)
            .await?;
        normalize_debug_metadata(&response)
    }

    /// Validate the named (or default) profile and stamp
    /// `last_validated_at` when the token is reported valid.
    pub async fn validate_profile(
        &self,
        cancel: &CancellationToken,
        config: &mut ProfileConfig,
        name: Option<&str>,
    ) -> Result<TokenMetadata> {
        let (resolved_name, profile) = {
            let (n, p) = config.resolve_profile(name)?;
            (n.to_string(), p.clone())
        };

        if let Some(source) = &profile.source_profile
            && !config.profiles.contains_key(source)
        {
            // Back-reference only: the derived profile keeps working on its
            // own stored fields.
            tracing::warn!(
                profile = %resolved_name,
                source = %source,
                "source profile no longer exists; continuing with stored metadata"
            );
        }

        let metadata = self.introspect_profile(cancel, &profile).await?;
        if metadata.is_valid {
            let mut updated = profile;
            updated.last_validated_at = Utc::now();
            config.upsert_profile(&resolved_name, updated)?;
        }
        Ok(metadata)
    }

    /// Rotate the named (or default) profile's token in place.
    ///
    /// Only `app` profiles rotate; rotation for user, system-user, and
    /// page tokens is unspecified upstream and surfaces an explicit error.
    pub async fn rotate_profile(
        &self,
        cancel: &CancellationToken,
        config: &ProfileConfig,
        name: Option<&str>,
    ) -> Result<()> {
        let (resolved_name, profile) = config.resolve_profile(name)?;
        if profile.token_type != TokenType::App {
            return Err(Error::new(
                ErrorCode::RotationUnsupported,
                format!(
                    "rotation is only supported for app token profiles; '{resolved_name}' is {}",
                    profile.token_type
                ),
            ));
        }
        let app_id = profile.app_id.as_deref().ok_or_else(|| {
            Error::new(
                ErrorCode::ConfigInvalidProfile,
                format!("app profile '{resolved_name}' has no app_id"),
            )
        })?;
        let app_secret = self.secrets.get(profile.require_app_secret_ref()?)?;

        let fresh = self
            .fetch_app_token(cancel, app_id, &app_secret, &profile.graph_version)
            .await?;
        self.secrets.set(&profile.token_ref, &fresh)?;
        tracing::info!(profile = %resolved_name, "app token rotated");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Pre-flight
    // -----------------------------------------------------------------

    /// The pre-flight gate: liveness, minimum remaining TTL, and
    /// required-scope coverage. Fail-closed.
    pub async fn ensure_valid(
        &self,
        cancel: &CancellationToken,
        profile: &Profile,
        min_ttl: Duration,
        required_scopes: &[String],
    ) -> Result<TokenMetadata> {
        let required = sanitize_required_scopes(required_scopes)?;
        let metadata = self.introspect_profile(cancel, profile).await?;

        if !metadata.is_valid {
            return Err(Error::new(
                ErrorCode::TokenInvalid,
                "token is not valid according to debug_token",
            ));
        }

        let now = Utc::now();
        if let Some(expires_at) = metadata.expires_at {
            if expires_at <= now {
                return Err(Error::new(
                    ErrorCode::TokenExpired,
                    format!("token expired at {}", expires_at.to_rfc3339()),
                ));
            }
            if !min_ttl.is_zero() {
                let deadline = now
                    + ChronoDuration::from_std(min_ttl).map_err(|e| {
                        Error::new(ErrorCode::InvalidArgument, "minimum TTL out of range")
                            .with_source(e)
                    })?;
                if expires_at < deadline {
                    return Err(Error::new(
                        ErrorCode::BelowMinimumTtl,
                        format!(
                            "token expires at {} which is under the required minimum TTL of {}s",
                            expires_at.to_rfc3339(),
                            min_ttl.as_secs()
                        ),
                    )
                    .with_context("expires_at", expires_at.to_rfc3339())
                    .with_context("min_ttl_secs", min_ttl.as_secs()));
                }
            }
        }

        let granted: BTreeSet<&str> = metadata.scopes.iter().map(String::as_str).collect();
        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|scope| !granted.contains(scope))
            .collect();
        if !missing.is_empty() {
            return Err(Error::new(
                ErrorCode::MissingScopes,
                format!("token is missing required scopes: {}", missing.join(", ")),
            )
            .with_context("missing_scopes", &missing));
        }

        Ok(metadata)
    }
}

/// Sorted-unique copy of `scopes`; a blank entry is an input error.
pub fn sanitize_required_scopes(scopes: &[String]) -> Result<Vec<String>> {
    if scopes.iter().any(|s| s.trim().is_empty()) {
        return Err(Error::new(
            ErrorCode::BlankScope,
            "required scopes must not contain blank entries",
        ));
    }
    Ok(normalize_scopes(scopes))
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            format!("{what} must not be empty"),
        ));
    }
    Ok(())
}

fn extract_access_token(body: &serde_json::Value) -> Result<String> {
    body.get("access_token")
        .and_then(serde_json::Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(
                ErrorCode::UpstreamError,
                "response carried no access_token",
            )
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gg_secret::MemorySecretStore;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const V: &str = "v25.0";

    fn service(server: &MockServer) -> CredentialService {
        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        CredentialService::new(store, GraphClient::with_base_url(server.uri()))
    }

    fn service_with_store(
        server: &MockServer,
        store: Arc<MemorySecretStore>,
    ) -> CredentialService {
        CredentialService::new(store, GraphClient::with_base_url(server.uri()))
    }

    fn seeded_user_profile(
        store: &MemorySecretStore,
        config: &mut ProfileConfig,
        name: &str,
        with_app: bool,
    ) {
        let token_ref = SecretRef::new(DEFAULT_SERVICE, name, SecretKind::Token);
        store.set(&token_ref, "user-token").unwrap();
        let app_secret_ref = if with_app {
            let r = SecretRef::new(DEFAULT_SERVICE, name, SecretKind::AppSecret);
            store.set(&r, "app-secret").unwrap();
            Some(r)
        } else {
            None
        };
        let now = Utc::now();
        let profile = Profile {
            domain: String::new(),
            graph_version: String::new(),
            token_type: TokenType::User,
            business_id: None,
            app_id: with_app.then(|| "app-123".to_string()),
            page_id: None,
            source_profile: None,
            token_ref,
            app_secret_ref,
            auth_provider: None,
            auth_mode: None,
            scopes: vec!["ads_read".into()],
            issued_at: now,
            expires_at: now + ChronoDuration::days(30),
            last_validated_at: now,
        };
        config.upsert_profile(name, profile).unwrap();
    }

    // -- Lifecycle commands ------------------------------------------------

    #[tokio::test]
    async fn add_user_persists_secrets_and_profile() {
        let server = MockServer::start().await;
        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();

        svc.add_user(
            &mut config,
            "main",
            AddUserParams {
                token: "EAAB-user".into(),
                app_id: "app-123".into(),
                app_secret: "s3cret".into(),
                scopes: vec!["ads_read".into(), "ads_read".into()],
                expires_in_seconds: None,
            },
        )
        .unwrap();

        let (_, profile) = config.resolve_profile(Some("main")).unwrap();
        assert_eq!(profile.token_type, TokenType::User);
        assert_eq!(profile.domain, gg_profile::DEFAULT_DOMAIN);
        assert_eq!(profile.graph_version, gg_profile::DEFAULT_GRAPH_VERSION);
        assert_eq!(profile.scopes, vec!["ads_read"]);
        assert_eq!(store.get(&profile.token_ref).unwrap(), "EAAB-user");
        assert_eq!(
            store.get(profile.app_secret_ref.as_ref().unwrap()).unwrap(),
            "s3cret"
        );

        // Sixty-day default expiry, within a minute of tolerance.
        let expected = Utc::now() + ChronoDuration::days(USER_TOKEN_LIFETIME_DAYS);
        let delta = (profile.expires_at - expected).num_seconds().abs();
        assert!(delta < 60, "expiry off by {delta}s");

        // First upsert set the default.
        assert_eq!(config.default_profile.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn add_user_honours_explicit_expiry() {
        let server = MockServer::start().await;
        let svc = service(&server);
        let mut config = ProfileConfig::default();
        svc.add_user(
            &mut config,
            "main",
            AddUserParams {
                token: "t".into(),
                app_id: "a".into(),
                app_secret: "s".into(),
                scopes: vec!["ads_read".into()],
                expires_in_seconds: Some(5_183_944),
            },
        )
        .unwrap();
        let (_, profile) = config.resolve_profile(None).unwrap();
        let delta = (profile.expires_at - profile.issued_at).num_seconds();
        assert_eq!(delta, 5_183_944);
    }

    #[tokio::test]
    async fn add_system_user_is_long_lived_without_app_secret() {
        let server = MockServer::start().await;
        let svc = service(&server);
        let mut config = ProfileConfig::default();
        svc.add_system_user(
            &mut config,
            "su",
            "SU-token",
            Some("biz-1".into()),
            None,
            vec!["ads_management".into()],
        )
        .unwrap();

        let (_, profile) = config.resolve_profile(Some("su")).unwrap();
        assert_eq!(profile.token_type, TokenType::SystemUser);
        assert!(profile.app_secret_ref.is_none());
        assert!(
            profile.expires_at - profile.issued_at
                >= ChronoDuration::days(SYSTEM_TOKEN_LIFETIME_DAYS - 1)
        );
    }

    #[tokio::test]
    async fn lifecycle_commands_reject_blank_inputs() {
        let server = MockServer::start().await;
        let svc = service(&server);
        let mut config = ProfileConfig::default();

        let err = svc
            .add_system_user(&mut config, "su", " ", None, None, vec![])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);

        let err = svc
            .set_app_token(&mut config, "app", "app-1", "", "tok", vec!["x".into()])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    // -- Exchanges -----------------------------------------------------------

    #[tokio::test]
    async fn long_lived_exchange_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/oauth/access_token"))
            .and(query_param("grant_type", "fb_exchange_token"))
            .and(query_param("client_id", "app-123"))
            .and(query_param("client_secret", "secret-123"))
            .and(query_param("fb_exchange_token", "short-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "long-token",
                "expires_in": 5_183_944,
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let cancel = CancellationToken::new();
        let result = svc
            .exchange_long_lived_user_token(&cancel, "app-123", "secret-123", "short-token", V)
            .await
            .unwrap();
        assert_eq!(result.token, "long-token");
        assert_eq!(result.expires_in_seconds, 5_183_944);
    }

    #[tokio::test]
    async fn long_lived_exchange_accepts_string_expires_in() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "long-token",
                "expires_in": "5183944",
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let cancel = CancellationToken::new();
        let result = svc
            .exchange_long_lived_user_token(&cancel, "a", "s", "short", V)
            .await
            .unwrap();
        assert_eq!(result.expires_in_seconds, 5_183_944);
    }

    #[tokio::test]
    async fn code_exchange_posts_form_and_requires_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v25.0/oauth/access_token"))
            .and(wiremock::matchers::body_string_contains("code_verifier=ver-1"))
            .and(wiremock::matchers::body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token"
            })))
            .mount(&server)
            .await;

        let svc = service(&server);
        let cancel = CancellationToken::new();
        let token = svc
            .exchange_oauth_code(
                &cancel,
                "app-123",
                "http://127.0.0.1:8400/callback",
                "auth-code",
                "ver-1",
                V,
            )
            .await
            .unwrap();
        assert_eq!(token, "fresh-token");
    }

    #[tokio::test]
    async fn missing_access_token_in_exchange_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"})))
            .mount(&server)
            .await;

        let svc = service(&server);
        let cancel = CancellationToken::new();
        let err = svc
            .fetch_app_token(&cancel, "a", "s", V)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamError);
    }

    // -- Page derivation -------------------------------------------------------

    #[tokio::test]
    async fn derive_page_token_creates_back_referenced_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/424242"))
            .and(query_param("fields", "access_token"))
            .and(query_param("access_token", "user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "page-token",
                "id": "424242",
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();
        seeded_user_profile(&store, &mut config, "main", true);

        let cancel = CancellationToken::new();
        svc.derive_page_token(&cancel, &mut config, "main-page", "424242", Some("main"))
            .await
            .unwrap();

        let (_, derived) = config.resolve_profile(Some("main-page")).unwrap();
        assert_eq!(derived.token_type, TokenType::Page);
        assert_eq!(derived.page_id.as_deref(), Some("424242"));
        assert_eq!(derived.source_profile.as_deref(), Some("main"));
        assert_eq!(derived.app_id.as_deref(), Some("app-123"));
        assert!(derived.scopes.contains(&"pages_read_engagement".to_string()));
        assert!(derived.scopes.contains(&"ads_read".to_string()));
        assert_eq!(store.get(&derived.token_ref).unwrap(), "page-token");
        // The derived profile owns its own app-secret copy.
        assert_eq!(
            derived.app_secret_ref.as_ref().unwrap().profile,
            "main-page"
        );
    }

    #[tokio::test]
    async fn derive_survives_missing_source_only_at_validation_time() {
        let server = MockServer::start().await;
        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();

        let cancel = CancellationToken::new();
        let err = svc
            .derive_page_token(&cancel, &mut config, "p", "42", Some("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigProfileNotFound);
    }

    // -- Introspection -----------------------------------------------------------

    #[tokio::test]
    async fn validate_profile_uses_app_token_when_app_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/oauth/access_token"))
            .and(query_param("grant_type", "client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "app-access-token"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v25.0/debug_token"))
            .and(query_param("input_token", "user-token"))
            .and(query_param("access_token", "app-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"is_valid": true, "scopes": ["ads_read"], "expires_at": 0}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();
        seeded_user_profile(&store, &mut config, "main", true);
        let before = config.resolve_profile(None).unwrap().1.last_validated_at;

        let cancel = CancellationToken::new();
        let meta = svc
            .validate_profile(&cancel, &mut config, Some("main"))
            .await
            .unwrap();
        assert!(meta.is_valid);
        assert_eq!(meta.scopes, vec!["ads_read"]);

        let after = config.resolve_profile(None).unwrap().1.last_validated_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn validate_without_app_introspects_with_subject_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/debug_token"))
            .and(query_param("input_token", "user-token"))
            .and(query_param("access_token", "user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"is_valid": false}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();
        seeded_user_profile(&store, &mut config, "main", false);
        let before = config.resolve_profile(None).unwrap().1.last_validated_at;

        let cancel = CancellationToken::new();
        let meta = svc
            .validate_profile(&cancel, &mut config, None)
            .await
            .unwrap();
        assert!(!meta.is_valid);
        // Invalid tokens do not bump last_validated_at.
        let after = config.resolve_profile(None).unwrap().1.last_validated_at;
        assert_eq!(after, before);
    }

    // -- Rotation ------------------------------------------------------------------

    #[tokio::test]
    async fn rotate_app_profile_overwrites_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v25.0/oauth/access_token"))
            .and(query_param("grant_type", "client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "rotated-token"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();
        svc.set_app_token(
            &mut config,
            "app",
            "app-123",
            "s3cret",
            "old-token",
            vec!["public_profile".into()],
        )
        .unwrap();

        let cancel = CancellationToken::new();
        svc.rotate_profile(&cancel, &config, Some("app")).await.unwrap();

        let (_, profile) = config.resolve_profile(Some("app")).unwrap();
        assert_eq!(store.get(&profile.token_ref).unwrap(), "rotated-token");
    }

    #[tokio::test]
    async fn rotate_non_app_profile_is_unsupported() {
        let server = MockServer::start().await;
        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let mut config = ProfileConfig::default();
        seeded_user_profile(&store, &mut config, "main", true);

        let cancel = CancellationToken::new();
        let err = svc
            .rotate_profile(&cancel, &config, Some("main"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RotationUnsupported);
        assert_eq!(err.kind(), gg_error::ErrorKind::AuthValidation);
    }

    // -- Pre-flight -------------------------------------------------------------------

    async fn mock_debug(server: &MockServer, data: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/v25.0/debug_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
            .mount(server)
            .await;
    }

    fn preflight_profile(store: &MemorySecretStore) -> Profile {
        let mut config = ProfileConfig::default();
        seeded_user_profile(store, &mut config, "main", false);
        config.resolve_profile(None).unwrap().1.clone()
    }

    #[tokio::test]
    async fn ensure_valid_rejects_ttl_below_minimum() {
        let server = MockServer::start().await;
        let in_five_minutes = (Utc::now() + ChronoDuration::minutes(5)).timestamp();
        mock_debug(
            &server,
            json!({"is_valid": true, "scopes": ["ads_read"], "expires_at": in_five_minutes}),
        )
        .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let profile = preflight_profile(&store);

        let cancel = CancellationToken::new();
        let err = svc
            .ensure_valid(
                &cancel,
                &profile,
                Duration::from_secs(600),
                &["ads_read".into()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BelowMinimumTtl);
        assert_eq!(err.kind(), gg_error::ErrorKind::AuthValidation);
    }

    #[tokio::test]
    async fn ensure_valid_rejects_invalid_and_expired_tokens() {
        let server = MockServer::start().await;
        mock_debug(&server, json!({"is_valid": false})).await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let profile = preflight_profile(&store);
        let cancel = CancellationToken::new();

        let err = svc
            .ensure_valid(&cancel, &profile, Duration::ZERO, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);

        server.reset().await;
        let past = (Utc::now() - ChronoDuration::hours(1)).timestamp();
        mock_debug(&server, json!({"is_valid": true, "expires_at": past})).await;
        let err = svc
            .ensure_valid(&cancel, &profile, Duration::ZERO, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[tokio::test]
    async fn ensure_valid_reports_sorted_missing_scopes() {
        let server = MockServer::start().await;
        mock_debug(
            &server,
            json!({"is_valid": true, "scopes": ["ads_read"], "expires_at": 0}),
        )
        .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let profile = preflight_profile(&store);
        let cancel = CancellationToken::new();

        let err = svc
            .ensure_valid(
                &cancel,
                &profile,
                Duration::ZERO,
                &[
                    "pages_show_list".into(),
                    "ads_management".into(),
                    "ads_read".into(),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingScopes);
        assert!(
            err.message
                .contains("ads_management, pages_show_list"),
            "message: {}",
            err.message
        );
    }

    #[tokio::test]
    async fn ensure_valid_passes_never_expiring_token() {
        let server = MockServer::start().await;
        mock_debug(
            &server,
            json!({"is_valid": true, "scopes": ["ads_read"], "expires_at": 0}),
        )
        .await;

        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let profile = preflight_profile(&store);
        let cancel = CancellationToken::new();

        let meta = svc
            .ensure_valid(
                &cancel,
                &profile,
                Duration::from_secs(3600),
                &["ads_read".into()],
            )
            .await
            .unwrap();
        assert!(meta.expires_at.is_none());
    }

    #[tokio::test]
    async fn ensure_valid_rejects_blank_required_scope() {
        let server = MockServer::start().await;
        let store = Arc::new(MemorySecretStore::new(DEFAULT_SERVICE));
        let svc = service_with_store(&server, store.clone());
        let profile = preflight_profile(&store);
        let cancel = CancellationToken::new();

        let err = svc
            .ensure_valid(&cancel, &profile, Duration::ZERO, &[" ".into()])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BlankScope);
        // No upstream call was made: fail-closed before introspection.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn sanitize_sorts_and_dedupes() {
        let scopes = vec![
            "pages_show_list".to_string(),
            "ads_read".to_string(),
            "ads_read".to_string(),
        ];
        assert_eq!(
            sanitize_required_scopes(&scopes).unwrap(),
            vec!["ads_read", "pages_show_list"]
        );
    }
}
