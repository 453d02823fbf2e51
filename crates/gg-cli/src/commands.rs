// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.
//!
//! Each invocation constructs its services, runs one command, and drops
//! them; nothing here is process-global.

use crate::config::load_governance;
use gg_auth::{
    AddUserParams, CallbackListener, CredentialService, Pkce, build_oauth_url_with_state,
    generate_oauth_state, normalize_debug_metadata, open_browser,
};
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorCode, Result};
use gg_governance::{
    ApprovalDecision, AuditPipeline, CommandRequest, GovernancePipeline,
};
use gg_graph::{GraphClient, GraphRequest, Method};
use gg_profile::ProfileConfig;
use gg_secret::SecretStore;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    /// Path to the profile config document.
    pub profiles_path: PathBuf,
    /// Path to the governance document.
    pub governance_path: PathBuf,
    /// Emit JSON envelopes instead of readable text.
    pub json: bool,
    /// Cancellation token wired to Ctrl-C.
    pub cancel: CancellationToken,
    /// Secret store backend.
    pub secrets: Arc<dyn SecretStore>,
    /// Authenticated Graph caller.
    pub graph: GraphClient,
}

impl AppContext {
    fn credentials(&self) -> CredentialService {
        CredentialService::new(self.secrets.clone(), self.graph.clone())
    }

    fn load_profiles(&self) -> Result<ProfileConfig> {
        if self.profiles_path.exists() {
            gg_profile::load(&self.profiles_path)
        } else {
            Ok(ProfileConfig::default())
        }
    }

    fn save_profiles(&self, config: &ProfileConfig) -> Result<()> {
        gg_profile::save(&self.profiles_path, config)
    }

    fn governance(&self) -> Result<GovernancePipeline> {
        let (directory, policies, signer) =
            load_governance(&self.governance_path)?.into_parts()?;
        Ok(GovernancePipeline::new(directory, policies, signer))
    }
}

/// Default location of a config document under the user's home.
pub fn default_config_path(file: &str) -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".graphgate").join(file),
        None => PathBuf::from(file),
    }
}

/// Parse repeated `key=value` flags into a map.
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidArgument,
                format!("parameter '{entry}' is not of the form key=value"),
            )
        })?;
        if key.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                format!("parameter '{entry}' has an empty key"),
            ));
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}

// ---------------------------------------------------------------------------
// auth: lifecycle
// ---------------------------------------------------------------------------

pub fn auth_add_system_user(
    ctx: &AppContext,
    name: &str,
    token: &str,
    business_id: Option<String>,
    app_id: Option<String>,
    scopes: Vec<String>,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let mut profiles = ctx.load_profiles()?;
    service.add_system_user(&mut profiles, name, token, business_id, app_id, scopes)?;
    ctx.save_profiles(&profiles)?;
    Ok(json!({"profile": name, "token_type": "system_user"}))
}

pub fn auth_add_user(
    ctx: &AppContext,
    name: &str,
    token: &str,
    app_id: &str,
    app_secret: &str,
    scopes: Vec<String>,
    expires_in_seconds: Option<i64>,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let mut profiles = ctx.load_profiles()?;
    service.add_user(
        &mut profiles,
        name,
        AddUserParams {
            token: token.to_string(),
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            scopes,
            expires_in_seconds,
        },
    )?;
    ctx.save_profiles(&profiles)?;
    Ok(json!({"profile": name, "token_type": "user"}))
}

pub async fn auth_set_app_token(
    ctx: &AppContext,
    name: &str,
    app_id: &str,
    app_secret: &str,
    token: Option<String>,
    scopes: Vec<String>,
    version: &str,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let token = match token {
        Some(token) => token,
        // No literal token supplied: fetch one via client_credentials.
        None => {
            service
                .fetch_app_token(&ctx.cancel, app_id, app_secret, version)
                .await?
        }
    };
    let mut profiles = ctx.load_profiles()?;
    service.set_app_token(&mut profiles, name, app_id, app_secret, &token, scopes)?;
    ctx.save_profiles(&profiles)?;
    Ok(json!({"profile": name, "token_type": "app"}))
}

#[allow(clippy::too_many_arguments)]
pub async fn auth_login(
    ctx: &AppContext,
    name: &str,
    app_id: &str,
    app_secret: &str,
    redirect_uri: &str,
    scopes: Vec<String>,
    version: &str,
    timeout: Duration,
    no_browser: bool,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let pkce = Pkce::generate();
    let state = generate_oauth_state();

    let listener = CallbackListener::bind(redirect_uri, &state).await?;
    let effective_redirect = listener.local_url().to_string();
    let auth_url = build_oauth_url_with_state(
        app_id,
        &effective_redirect,
        &scopes,
        &pkce.challenge,
        &state,
        version,
    )?;

    println!("Open this URL to authorize:\n  {auth_url}");
    if !no_browser
        && let Err(e) = open_browser(&auth_url)
    {
        tracing::warn!(error = %e, "could not launch a browser; open the URL manually");
    }

    let code = listener.wait(&ctx.cancel, timeout).await?;
    let short_token = service
        .exchange_oauth_code(
            &ctx.cancel,
            app_id,
            &effective_redirect,
            &code,
            &pkce.verifier,
            version,
        )
        .await?;
    let long_lived = service
        .exchange_long_lived_user_token(&ctx.cancel, app_id, app_secret, &short_token, version)
        .await?;

    let mut profiles = ctx.load_profiles()?;
    service.add_user(
        &mut profiles,
        name,
        AddUserParams {
            token: long_lived.token,
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            scopes,
            expires_in_seconds: (long_lived.expires_in_seconds > 0)
                .then_some(long_lived.expires_in_seconds),
        },
    )?;
    ctx.save_profiles(&profiles)?;
    Ok(json!({
        "profile": name,
        "token_type": "user",
        "expires_in_seconds": long_lived.expires_in_seconds,
    }))
}

pub async fn auth_derive_page(
    ctx: &AppContext,
    name: &str,
    page_id: &str,
    source: Option<&str>,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let mut profiles = ctx.load_profiles()?;
    service
        .derive_page_token(&ctx.cancel, &mut profiles, name, page_id, source)
        .await?;
    ctx.save_profiles(&profiles)?;
    Ok(json!({"profile": name, "token_type": "page", "page_id": page_id}))
}

pub fn auth_remove(ctx: &AppContext, name: &str) -> Result<serde_json::Value> {
    let mut profiles = ctx.load_profiles()?;
    let removed = profiles.remove_profile(name)?;
    // Best effort: the profile record is authoritative, stray entries are
    // harmless.
    if let Err(e) = ctx.secrets.delete(&removed.token_ref) {
        tracing::warn!(error = %e, "token secret was not deleted");
    }
    if let Some(reference) = &removed.app_secret_ref
        && let Err(e) = ctx.secrets.delete(reference)
    {
        tracing::warn!(error = %e, "app secret was not deleted");
    }
    ctx.save_profiles(&profiles)?;
    Ok(json!({"removed": name}))
}

pub fn auth_list(ctx: &AppContext) -> Result<serde_json::Value> {
    let profiles = ctx.load_profiles()?;
    let entries: Vec<serde_json::Value> = profiles
        .profiles
        .iter()
        .map(|(name, profile)| {
            json!({
                "name": name,
                "token_type": profile.token_type.to_string(),
                "domain": profile.domain,
                "graph_version": profile.graph_version,
                "expires_at": profile.expires_at,
                "is_default": profiles.default_profile.as_deref() == Some(name),
            })
        })
        .collect();
    Ok(json!({"profiles": entries}))
}

// ---------------------------------------------------------------------------
// auth: introspection
// ---------------------------------------------------------------------------

pub async fn auth_debug(
    ctx: &AppContext,
    token: &str,
    access_token: &str,
    version: &str,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let response = service
        .debug_token(&ctx.cancel, version, token, access_token)
        .await?;
    let metadata = normalize_debug_metadata(&response)?;
    Ok(serde_json::to_value(metadata).unwrap_or_default())
}

pub async fn auth_validate(
    ctx: &AppContext,
    profile: Option<&str>,
) -> Result<serde_json::Value> {
    let service = ctx.credentials();
    let mut profiles = ctx.load_profiles()?;
    let metadata = service
        .validate_profile(&ctx.cancel, &mut profiles, profile)
        .await?;
    ctx.save_profiles(&profiles)?;
    Ok(serde_json::to_value(metadata).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Governed commands
// ---------------------------------------------------------------------------

/// Flags shared by every governed invocation.
pub struct GovernedArgs {
    pub principal: String,
    pub org: Option<String>,
    pub workspace: String,
    pub approval_token: Option<String>,
    pub correlation_id: Option<String>,
}

impl GovernedArgs {
    fn into_request(self, command: &str) -> CommandRequest {
        CommandRequest {
            principal: self.principal,
            command: command.to_string(),
            org: self.org,
            workspace: self.workspace,
            approval_token: self.approval_token,
            correlation_id: self
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}

pub async fn auth_rotate(
    ctx: &AppContext,
    profile: Option<&str>,
    governed: GovernedArgs,
) -> Result<(serde_json::Value, AuditPipeline)> {
    let pipeline = ctx.governance()?;
    let mut audit = AuditPipeline::new();
    let request = governed.into_request("auth rotate");

    let service = ctx.credentials();
    let profiles = ctx.load_profiles()?;
    let (_, resolved) = profiles.resolve_profile(profile)?;
    let resolved = resolved.clone();

    let secrets = ctx.secrets.clone();
    let cancel = ctx.cancel.clone();
    let result = pipeline
        .execute_command(
            &ctx.cancel,
            &mut audit,
            &request,
            move |_| async move {
                // The rotation must be able to reach both stored secrets.
                secrets.get(&resolved.token_ref)?;
                secrets.get(resolved.require_app_secret_ref()?)?;
                Ok(())
            },
            move |_| async move {
                service.rotate_profile(&cancel, &profiles, profile).await?;
                Ok(json!({"rotated": true}))
            },
        )
        .await;
    result.map(|value| (value, audit))
}

#[allow(clippy::too_many_arguments)]
pub async fn call(
    ctx: &AppContext,
    method: Method,
    path: &str,
    params: BTreeMap<String, String>,
    profile: Option<&str>,
    min_ttl: Duration,
    required_scopes: Vec<String>,
    governed: GovernedArgs,
) -> Result<(serde_json::Value, AuditPipeline)> {
    let command = match method {
        Method::Get => "call get",
        Method::Post => "call post",
    };
    let pipeline = ctx.governance()?;
    let mut audit = AuditPipeline::new();
    let request = governed.into_request(command);

    let service = ctx.credentials();
    let profiles = ctx.load_profiles()?;
    let (_, resolved) = profiles.resolve_profile(profile)?;
    let resolved = resolved.clone();
    let preflight_profile = resolved.clone();

    let secrets = ctx.secrets.clone();
    let graph = ctx.graph.clone();
    let preflight_cancel = ctx.cancel.clone();
    let execute_cancel = ctx.cancel.clone();
    let path = path.to_string();
    let result = pipeline
        .execute_command(
            &ctx.cancel,
            &mut audit,
            &request,
            move |_| async move {
                service
                    .ensure_valid(
                        &preflight_cancel,
                        &preflight_profile,
                        min_ttl,
                        &required_scopes,
                    )
                    .await?;
                Ok(())
            },
            move |_| async move {
                let token = secrets.get(&resolved.token_ref)?;
                let mut graph_request = GraphRequest {
                    method,
                    version: resolved.graph_version.clone(),
                    path,
                    params,
                    json_body: None,
                    token: Some(token),
                    app_secret: None,
                };
                if let Some(reference) = &resolved.app_secret_ref {
                    graph_request.app_secret = Some(secrets.get(reference)?);
                }
                graph.execute(&execute_cancel, &graph_request).await
            },
        )
        .await;
    result.map(|value| (value, audit))
}

// ---------------------------------------------------------------------------
// Approvals
// ---------------------------------------------------------------------------

/// Mint a request token, as a governed invocation of `approval request`.
///
/// The acting principal is the requester; the embedded org and workspace
/// are the resolved coordinates the pipeline authorized against.
pub async fn approval_request(
    ctx: &AppContext,
    target_command: &str,
    ttl: Duration,
    governed: GovernedArgs,
) -> Result<(serde_json::Value, AuditPipeline)> {
    let pipeline = ctx.governance()?;
    let mut audit = AuditPipeline::new();
    let requester = governed.principal.clone();
    let request = governed.into_request("approval request");

    let signer = pipeline.signer();
    let target_command = target_command.to_string();
    let result = pipeline
        .execute_command(
            &ctx.cancel,
            &mut audit,
            &request,
            move |_| async move { Ok(()) },
            move |authorized| async move {
                let token = signer.mint_request(
                    &requester,
                    &target_command,
                    &authorized.workspace.org_name,
                    &authorized.workspace.workspace_name,
                    ttl,
                )?;
                Ok(json!({"request_token": token}))
            },
        )
        .await;
    result.map(|value| (value, audit))
}

/// Answer a request token, as a governed invocation of `approval grant`.
///
/// Granting is itself high-risk: the acting principal (the approver) needs
/// both an `approval.grant` binding and, per the high-risk set, an approval
/// grant of their own. The bootstrap grant comes from whoever holds the
/// config signing key, which is the trust root either way.
pub async fn approval_grant(
    ctx: &AppContext,
    request_token: &str,
    approve: bool,
    ttl: Duration,
    governed: GovernedArgs,
) -> Result<(serde_json::Value, AuditPipeline)> {
    let pipeline = ctx.governance()?;
    let mut audit = AuditPipeline::new();
    let approver = governed.principal.clone();
    let request = governed.into_request("approval grant");

    let decision = if approve {
        ApprovalDecision::Approved
    } else {
        ApprovalDecision::Rejected
    };
    let signer = pipeline.signer();
    let request_token = request_token.to_string();
    let result = pipeline
        .execute_command(
            &ctx.cancel,
            &mut audit,
            &request,
            move |_| async move { Ok(()) },
            move |_| async move {
                let token = signer.mint_grant(&request_token, &approver, decision, ttl)?;
                Ok(json!({"grant_token": token}))
            },
        )
        .await;
    result.map(|value| (value, audit))
}
