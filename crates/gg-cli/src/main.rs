// SPDX-License-Identifier: MIT OR Apache-2.0

//! graphgate: governed credential broker for versioned Graph API calls.

#![deny(unsafe_code)]

mod commands;
mod config;
mod format;

use clap::{Parser, Subcommand};
use commands::{AppContext, GovernedArgs};
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorKind};
use gg_graph::{GraphClient, Method};
use gg_profile::DEFAULT_GRAPH_VERSION;
use gg_secret::{DEFAULT_SERVICE, KeyringSecretStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit codes by error kind; `0` is success and clap owns usage errors.
fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Input => 2,
        ErrorKind::Config => 3,
        ErrorKind::AuthValidation => 4,
        ErrorKind::OauthFlow => 5,
        ErrorKind::UpstreamApi => 6,
        ErrorKind::PolicyDenied => 7,
        ErrorKind::GovernanceIntegrity => 8,
        ErrorKind::Secret => 9,
        ErrorKind::Transport => 10,
        ErrorKind::Cancelled => 130,
    }
}

#[derive(Parser, Debug)]
#[command(name = "graphgate", version, about = "Governed Graph API credential broker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the profile config document.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the governance document.
    #[arg(long, global = true)]
    governance: Option<PathBuf>,

    /// Print JSON envelopes instead of readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Credential lifecycle and introspection.
    #[command(subcommand)]
    Auth(AuthCommands),

    /// Governed Graph API call.
    Call {
        /// HTTP method: get or post.
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Path below the version segment, e.g. `me/adaccounts`.
        path: String,

        /// Request parameter as key=value. Can be repeated.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Profile to call with; defaults to the configured default.
        #[arg(long)]
        profile: Option<String>,

        /// Minimum remaining token TTL in seconds, enforced pre-flight.
        #[arg(long, default_value_t = 0)]
        min_ttl_secs: u64,

        /// Scope the token must hold. Can be repeated.
        #[arg(long = "require-scope")]
        required_scopes: Vec<String>,

        #[command(flatten)]
        governed: GovernedFlags,
    },

    /// Approval token operations.
    #[command(subcommand)]
    Approval(ApprovalCommands),
}

#[derive(Subcommand, Debug)]
enum AuthCommands {
    /// Store a system-user token under a profile.
    AddSystemUser {
        /// Profile name.
        #[arg(long)]
        name: String,
        /// The system-user access token.
        #[arg(long)]
        token: String,
        /// Business id the token belongs to.
        #[arg(long)]
        business_id: Option<String>,
        /// App id, when known.
        #[arg(long)]
        app_id: Option<String>,
        /// Granted scope. Can be repeated.
        #[arg(long = "scope", required = true)]
        scopes: Vec<String>,
    },

    /// Store a user token and app secret under a profile.
    AddUser {
        /// Profile name.
        #[arg(long)]
        name: String,
        /// The user access token.
        #[arg(long)]
        token: String,
        /// App id the token belongs to.
        #[arg(long)]
        app_id: String,
        /// App secret for proof computation.
        #[arg(long)]
        app_secret: String,
        /// Granted scope. Can be repeated.
        #[arg(long = "scope", required = true)]
        scopes: Vec<String>,
        /// Seconds until expiry; defaults to sixty days.
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Store (or fetch) an app access token under a profile.
    SetAppToken {
        /// Profile name.
        #[arg(long)]
        name: String,
        /// App id.
        #[arg(long)]
        app_id: String,
        /// App secret.
        #[arg(long)]
        app_secret: String,
        /// Literal app token; omitted means fetch via client_credentials.
        #[arg(long)]
        token: Option<String>,
        /// Recorded scope. Can be repeated.
        #[arg(long = "scope", required = true)]
        scopes: Vec<String>,
        /// Graph version for the fetch.
        #[arg(long, default_value = DEFAULT_GRAPH_VERSION)]
        version: String,
    },

    /// Interactive OAuth login with PKCE.
    Login {
        /// Profile name to store the credential under.
        #[arg(long)]
        name: String,
        /// App id.
        #[arg(long)]
        app_id: String,
        /// App secret, for the long-lived exchange.
        #[arg(long)]
        app_secret: String,
        /// Loopback redirect URI, e.g. `http://127.0.0.1:0/callback`.
        #[arg(long, default_value = "http://127.0.0.1:0/callback")]
        redirect_uri: String,
        /// Scope to request. Can be repeated.
        #[arg(long = "scope", required = true)]
        scopes: Vec<String>,
        /// Graph version.
        #[arg(long, default_value = DEFAULT_GRAPH_VERSION)]
        version: String,
        /// Seconds to wait for the callback.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
        /// Print the URL without launching a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Derive a page token from an existing profile.
    DerivePage {
        /// New profile name.
        #[arg(long)]
        name: String,
        /// Page id to derive for.
        #[arg(long)]
        page_id: String,
        /// Source profile; defaults to the configured default.
        #[arg(long)]
        source: Option<String>,
    },

    /// Introspect an arbitrary token.
    Debug {
        /// Token to introspect.
        #[arg(long)]
        token: String,
        /// Access token to authenticate the introspection with.
        #[arg(long)]
        access_token: String,
        /// Graph version.
        #[arg(long, default_value = DEFAULT_GRAPH_VERSION)]
        version: String,
    },

    /// Debug-token a profile and stamp its last validation time.
    Validate {
        /// Profile name; defaults to the configured default.
        #[arg(long)]
        profile: Option<String>,
    },

    /// Rotate an app profile's token (governed, high-risk).
    Rotate {
        /// Profile name; defaults to the configured default.
        #[arg(long)]
        profile: Option<String>,

        #[command(flatten)]
        governed: GovernedFlags,
    },

    /// Remove a profile and its stored secrets.
    Remove {
        /// Profile name.
        #[arg(long)]
        name: String,
    },

    /// List configured profiles.
    List,
}

#[derive(Subcommand, Debug)]
enum ApprovalCommands {
    /// Mint a signed approval request token (governed).
    Request {
        /// Command reference the request asks to run, e.g. `auth rotate`.
        #[arg(long)]
        command: String,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 900)]
        ttl_secs: u64,

        #[command(flatten)]
        governed: GovernedFlags,
    },

    /// Answer a request token with a signed grant (governed, high-risk).
    ///
    /// The acting principal is recorded as the approver.
    Grant {
        /// The request token to answer.
        #[arg(long)]
        request_token: String,
        /// Approve (otherwise the grant records a rejection).
        #[arg(long)]
        approve: bool,
        /// Grant lifetime in seconds.
        #[arg(long, default_value_t = 900)]
        ttl_secs: u64,

        #[command(flatten)]
        governed: GovernedFlags,
    },
}

/// Flags every governed command carries.
#[derive(clap::Args, Debug)]
struct GovernedFlags {
    /// Acting principal.
    #[arg(long)]
    principal: String,
    /// Org hint; optional when the workspace is qualified or unique.
    #[arg(long)]
    org: Option<String>,
    /// Workspace, bare or `org/name`.
    #[arg(long)]
    workspace: String,
    /// Approval grant token for high-risk commands.
    #[arg(long)]
    approval: Option<String>,
    /// Correlation id; generated when omitted.
    #[arg(long)]
    correlation_id: Option<String>,
}

impl From<GovernedFlags> for GovernedArgs {
    fn from(flags: GovernedFlags) -> Self {
        Self {
            principal: flags.principal,
            org: flags.org,
            workspace: flags.workspace,
            approval_token: flags.approval,
            correlation_id: flags.correlation_id,
        }
    }
}

fn parse_method(raw: &str) -> Result<Method, String> {
    match raw.to_ascii_lowercase().as_str() {
        "get" => Ok(Method::Get),
        "post" => Ok(Method::Post),
        other => Err(format!("unsupported method '{other}' (expected get or post)")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("gg=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gg=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let ctx = AppContext {
        profiles_path: cli
            .config
            .unwrap_or_else(|| commands::default_config_path("profiles.toml")),
        governance_path: cli
            .governance
            .unwrap_or_else(|| commands::default_config_path("governance.toml")),
        json: cli.json,
        cancel,
        secrets: Arc::new(KeyringSecretStore::new(DEFAULT_SERVICE)),
        graph: GraphClient::new(),
    };

    match run(&ctx, cli.command).await {
        Ok(()) => {}
        Err(error) => {
            format::print_error(&error, ctx.json);
            std::process::exit(exit_code(error.kind()));
        }
    }
}

async fn run(ctx: &AppContext, command: Commands) -> Result<(), Error> {
    match command {
        Commands::Auth(auth) => run_auth(ctx, auth).await,
        Commands::Call {
            method,
            path,
            params,
            profile,
            min_ttl_secs,
            required_scopes,
            governed,
        } => {
            let params = commands::parse_params(&params)?;
            let (value, audit) = commands::call(
                ctx,
                method,
                &path,
                params,
                profile.as_deref(),
                Duration::from_secs(min_ttl_secs),
                required_scopes,
                governed.into(),
            )
            .await?;
            format::print_result(&value, ctx.json);
            format::print_audit_trail(&audit.events(), ctx.json);
            Ok(())
        }
        Commands::Approval(approval) => {
            let (value, audit) = match approval {
                ApprovalCommands::Request {
                    command,
                    ttl_secs,
                    governed,
                } => {
                    commands::approval_request(
                        ctx,
                        &command,
                        Duration::from_secs(ttl_secs),
                        governed.into(),
                    )
                    .await?
                }
                ApprovalCommands::Grant {
                    request_token,
                    approve,
                    ttl_secs,
                    governed,
                } => {
                    commands::approval_grant(
                        ctx,
                        &request_token,
                        approve,
                        Duration::from_secs(ttl_secs),
                        governed.into(),
                    )
                    .await?
                }
            };
            format::print_result(&value, ctx.json);
            format::print_audit_trail(&audit.events(), ctx.json);
            Ok(())
        }
    }
}

async fn run_auth(ctx: &AppContext, command: AuthCommands) -> Result<(), Error> {
    let value = match command {
        AuthCommands::AddSystemUser {
            name,
            token,
            business_id,
            app_id,
            scopes,
        } => commands::auth_add_system_user(ctx, &name, &token, business_id, app_id, scopes)?,
        AuthCommands::AddUser {
            name,
            token,
            app_id,
            app_secret,
            scopes,
            expires_in,
        } => commands::auth_add_user(
            ctx,
            &name,
            &token,
            &app_id,
            &app_secret,
            scopes,
            expires_in,
        )?,
        AuthCommands::SetAppToken {
            name,
            app_id,
            app_secret,
            token,
            scopes,
            version,
        } => {
            commands::auth_set_app_token(ctx, &name, &app_id, &app_secret, token, scopes, &version)
                .await?
        }
        AuthCommands::Login {
            name,
            app_id,
            app_secret,
            redirect_uri,
            scopes,
            version,
            timeout_secs,
            no_browser,
        } => {
            commands::auth_login(
                ctx,
                &name,
                &app_id,
                &app_secret,
                &redirect_uri,
                scopes,
                &version,
                Duration::from_secs(timeout_secs),
                no_browser,
            )
            .await?
        }
        AuthCommands::DerivePage {
            name,
            page_id,
            source,
        } => commands::auth_derive_page(ctx, &name, &page_id, source.as_deref()).await?,
        AuthCommands::Debug {
            token,
            access_token,
            version,
        } => commands::auth_debug(ctx, &token, &access_token, &version).await?,
        AuthCommands::Validate { profile } => {
            commands::auth_validate(ctx, profile.as_deref()).await?
        }
        AuthCommands::Rotate { profile, governed } => {
            let (value, audit) =
                commands::auth_rotate(ctx, profile.as_deref(), governed.into()).await?;
            format::print_audit_trail(&audit.events(), ctx.json);
            value
        }
        AuthCommands::Remove { name } => commands::auth_remove(ctx, &name)?,
        AuthCommands::List => commands::auth_list(ctx)?,
    };
    format::print_result(&value, ctx.json);
    Ok(())
}
