// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential lifecycle for graphgate.
//!
//! Everything between "the user wants a credential" and "a profile holds a
//! validated token reference" lives here: the interactive OAuth 2.0 PKCE
//! flow with its one-shot callback listener, short-lived to long-lived
//! exchange, app- and page-token derivation, debug-token introspection, and
//! the `ensure_valid` pre-flight gate that privileged operations call before
//! touching secrets.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod browser;
mod callback;
mod debug;
mod oauth;
mod service;

pub use browser::{browser_command, open_browser};
pub use callback::CallbackListener;
pub use debug::{DebugTokenResponse, TokenMetadata, normalize_debug_metadata};
pub use oauth::{
    DEFAULT_DIALOG_HOST, Pkce, build_oauth_url, build_oauth_url_with_state, generate_oauth_state,
    pkce_challenge_for,
};
pub use service::{
    AddUserParams, CredentialService, LongLivedToken, SYSTEM_TOKEN_LIFETIME_DAYS,
    USER_TOKEN_LIFETIME_DAYS, sanitize_required_scopes,
};
