// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unified error taxonomy with stable error codes for graphgate.
//!
//! Every graphgate error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context.  Use the builder returned by [`Error::new`]
//! to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
///
/// Kinds are what the CLI dispatcher maps to exit codes; codes are what
/// tests and structured output discriminate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Invalid or missing user-provided argument.
    Input,
    /// Profile config malformed, schema mismatch, unknown field.
    Config,
    /// Secret not found, empty, or backend failure.
    Secret,
    /// Token invalid, expired, below minimum TTL, or missing scopes.
    AuthValidation,
    /// Interactive OAuth flow failure.
    OauthFlow,
    /// Upstream API error envelope or non-2xx response body.
    UpstreamApi,
    /// Authorization denied by policy or approval checks.
    PolicyDenied,
    /// Audit-chain invariant violation.
    GovernanceIntegrity,
    /// Network or I/O failure.
    Transport,
    /// Caller cancellation.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Config => "config",
            Self::Secret => "secret",
            Self::AuthValidation => "auth-validation",
            Self::OauthFlow => "oauth-flow",
            Self::UpstreamApi => "upstream-api",
            Self::PolicyDenied => "policy-denied",
            Self::GovernanceIntegrity => "governance-integrity",
            Self::Transport => "transport",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Input --
    /// An argument value is invalid or missing.
    InvalidArgument,
    /// A scope entry is blank or whitespace-only.
    BlankScope,
    /// The redirect URI does not satisfy the loopback grammar.
    MalformedRedirect,
    /// A secret reference string does not parse.
    MalformedSecretRef,
    /// The org or workspace hint does not resolve to a known workspace.
    WorkspaceUnknown,
    /// A bare workspace name matches more than one org.
    WorkspaceAmbiguous,

    // -- Config --
    /// Config file missing or unreadable.
    ConfigRead,
    /// Config file failed to parse (syntax, unknown field, wrong type).
    ConfigParse,
    /// Config schema version does not match the supported version.
    ConfigSchemaVersion,
    /// A profile record failed semantic validation.
    ConfigInvalidProfile,
    /// The named profile (or any default) could not be resolved.
    ConfigProfileNotFound,
    /// Config file could not be written atomically.
    ConfigWrite,

    // -- Secret --
    /// The referenced secret does not exist in the store.
    SecretNotFound,
    /// The secret value is empty.
    SecretEmpty,
    /// The secret backend itself failed.
    SecretBackend,

    // -- AuthValidation --
    /// Debug-token introspection reports the token invalid.
    TokenInvalid,
    /// The token expiry is in the past.
    TokenExpired,
    /// The token expires before the required minimum TTL.
    BelowMinimumTtl,
    /// One or more required scopes are not granted.
    MissingScopes,
    /// Rotation was requested for a token type that does not support it.
    RotationUnsupported,
    /// The debug-token response shape is not usable.
    DebugResponseInvalid,

    // -- OauthFlow --
    /// The provider redirected back with an error parameter.
    ProviderError,
    /// The callback state does not match the expected state.
    StateMismatch,
    /// The callback carried no authorization code.
    CodeMissing,
    /// The callback listener timed out before any resolution.
    ListenerTimeout,
    /// No browser launch command is known for this operating system.
    BrowserUnsupportedOs,

    // -- UpstreamApi --
    /// The response body carried a Graph error envelope.
    UpstreamError,

    // -- PolicyDenied --
    /// The principal has no binding in the workspace.
    NoBinding,
    /// No role binding grants the required capability.
    MissingCapability,
    /// A role binding explicitly denies the capability.
    ExplicitDeny,
    /// A high-risk command was invoked without an approval grant.
    ApprovalMissing,
    /// The approval grant has expired.
    ApprovalExpired,
    /// The approval grant records a rejection.
    ApprovalRejected,
    /// The approval grant does not match the current command context.
    ApprovalMismatched,
    /// The approval token signature or nonce check failed.
    ApprovalInvalid,

    // -- GovernanceIntegrity --
    /// A second decision event was recorded for a correlation id.
    DuplicateDecision,
    /// An execution event was recorded without a prior decision.
    ExecutionWithoutDecision,
    /// An execution event was recorded against a denied decision.
    ExecutionOnDenied,
    /// A stored event fails digest or sequence verification.
    ChainBroken,

    // -- Transport --
    /// The HTTP request failed below the application layer.
    HttpTransport,
    /// Local I/O failed.
    Io,

    // -- Cancelled --
    /// The caller's cancellation token fired.
    OperationCancelled,
}

impl ErrorCode {
    /// Returns the broad [`ErrorKind`] this code belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument
            | Self::BlankScope
            | Self::MalformedRedirect
            | Self::MalformedSecretRef
            | Self::WorkspaceUnknown
            | Self::WorkspaceAmbiguous => ErrorKind::Input,

            Self::ConfigRead
            | Self::ConfigParse
            | Self::ConfigSchemaVersion
            | Self::ConfigInvalidProfile
            | Self::ConfigProfileNotFound
            | Self::ConfigWrite => ErrorKind::Config,

            Self::SecretNotFound | Self::SecretEmpty | Self::SecretBackend => ErrorKind::Secret,

            Self::TokenInvalid
            | Self::TokenExpired
            | Self::BelowMinimumTtl
            | Self::MissingScopes
            | Self::RotationUnsupported
            | Self::DebugResponseInvalid => ErrorKind::AuthValidation,

            Self::ProviderError
            | Self::StateMismatch
            | Self::CodeMissing
            | Self::ListenerTimeout
            | Self::BrowserUnsupportedOs => ErrorKind::OauthFlow,

            Self::UpstreamError => ErrorKind::UpstreamApi,

            Self::NoBinding
            | Self::MissingCapability
            | Self::ExplicitDeny
            | Self::ApprovalMissing
            | Self::ApprovalExpired
            | Self::ApprovalRejected
            | Self::ApprovalMismatched
            | Self::ApprovalInvalid => ErrorKind::PolicyDenied,

            Self::DuplicateDecision
            | Self::ExecutionWithoutDecision
            | Self::ExecutionOnDenied
            | Self::ChainBroken => ErrorKind::GovernanceIntegrity,

            Self::HttpTransport | Self::Io => ErrorKind::Transport,

            Self::OperationCancelled => ErrorKind::Cancelled,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"STATE_MISMATCH"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::BlankScope => "BLANK_SCOPE",
            Self::MalformedRedirect => "MALFORMED_REDIRECT",
            Self::MalformedSecretRef => "MALFORMED_SECRET_REF",
            Self::WorkspaceUnknown => "WORKSPACE_UNKNOWN",
            Self::WorkspaceAmbiguous => "WORKSPACE_AMBIGUOUS",
            Self::ConfigRead => "CONFIG_READ",
            Self::ConfigParse => "CONFIG_PARSE",
            Self::ConfigSchemaVersion => "CONFIG_SCHEMA_VERSION",
            Self::ConfigInvalidProfile => "CONFIG_INVALID_PROFILE",
            Self::ConfigProfileNotFound => "CONFIG_PROFILE_NOT_FOUND",
            Self::ConfigWrite => "CONFIG_WRITE",
            Self::SecretNotFound => "SECRET_NOT_FOUND",
            Self::SecretEmpty => "SECRET_EMPTY",
            Self::SecretBackend => "SECRET_BACKEND",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::BelowMinimumTtl => "BELOW_MINIMUM_TTL",
            Self::MissingScopes => "MISSING_SCOPES",
            Self::RotationUnsupported => "ROTATION_UNSUPPORTED",
            Self::DebugResponseInvalid => "DEBUG_RESPONSE_INVALID",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::CodeMissing => "CODE_MISSING",
            Self::ListenerTimeout => "LISTENER_TIMEOUT",
            Self::BrowserUnsupportedOs => "BROWSER_UNSUPPORTED_OS",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::NoBinding => "NO_BINDING",
            Self::MissingCapability => "MISSING_CAPABILITY",
            Self::ExplicitDeny => "EXPLICIT_DENY",
            Self::ApprovalMissing => "APPROVAL_MISSING",
            Self::ApprovalExpired => "APPROVAL_EXPIRED",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
            Self::ApprovalMismatched => "APPROVAL_MISMATCHED",
            Self::ApprovalInvalid => "APPROVAL_INVALID",
            Self::DuplicateDecision => "DUPLICATE_DECISION",
            Self::ExecutionWithoutDecision => "EXECUTION_WITHOUT_DECISION",
            Self::ExecutionOnDenied => "EXECUTION_ON_DENIED",
            Self::ChainBroken => "CHAIN_BROKEN",
            Self::HttpTransport => "HTTP_TRANSPORT",
            Self::Io => "IO",
            Self::OperationCancelled => "OPERATION_CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Unified graphgate error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use gg_error::{Error, ErrorCode};
///
/// let err = Error::new(ErrorCode::BelowMinimumTtl, "token expires too soon")
///     .with_context("profile", "marketing-eu")
///     .with_context("min_ttl_secs", 600);
/// ```
pub struct Error {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.kind()`.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Error");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of an [`Error`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Broad kind, for consumers that only dispatch on the family.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&Error> for ErrorDto {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code,
            kind: err.kind(),
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<ErrorDto> for Error {
    fn from(dto: ErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
