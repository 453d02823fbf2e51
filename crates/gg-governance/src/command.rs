// SPDX-License-Identifier: MIT OR Apache-2.0

//! The fail-closed command pipeline:
//! resolve → authorize (decision event) → secret hooks → execute →
//! execution event.

use crate::approval::{ApprovalDecision, ReplayStore, TokenSigner};
use crate::audit::{AuditPipeline, DecisionRecord, ExecutionRecord, ExecutionStatus};
use crate::policy::{DecisionTrace, PolicyRequest, PolicySet};
use crate::workspace::{Directory, WorkspaceRef};
use chrono::Utc;
use gg_cancel::CancellationToken;
use gg_error::{Error, ErrorCode, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

/// Command reference to required capability, maintained alongside the
/// rulepack.
pub fn default_capability_map() -> BTreeMap<String, String> {
    [
        ("auth add-system-user", "auth.write"),
        ("auth add-user", "auth.write"),
        ("auth set-app-token", "auth.write"),
        ("auth login", "auth.write"),
        ("auth derive-page", "auth.write"),
        ("auth remove", "auth.write"),
        ("auth rotate", "auth.rotate"),
        ("auth validate", "auth.read"),
        ("auth debug", "auth.read"),
        ("auth list", "auth.read"),
        ("call get", "graph.read"),
        ("call post", "graph.write"),
        ("approval request", "approval.request"),
        ("approval grant", "approval.grant"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Commands that always require an approval grant.
pub fn default_high_risk_commands() -> BTreeSet<String> {
    ["auth rotate", "auth remove", "approval grant"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// One governed command invocation.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Acting principal.
    pub principal: String,
    /// Command reference, e.g. `auth rotate`.
    pub command: String,
    /// Org hint; optional when the workspace hint is qualified or unique.
    pub org: Option<String>,
    /// Workspace hint, bare or `org/name`.
    pub workspace: String,
    /// Approval grant token for high-risk commands.
    pub approval_token: Option<String>,
    /// Caller-chosen id tying the decision to the execution.
    pub correlation_id: String,
}

/// The context handed to secret hooks and the execute callback.
#[derive(Debug, Clone)]
pub struct AuthorizedCommand {
    /// Resolved workspace coordinates.
    pub workspace: WorkspaceRef,
    /// Capability the command required.
    pub capability: String,
    /// The full policy decision trace.
    pub trace: DecisionTrace,
    /// Approval outcome for high-risk commands.
    pub approval_status: Option<String>,
}

/// Workspace resolution, policy, approvals, and audit in one fail-closed
/// pipeline. One instance per invocation; no global state.
pub struct GovernancePipeline {
    directory: Directory,
    policies: PolicySet,
    signer: TokenSigner,
    replay: Arc<dyn ReplayStore>,
    capabilities: BTreeMap<String, String>,
    high_risk: BTreeSet<String>,
}

impl GovernancePipeline {
    /// Pipeline with the default capability table, high-risk set, and an
    /// in-memory replay store.
    pub fn new(directory: Directory, policies: PolicySet, signer: TokenSigner) -> Self {
        Self {
            directory,
            policies,
            signer,
            replay: Arc::new(crate::approval::MemoryReplayStore::new()),
            capabilities: default_capability_map(),
            high_risk: default_high_risk_commands(),
        }
    }

    /// Swap in an external replay store.
    pub fn with_replay_store(mut self, replay: Arc<dyn ReplayStore>) -> Self {
        self.replay = replay;
        self
    }

    /// Replace the command-to-capability table.
    pub fn with_capability_map(mut self, capabilities: BTreeMap<String, String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the high-risk command set.
    pub fn with_high_risk_commands(mut self, high_risk: BTreeSet<String>) -> Self {
        self.high_risk = high_risk;
        self
    }

    /// The approval token signer, for the approval subcommands.
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Resolve org and workspace hints to concrete coordinates.
    pub fn resolve_workspace(
        &self,
        org_hint: Option<&str>,
        workspace_hint: &str,
    ) -> Result<WorkspaceRef> {
        self.directory.resolve(org_hint, workspace_hint)
    }

    /// Authorize one command, optionally emitting a decision event.
    ///
    /// Policy runs first; for high-risk commands a valid approval grant is
    /// additionally required, and its absence denies the command regardless
    /// of the policy allow.
    pub fn authorize_command(
        &self,
        audit: Option<&mut AuditPipeline>,
        request: &CommandRequest,
    ) -> Result<AuthorizedCommand> {
        let workspace = self.resolve_workspace(request.org.as_deref(), &request.workspace)?;

        let capability = self
            .capabilities
            .get(&request.command)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::InvalidArgument,
                    format!("command '{}' has no capability mapping", request.command),
                )
            })?;

        let trace = self.policies.evaluate(&PolicyRequest {
            principal: &request.principal,
            capability: &capability,
            org_name: &workspace.org_name,
            workspace_name: &workspace.workspace_name,
        });

        // The grant is only examined, and its single-use nonce only
        // consumed, once policy allows the command; a denied trace leaves
        // the grant intact for a retry after the bindings are fixed.
        let (approval_status, approval_error) =
            if self.high_risk.contains(&request.command) && trace.allowed() {
                self.check_approval(request, &workspace)
            } else {
                (None, None)
            };

        let allowed = trace.allowed() && approval_error.is_none();
        let deny_reason = trace
            .deny_reason()
            .map(str::to_string)
            .or_else(|| {
                approval_status
                    .as_deref()
                    .filter(|s| *s != "approved")
                    .map(|s| format!("approval_{s}"))
            });

        if let Some(audit) = audit
            && !request.correlation_id.is_empty()
        {
            audit.record_decision(DecisionRecord {
                correlation_id: request.correlation_id.clone(),
                principal: request.principal.clone(),
                command: request.command.clone(),
                capability: capability.clone(),
                org: workspace.org_name.clone(),
                workspace: workspace.workspace_name.clone(),
                allowed,
                deny_reason: deny_reason.clone(),
                approval_status: approval_status.clone(),
            })?;
        }

        if !trace.allowed() {
            return Err(policy_error(&trace));
        }
        if let Some(error) = approval_error {
            return Err(error);
        }

        Ok(AuthorizedCommand {
            workspace,
            capability,
            trace,
            approval_status,
        })
    }

    /// The full governed execution, fail-closed at every stage.
    ///
    /// Emits exactly one decision event; when that decision allows the
    /// command, exactly one execution event follows, recording failure for
    /// cancellation, secret-hook errors, and callback errors alike. The
    /// execute callback runs at most once and never after a pre-stage
    /// failure.
    pub async fn execute_command<S, SF, E, EF>(
        &self,
        cancel: &CancellationToken,
        audit: &mut AuditPipeline,
        request: &CommandRequest,
        secret_check: S,
        execute: E,
    ) -> Result<serde_json::Value>
    where
        S: FnOnce(AuthorizedCommand) -> SF,
        SF: Future<Output = Result<()>>,
        E: FnOnce(AuthorizedCommand) -> EF,
        EF: Future<Output = Result<serde_json::Value>>,
    {
        if request.correlation_id.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "executeCommand requires a correlation id",
            ));
        }

        let authorized = self.authorize_command(Some(&mut *audit), request)?;

        let record_failure =
            |audit: &mut AuditPipeline, error: &Error| -> Result<()> {
                audit
                    .record_execution(ExecutionRecord {
                        correlation_id: request.correlation_id.clone(),
                        status: ExecutionStatus::Failed,
                        error: Some(error.to_string()),
                    })
                    .map(|_| ())
            };

        if cancel.is_cancelled() {
            let error = Error::new(
                ErrorCode::OperationCancelled,
                "command cancelled before execution",
            );
            record_failure(audit, &error)?;
            return Err(error);
        }

        if let Err(error) = secret_check(authorized.clone()).await {
            record_failure(audit, &error)?;
            return Err(error);
        }

        tracing::debug!(
            command = %request.command,
            workspace = %authorized.workspace.workspace_name,
            correlation_id = %request.correlation_id,
            "executing governed command"
        );
        match execute(authorized).await {
            Ok(value) => {
                audit.record_execution(ExecutionRecord {
                    correlation_id: request.correlation_id.clone(),
                    status: ExecutionStatus::Succeeded,
                    error: None,
                })?;
                Ok(value)
            }
            Err(error) => {
                record_failure(audit, &error)?;
                Err(error)
            }
        }
    }

    /// Validate the approval grant for a high-risk command.
    ///
    /// Returns the stable status string for the audit record and the error
    /// to surface when the grant does not authorize the command.
    fn check_approval(
        &self,
        request: &CommandRequest,
        workspace: &WorkspaceRef,
    ) -> (Option<String>, Option<Error>) {
        let Some(token) = request.approval_token.as_deref() else {
            return (
                Some("missing".into()),
                Some(Error::new(
                    ErrorCode::ApprovalMissing,
                    format!(
                        "command '{}' is high-risk and requires an approval grant",
                        request.command
                    ),
                )),
            );
        };

        let grant = match self.signer.verify_grant(token) {
            Ok(grant) => grant,
            Err(error) => return (Some("invalid".into()), Some(error)),
        };

        if grant.decision != ApprovalDecision::Approved {
            return (
                Some("rejected".into()),
                Some(Error::new(
                    ErrorCode::ApprovalRejected,
                    format!("approval grant by '{}' records a rejection", grant.approver),
                )),
            );
        }

        if grant.expires_at <= Utc::now() {
            return (
                Some("expired".into()),
                Some(Error::new(
                    ErrorCode::ApprovalExpired,
                    format!(
                        "approval grant expired at {}",
                        grant.expires_at.to_rfc3339()
                    ),
                )),
            );
        }

        let embedded = &grant.request;
        if embedded.principal != request.principal
            || embedded.command != request.command
            || embedded.org != workspace.org_name
            || embedded.workspace != workspace.workspace_name
        {
            return (
                Some("mismatched".into()),
                Some(
                    Error::new(
                        ErrorCode::ApprovalMismatched,
                        "approval grant does not match the current command context",
                    )
                    .with_context("granted_command", &embedded.command)
                    .with_context("granted_principal", &embedded.principal),
                ),
            );
        }

        if let Err(error) = self.replay.register(&grant.nonce) {
            return (Some("invalid".into()), Some(error));
        }

        (Some("approved".into()), None)
    }
}

fn policy_error(trace: &DecisionTrace) -> Error {
    use crate::policy::PolicyOutcome;
    let (code, message) = match trace.outcome {
        PolicyOutcome::ExplicitDeny => (
            ErrorCode::ExplicitDeny,
            "a role binding explicitly denies this capability",
        ),
        PolicyOutcome::MissingCapability => (
            ErrorCode::MissingCapability,
            "no role binding grants the required capability",
        ),
        PolicyOutcome::NoBinding => (
            ErrorCode::NoBinding,
            "the principal has no role binding in this workspace",
        ),
        PolicyOutcome::Allowed => unreachable!("policy_error called on an allowed trace"),
    };
    Error::new(code, message).with_context("trace", trace)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Role, RoleBinding};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn pipeline() -> GovernancePipeline {
        let mut directory = Directory::new();
        directory.add_org("acme", "org-1");
        directory.add_workspace("acme", "growth", "ws-1").unwrap();

        let mut policies = PolicySet::default();
        policies.roles.insert(
            "admin".into(),
            Role {
                allow: ["auth.rotate", "graph.read", "auth.write"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                deny: BTreeSet::new(),
            },
        );
        policies.bindings.push(RoleBinding {
            principal: "alice".into(),
            org: "acme".into(),
            workspace: "growth".into(),
            role: "admin".into(),
        });

        let signer = TokenSigner::new(b"governance-secret", HOUR).unwrap();
        GovernancePipeline::new(directory, policies, signer)
    }

    fn request(command: &str, correlation_id: &str) -> CommandRequest {
        CommandRequest {
            principal: "alice".into(),
            command: command.into(),
            org: None,
            workspace: "growth".into(),
            approval_token: None,
            correlation_id: correlation_id.into(),
        }
    }

    fn approved_grant(pipeline: &GovernancePipeline, command: &str) -> String {
        let request_token = pipeline
            .signer()
            .mint_request("alice", command, "acme", "growth", HOUR)
            .unwrap();
        pipeline
            .signer()
            .mint_grant(&request_token, "bob", ApprovalDecision::Approved, HOUR)
            .unwrap()
    }

    async fn run(
        pipeline: &GovernancePipeline,
        audit: &mut AuditPipeline,
        request: &CommandRequest,
    ) -> Result<serde_json::Value> {
        let cancel = CancellationToken::new();
        pipeline
            .execute_command(
                &cancel,
                audit,
                request,
                |_| async { Ok(()) },
                |_| async { Ok(serde_json::json!({"done": true})) },
            )
            .await
    }

    // -- Authorization ------------------------------------------------------

    #[test]
    fn low_risk_command_allows_on_policy_alone() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let authorized = pipeline
            .authorize_command(Some(&mut audit), &request("call get", "c1"))
            .unwrap();
        assert_eq!(authorized.capability, "graph.read");
        assert!(authorized.approval_status.is_none());

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].allowed, Some(true));
        assert_eq!(events[0].capability, "graph.read");
        assert_eq!(events[0].org, "acme");
    }

    #[test]
    fn unknown_command_is_an_input_error() {
        let pipeline = pipeline();
        let err = pipeline
            .authorize_command(None, &request("frobnicate", "c1"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn unbound_principal_is_denied_with_trace() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let mut req = request("call get", "c1");
        req.principal = "mallory".into();

        let err = pipeline
            .authorize_command(Some(&mut audit), &req)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoBinding);
        assert_eq!(err.kind(), gg_error::ErrorKind::PolicyDenied);

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].allowed, Some(false));
        assert_eq!(events[0].deny_reason.as_deref(), Some("no_binding"));
    }

    #[test]
    fn empty_correlation_id_skips_the_decision_event() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        pipeline
            .authorize_command(Some(&mut audit), &request("call get", ""))
            .unwrap();
        assert!(audit.is_empty());
    }

    // -- Approval gating ------------------------------------------------------

    #[tokio::test]
    async fn high_risk_without_approval_fails_closed() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let err = run(&pipeline, &mut audit, &request("auth rotate", "c1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalMissing);
        assert_eq!(err.kind(), gg_error::ErrorKind::PolicyDenied);

        // Decision recorded as denied; no execution event follows.
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].allowed, Some(false));
        assert_eq!(events[0].deny_reason.as_deref(), Some("approval_missing"));
        assert_eq!(events[0].approval_status.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn high_risk_with_matching_grant_executes() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let mut req = request("auth rotate", "c1");
        req.approval_token = Some(approved_grant(&pipeline, "auth rotate"));

        let value = run(&pipeline, &mut audit, &req).await.unwrap();
        assert_eq!(value["done"], true);

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].approval_status.as_deref(), Some("approved"));
        assert_eq!(events[1].execution_status, Some(ExecutionStatus::Succeeded));
    }

    #[tokio::test]
    async fn mismatched_grant_is_refused() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let mut req = request("auth rotate", "c1");
        // Grant approves a different command.
        req.approval_token = Some(approved_grant(&pipeline, "auth remove"));

        let err = run(&pipeline, &mut audit, &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalMismatched);
        assert_eq!(
            audit.events()[0].approval_status.as_deref(),
            Some("mismatched")
        );
    }

    #[tokio::test]
    async fn rejected_grant_is_refused() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let request_token = pipeline
            .signer()
            .mint_request("alice", "auth rotate", "acme", "growth", HOUR)
            .unwrap();
        let grant = pipeline
            .signer()
            .mint_grant(&request_token, "bob", ApprovalDecision::Rejected, HOUR)
            .unwrap();
        let mut req = request("auth rotate", "c1");
        req.approval_token = Some(grant);

        let err = run(&pipeline, &mut audit, &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalRejected);
    }

    #[tokio::test]
    async fn expired_grant_is_refused() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let request_token = pipeline
            .signer()
            .mint_request("alice", "auth rotate", "acme", "growth", HOUR)
            .unwrap();
        let grant = pipeline
            .signer()
            .mint_grant(
                &request_token,
                "bob",
                ApprovalDecision::Approved,
                Duration::from_millis(1),
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let mut req = request("auth rotate", "c1");
        req.approval_token = Some(grant);
        let err = run(&pipeline, &mut audit, &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalExpired);
    }

    #[tokio::test]
    async fn replayed_grant_is_refused() {
        let pipeline = pipeline();
        let grant = approved_grant(&pipeline, "auth rotate");

        let mut audit = AuditPipeline::new();
        let mut first = request("auth rotate", "c1");
        first.approval_token = Some(grant.clone());
        run(&pipeline, &mut audit, &first).await.unwrap();

        let mut second = request("auth rotate", "c2");
        second.approval_token = Some(grant);
        let err = run(&pipeline, &mut audit, &second).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalInvalid);
    }

    #[tokio::test]
    async fn policy_denial_leaves_the_grant_unconsumed() {
        use crate::approval::MemoryReplayStore;

        let mut directory = Directory::new();
        directory.add_org("acme", "org-1");
        directory.add_workspace("acme", "growth", "ws-1").unwrap();

        let mut policies = PolicySet::default();
        policies.roles.insert(
            "admin".into(),
            Role {
                allow: ["auth.rotate"].into_iter().map(str::to_string).collect(),
                deny: BTreeSet::new(),
            },
        );

        let replay = Arc::new(MemoryReplayStore::new());

        // First pipeline: carol has no binding yet.
        let unbound = GovernancePipeline::new(
            directory.clone(),
            policies.clone(),
            TokenSigner::new(b"governance-secret", HOUR).unwrap(),
        )
        .with_replay_store(replay.clone());

        let request_token = unbound
            .signer()
            .mint_request("carol", "auth rotate", "acme", "growth", HOUR)
            .unwrap();
        let grant = unbound
            .signer()
            .mint_grant(&request_token, "bob", ApprovalDecision::Approved, HOUR)
            .unwrap();

        let mut audit = AuditPipeline::new();
        let mut req = request("auth rotate", "c1");
        req.principal = "carol".into();
        req.approval_token = Some(grant.clone());

        let err = run(&unbound, &mut audit, &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NoBinding);
        // Policy denied before the grant was examined: no approval status
        // in the decision event, and the nonce is still unspent.
        assert_eq!(audit.events()[0].approval_status, None);
        assert_eq!(audit.events()[0].deny_reason.as_deref(), Some("no_binding"));

        // Second pipeline: same key and replay store, binding fixed.
        policies.bindings.push(RoleBinding {
            principal: "carol".into(),
            org: "acme".into(),
            workspace: "growth".into(),
            role: "admin".into(),
        });
        let bound = GovernancePipeline::new(
            directory,
            policies,
            TokenSigner::new(b"governance-secret", HOUR).unwrap(),
        )
        .with_replay_store(replay);

        let mut retry = request("auth rotate", "c2");
        retry.principal = "carol".into();
        retry.approval_token = Some(grant);
        let mut retry_audit = AuditPipeline::new();
        run(&bound, &mut retry_audit, &retry).await.unwrap();
        assert_eq!(
            retry_audit.events()[0].approval_status.as_deref(),
            Some("approved")
        );
    }

    #[tokio::test]
    async fn garbage_grant_is_invalid() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let mut req = request("auth rotate", "c1");
        req.approval_token = Some("not-a-token".into());
        let err = run(&pipeline, &mut audit, &req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ApprovalInvalid);
        assert_eq!(audit.events()[0].approval_status.as_deref(), Some("invalid"));
    }

    // -- Execution orchestration ------------------------------------------------

    #[tokio::test]
    async fn chain_links_decision_to_execution() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        run(&pipeline, &mut audit, &request("call get", "c1"))
            .await
            .unwrap();

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].previous_digest, events[0].digest);
        audit.verify().unwrap();

        // A second decision for the same correlation id is an integrity error.
        let err = pipeline
            .authorize_command(Some(&mut audit), &request("call get", "c1"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateDecision);
        assert_eq!(err.kind(), gg_error::ErrorKind::GovernanceIntegrity);
    }

    #[tokio::test]
    async fn secret_check_failure_records_failed_execution() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let cancel = CancellationToken::new();
        let executed = AtomicUsize::new(0);

        let err = pipeline
            .execute_command(
                &cancel,
                &mut audit,
                &request("call get", "c1"),
                |_| async {
                    Err(Error::new(
                        ErrorCode::SecretNotFound,
                        "no secret stored for profile",
                    ))
                },
                |_| {
                    executed.fetch_add(1, Ordering::SeqCst);
                    async { Ok(serde_json::json!({})) }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::SecretNotFound);
        assert_eq!(executed.load(Ordering::SeqCst), 0);

        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].execution_status, Some(ExecutionStatus::Failed));
        assert!(
            events[1]
                .execution_error
                .as_deref()
                .unwrap()
                .contains("SECRET_NOT_FOUND")
        );
    }

    #[tokio::test]
    async fn callback_failure_still_records_execution() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let cancel = CancellationToken::new();

        let err = pipeline
            .execute_command(
                &cancel,
                &mut audit,
                &request("call get", "c1"),
                |_| async { Ok(()) },
                |_| async {
                    Err(Error::new(ErrorCode::UpstreamError, "rate limited"))
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::UpstreamError);
        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].execution_status, Some(ExecutionStatus::Failed));
        audit.verify().unwrap();
    }

    #[tokio::test]
    async fn cancellation_after_decision_records_failed_execution() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline
            .execute_command(
                &cancel,
                &mut audit,
                &request("call get", "c1"),
                |_| async { Ok(()) },
                |_| async { Ok(serde_json::json!({})) },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::OperationCancelled);
        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].allowed, Some(true));
        assert_eq!(events[1].execution_status, Some(ExecutionStatus::Failed));
        assert!(
            events[1]
                .execution_error
                .as_deref()
                .unwrap()
                .contains("cancelled")
        );
        audit.verify().unwrap();
    }

    #[tokio::test]
    async fn denied_command_never_reaches_execution() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let mut req = request("call get", "c1");
        req.principal = "mallory".into();
        let executed = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let err = pipeline
            .execute_command(
                &cancel,
                &mut audit,
                &req,
                |_| async { Ok(()) },
                |_| {
                    executed.fetch_add(1, Ordering::SeqCst);
                    async { Ok(serde_json::json!({})) }
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), gg_error::ErrorKind::PolicyDenied);
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn execute_requires_a_correlation_id() {
        let pipeline = pipeline();
        let mut audit = AuditPipeline::new();
        let err = run(&pipeline, &mut audit, &request("call get", ""))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert!(audit.is_empty());
    }
}
