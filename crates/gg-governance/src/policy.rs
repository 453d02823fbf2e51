// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role bindings and policy evaluation with a full decision trace.
//!
//! The trace is not debugging output: it is recorded verbatim into the
//! audit event for the decision.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named role: an allow-set and a deny-set of capability tokens.
///
/// Capabilities are dotted identifiers such as `graph.read` or
/// `auth.rotate`. Deny always overrides allow within a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Capabilities this role grants.
    #[serde(default)]
    pub allow: BTreeSet<String>,
    /// Capabilities this role explicitly refuses.
    #[serde(default)]
    pub deny: BTreeSet<String>,
}

/// Associates a principal with a role in one workspace of one org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Principal the binding applies to.
    pub principal: String,
    /// Org name.
    pub org: String,
    /// Workspace name.
    pub workspace: String,
    /// Role name, resolved against [`PolicySet::roles`].
    pub role: String,
}

/// The full policy universe the pipeline evaluates against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    /// Role definitions by name.
    pub roles: BTreeMap<String, Role>,
    /// All bindings, in declaration order.
    pub bindings: Vec<RoleBinding>,
}

/// One policy evaluation question.
#[derive(Debug, Clone)]
pub struct PolicyRequest<'a> {
    /// Acting principal.
    pub principal: &'a str,
    /// Capability the command requires.
    pub capability: &'a str,
    /// Resolved org name.
    pub org_name: &'a str,
    /// Resolved workspace name.
    pub workspace_name: &'a str,
}

/// Whether a trace step consulted a deny-set or an allow-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStepKind {
    /// Deny-set consultation.
    Deny,
    /// Allow-set consultation.
    Allow,
}

/// One consulted rule in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    /// Role the step consulted.
    pub role: String,
    /// Which set was consulted.
    pub kind: TraceStepKind,
    /// Capability under evaluation.
    pub capability: String,
    /// Whether the set contained the capability.
    pub matched: bool,
}

/// Terminal policy outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// An allow step matched and no deny step did.
    Allowed,
    /// A deny step matched; deny overrides allow.
    ExplicitDeny,
    /// Bindings exist but none grants the capability.
    MissingCapability,
    /// The principal has no binding in the workspace at all.
    NoBinding,
}

/// The decision plus every consulted step, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTrace {
    /// Terminal outcome.
    pub outcome: PolicyOutcome,
    /// Every step, in evaluation order.
    pub steps: Vec<TraceStep>,
}

impl DecisionTrace {
    /// Whether the outcome permits the command.
    pub fn allowed(&self) -> bool {
        self.outcome == PolicyOutcome::Allowed
    }

    /// Stable reason string for denied outcomes, recorded into the audit log.
    pub fn deny_reason(&self) -> Option<&'static str> {
        match self.outcome {
            PolicyOutcome::Allowed => None,
            PolicyOutcome::ExplicitDeny => Some("explicit_deny"),
            PolicyOutcome::MissingCapability => Some("missing_capability"),
            PolicyOutcome::NoBinding => Some("no_binding"),
        }
    }
}

impl PolicySet {
    /// Evaluate `request` against every matching binding.
    ///
    /// For each binding of the principal in the workspace, the bound role
    /// contributes a deny step and an allow step. Denied if any deny step
    /// matched; otherwise allowed if any allow step matched; otherwise
    /// denied, distinguishing *no binding* from *missing capability*.
    pub fn evaluate(&self, request: &PolicyRequest<'_>) -> DecisionTrace {
        let mut steps = Vec::new();
        let mut saw_binding = false;
        let mut deny_matched = false;
        let mut allow_matched = false;

        for binding in &self.bindings {
            if binding.principal != request.principal
                || binding.org != request.org_name
                || binding.workspace != request.workspace_name
            {
                continue;
            }
            saw_binding = true;

            let Some(role) = self.roles.get(&binding.role) else {
                // A binding naming an undefined role contributes nothing.
                tracing::warn!(role = %binding.role, "binding references undefined role");
                continue;
            };

            let denies = role.deny.contains(request.capability);
            steps.push(TraceStep {
                role: binding.role.clone(),
                kind: TraceStepKind::Deny,
                capability: request.capability.to_string(),
                matched: denies,
            });
            deny_matched |= denies;

            let allows = role.allow.contains(request.capability);
            steps.push(TraceStep {
                role: binding.role.clone(),
                kind: TraceStepKind::Allow,
                capability: request.capability.to_string(),
                matched: allows,
            });
            allow_matched |= allows;
        }

        let outcome = if deny_matched {
            PolicyOutcome::ExplicitDeny
        } else if allow_matched {
            PolicyOutcome::Allowed
        } else if saw_binding {
            PolicyOutcome::MissingCapability
        } else {
            PolicyOutcome::NoBinding
        };

        DecisionTrace { outcome, steps }
    }
}
