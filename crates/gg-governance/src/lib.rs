// SPDX-License-Identifier: MIT OR Apache-2.0

//! Governed execution for graphgate commands.
//!
//! The pipeline is fail-closed end to end: workspace resolution, role-based
//! policy evaluation with a full decision trace, signed ephemeral approval
//! tokens for high-risk commands, and a hash-chained audit log that ties
//! every execution back to the decision that allowed it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod approval;
mod audit;
mod command;
mod policy;
mod workspace;

pub use approval::{
    ApprovalDecision, ApprovalGrant, ApprovalRequest, MemoryReplayStore, ReplayStore, TokenSigner,
};
pub use audit::{
    AuditEvent, AuditEventType, AuditPipeline, DecisionRecord, ExecutionRecord, ExecutionStatus,
};
pub use command::{
    AuthorizedCommand, CommandRequest, GovernancePipeline, default_capability_map,
    default_high_risk_commands,
};
pub use policy::{
    DecisionTrace, PolicyOutcome, PolicyRequest, PolicySet, Role, RoleBinding, TraceStep,
    TraceStepKind,
};
pub use workspace::{Directory, WorkspaceRef};
