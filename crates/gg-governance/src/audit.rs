// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hash-chained, append-only audit log.
//!
//! Every event's digest covers the previous event's digest plus the
//! canonical serialization of its own body, so any mutation of recorded
//! history breaks verification from that point forward.

use chrono::{DateTime, Utc};
use gg_error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// An authorization decision.
    Decision,
    /// The terminal execution outcome for an allowed decision.
    Execution,
}

/// Terminal execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The execute callback completed successfully.
    Succeeded,
    /// A pre-execute stage or the callback failed.
    Failed,
}

/// One immutable entry in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Strictly increasing position, starting at 1.
    pub sequence: u64,
    /// Append instant.
    pub timestamp: DateTime<Utc>,
    /// Caller-chosen id tying a decision to its execution.
    pub correlation_id: String,
    /// Decision or execution.
    pub event_type: AuditEventType,
    /// Acting principal.
    pub principal: String,
    /// Command reference.
    pub command: String,
    /// Capability the command required.
    pub capability: String,
    /// Resolved org name.
    pub org: String,
    /// Resolved workspace name.
    pub workspace: String,
    /// Decision verdict; absent on execution events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
    /// Stable denial reason; absent when allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
    /// Approval outcome recorded with the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    /// Terminal status; present on execution events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<ExecutionStatus>,
    /// Error text for failed executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    /// Digest of the previous event; empty for the first event.
    pub previous_digest: String,
    /// `SHA256(previous_digest ‖ canonical(body))` as lowercase hex.
    pub digest: String,
}

/// Inputs for a decision event.
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    /// Correlation id; must be unique among decisions.
    pub correlation_id: String,
    /// Acting principal.
    pub principal: String,
    /// Command reference.
    pub command: String,
    /// Required capability.
    pub capability: String,
    /// Resolved org name.
    pub org: String,
    /// Resolved workspace name.
    pub workspace: String,
    /// The verdict.
    pub allowed: bool,
    /// Stable denial reason when not allowed.
    pub deny_reason: Option<String>,
    /// Approval outcome, when the command is high-risk.
    pub approval_status: Option<String>,
}

/// Inputs for an execution event; identity fields are copied from the
/// decision that shares the correlation id.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Correlation id of the allowing decision.
    pub correlation_id: String,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Error text for failures.
    pub error: Option<String>,
}

/// The append-only chain. Single-owner: sharing across threads requires
/// external locking.
#[derive(Debug, Default)]
pub struct AuditPipeline {
    events: Vec<AuditEvent>,
}

impl AuditPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decision event.
    ///
    /// Refuses a correlation id that already has a decision event.
    pub fn record_decision(&mut self, record: DecisionRecord) -> Result<&AuditEvent> {
        if record.correlation_id.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "correlation id must not be empty",
            ));
        }
        if self
            .find_decision(&record.correlation_id)
            .is_some()
        {
            return Err(Error::new(
                ErrorCode::DuplicateDecision,
                format!(
                    "a decision event already exists for correlation id '{}'",
                    record.correlation_id
                ),
            ));
        }

        let event = self.chain(AuditEvent {
            sequence: 0,
            timestamp: Utc::now(),
            correlation_id: record.correlation_id,
            event_type: AuditEventType::Decision,
            principal: record.principal,
            command: record.command,
            capability: record.capability,
            org: record.org,
            workspace: record.workspace,
            allowed: Some(record.allowed),
            deny_reason: record.deny_reason,
            approval_status: record.approval_status,
            execution_status: None,
            execution_error: None,
            previous_digest: String::new(),
            digest: String::new(),
        })?;
        self.events.push(event);
        Ok(self.events.last().expect("just pushed"))
    }

    /// Append an execution event for a previously allowed decision.
    ///
    /// Refuses when no decision shares the correlation id, or when that
    /// decision denied the command.
    pub fn record_execution(&mut self, record: ExecutionRecord) -> Result<&AuditEvent> {
        let decision = self
            .find_decision(&record.correlation_id)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::ExecutionWithoutDecision,
                    format!(
                        "no decision event exists for correlation id '{}'",
                        record.correlation_id
                    ),
                )
            })?;
        if decision.allowed != Some(true) {
            return Err(Error::new(
                ErrorCode::ExecutionOnDenied,
                format!(
                    "the decision for correlation id '{}' denied the command",
                    record.correlation_id
                ),
            ));
        }

        let event = self.chain(AuditEvent {
            sequence: 0,
            timestamp: Utc::now(),
            correlation_id: record.correlation_id,
            event_type: AuditEventType::Execution,
            principal: decision.principal,
            command: decision.command,
            capability: decision.capability,
            org: decision.org,
            workspace: decision.workspace,
            allowed: None,
            deny_reason: None,
            approval_status: None,
            execution_status: Some(record.status),
            execution_error: record.error,
            previous_digest: String::new(),
            digest: String::new(),
        })?;
        self.events.push(event);
        Ok(self.events.last().expect("just pushed"))
    }

    /// Deep copy of the recorded events; mutating it cannot affect the
    /// stored chain.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the pipeline holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Recompute and check every digest and sequence in the chain.
    pub fn verify(&self) -> Result<()> {
        let mut previous = String::new();
        for (index, event) in self.events.iter().enumerate() {
            if event.sequence != (index as u64) + 1 {
                return Err(integrity(format!(
                    "event at index {index} has sequence {} (expected {})",
                    event.sequence,
                    index + 1
                )));
            }
            if event.previous_digest != previous {
                return Err(integrity(format!(
                    "event {} does not chain to its predecessor",
                    event.sequence
                )));
            }
            let expected = event_digest(event)?;
            if event.digest != expected {
                return Err(integrity(format!(
                    "event {} digest does not match its canonical body",
                    event.sequence
                )));
            }
            previous = event.digest.clone();
        }
        Ok(())
    }

    fn find_decision(&self, correlation_id: &str) -> Option<&AuditEvent> {
        self.events.iter().find(|e| {
            e.event_type == AuditEventType::Decision && e.correlation_id == correlation_id
        })
    }

    /// Fill sequence, previous_digest, and digest for a new event body.
    fn chain(&self, mut event: AuditEvent) -> Result<AuditEvent> {
        event.sequence = self.events.len() as u64 + 1;
        event.previous_digest = self
            .events
            .last()
            .map(|e| e.digest.clone())
            .unwrap_or_default();
        event.digest = event_digest(&event)?;
        Ok(event)
    }
}

fn integrity(message: String) -> Error {
    Error::new(ErrorCode::ChainBroken, message)
}

/// `SHA256(previous_digest ‖ canonical(body))` in lowercase hex.
///
/// The digest field itself must not influence the hash input, so it is
/// forced to an empty string in the canonical form.
fn event_digest(event: &AuditEvent) -> Result<String> {
    let mut value = serde_json::to_value(event).map_err(|e| {
        Error::new(ErrorCode::ChainBroken, "failed to canonicalize audit event")
        .with_source(e)
    })?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("digest".to_string(), serde_json::Value::String(String::new()));
    }
    let canonical = serde_json::to_string(&value).map_err(|e| {
        Error::new(ErrorCode::ChainBroken, "failed to canonicalize audit event")
        .with_source(e)
    })?;

    let mut hasher = Sha256::new();
    hasher.update(event.previous_digest.as_bytes());
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
