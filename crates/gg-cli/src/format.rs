// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output shaping for command results.

use gg_error::{Error, ErrorDto};
use gg_governance::AuditEvent;

/// Print a successful result, as JSON or a readable rendering.
pub fn print_result(value: &serde_json::Value, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        );
    } else {
        match value {
            serde_json::Value::String(s) => println!("{s}"),
            other => println!(
                "{}",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }
}

/// Print the audit trail of a governed invocation.
pub fn print_audit_trail(events: &[AuditEvent], json: bool) {
    if json {
        if let Ok(rendered) = serde_json::to_string_pretty(events) {
            println!("{rendered}");
        }
        return;
    }
    for event in events {
        let outcome = match event.event_type {
            gg_governance::AuditEventType::Decision => {
                if event.allowed == Some(true) {
                    "allowed".to_string()
                } else {
                    format!(
                        "denied ({})",
                        event.deny_reason.as_deref().unwrap_or("unspecified")
                    )
                }
            }
            gg_governance::AuditEventType::Execution => match event.execution_status {
                Some(gg_governance::ExecutionStatus::Succeeded) => "succeeded".to_string(),
                _ => format!(
                    "failed ({})",
                    event.execution_error.as_deref().unwrap_or("unspecified")
                ),
            },
        };
        println!(
            "#{} {:?} {} [{}] {}",
            event.sequence, event.event_type, event.command, event.correlation_id, outcome
        );
    }
}

/// Print an error envelope to stderr.
pub fn print_error(error: &Error, json: bool) {
    if json {
        let dto = ErrorDto::from(error);
        if let Ok(rendered) = serde_json::to_string_pretty(&dto) {
            eprintln!("{rendered}");
            return;
        }
    }
    eprintln!("error: {error}");
}
