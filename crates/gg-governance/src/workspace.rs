// SPDX-License-Identifier: MIT OR Apache-2.0

//! Org and workspace directory plus hint resolution.

use gg_error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fully resolved workspace coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    /// Org name.
    pub org_name: String,
    /// Org id.
    pub org_id: String,
    /// Workspace name.
    pub workspace_name: String,
    /// Workspace id.
    pub workspace_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Org {
    id: String,
    /// Workspace name to id.
    workspaces: BTreeMap<String, String>,
}

/// Directory of known orgs and their workspaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directory {
    orgs: BTreeMap<String, Org>,
}

impl Directory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an org.
    pub fn add_org(&mut self, name: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.orgs.insert(
            name.into(),
            Org {
                id: id.into(),
                workspaces: BTreeMap::new(),
            },
        );
        self
    }

    /// Register a workspace under an existing org.
    pub fn add_workspace(
        &mut self,
        org: &str,
        name: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<&mut Self> {
        let entry = self.orgs.get_mut(org).ok_or_else(|| {
            Error::new(
                ErrorCode::WorkspaceUnknown,
                format!("org '{org}' is not registered"),
            )
        })?;
        entry.workspaces.insert(name.into(), id.into());
        Ok(self)
    }

    /// Resolve an org hint plus a workspace hint to concrete coordinates.
    ///
    /// The workspace hint is either a bare name or `org/name`.  When the
    /// qualified form and an org hint are both supplied they must agree.
    /// A bare name present in more than one org without an org hint is
    /// ambiguous and refused.
    pub fn resolve(
        &self,
        org_hint: Option<&str>,
        workspace_hint: &str,
    ) -> Result<WorkspaceRef> {
        if workspace_hint.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidArgument,
                "workspace must not be empty",
            ));
        }

        let (qualified_org, workspace_name) = match workspace_hint.split_once('/') {
            Some((org, name)) => {
                if org.is_empty() || name.is_empty() {
                    return Err(Error::new(
                        ErrorCode::InvalidArgument,
                        format!("workspace '{workspace_hint}' is not of the form org/name"),
                    ));
                }
                (Some(org), name)
            }
            None => (None, workspace_hint),
        };

        let org_name = match (org_hint.filter(|o| !o.trim().is_empty()), qualified_org) {
            (Some(hint), Some(qualified)) if hint != qualified => {
                return Err(Error::new(
                    ErrorCode::InvalidArgument,
                    format!(
                        "org hint '{hint}' disagrees with workspace qualifier '{qualified}'"
                    ),
                ));
            }
            (Some(hint), _) => Some(hint.to_string()),
            (None, Some(qualified)) => Some(qualified.to_string()),
            (None, None) => None,
        };

        match org_name {
            Some(org_name) => {
                let org = self.orgs.get(&org_name).ok_or_else(|| {
                    Error::new(
                        ErrorCode::WorkspaceUnknown,
                        format!("org '{org_name}' is not registered"),
                    )
                })?;
                let workspace_id = org.workspaces.get(workspace_name).ok_or_else(|| {
                    Error::new(
                        ErrorCode::WorkspaceUnknown,
                        format!("workspace '{workspace_name}' not found in org '{org_name}'"),
                    )
                })?;
                Ok(WorkspaceRef {
                    org_id: org.id.clone(),
                    org_name,
                    workspace_name: workspace_name.to_string(),
                    workspace_id: workspace_id.clone(),
                })
            }
            None => {
                let mut matches = self.orgs.iter().filter_map(|(org_name, org)| {
                    org.workspaces.get(workspace_name).map(|workspace_id| {
                        WorkspaceRef {
                            org_name: org_name.clone(),
                            org_id: org.id.clone(),
                            workspace_name: workspace_name.to_string(),
                            workspace_id: workspace_id.clone(),
                        }
                    })
                });
                let first = matches.next().ok_or_else(|| {
                    Error::new(
                        ErrorCode::WorkspaceUnknown,
                        format!("workspace '{workspace_name}' not found in any org"),
                    )
                })?;
                if matches.next().is_some() {
                    return Err(Error::new(
                        ErrorCode::WorkspaceAmbiguous,
                        format!(
                            "workspace '{workspace_name}' exists in multiple orgs; qualify it as org/name"
                        ),
                    ));
                }
                Ok(first)
            }
        }
    }
}
