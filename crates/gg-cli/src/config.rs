// SPDX-License-Identifier: MIT OR Apache-2.0

//! Governance configuration loading for the CLI.
//!
//! The governance document carries the org/workspace directory, role
//! definitions, principal bindings, and the approval signing material.
//! Profiles live in their own file handled by `gg-profile`.

use gg_error::{Error, ErrorCode, Result};
use gg_governance::{Directory, PolicySet, Role, RoleBinding, TokenSigner};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default cap on approval token lifetimes.
const DEFAULT_APPROVAL_MAX_TTL_SECS: u64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernanceConfig {
    /// HMAC key for approval tokens.
    pub signing_key: String,
    /// Cap on approval token TTLs, in seconds.
    #[serde(default)]
    pub approval_max_ttl_secs: Option<u64>,
    #[serde(default)]
    pub orgs: BTreeMap<String, OrgEntry>,
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgEntry {
    pub id: String,
    #[serde(default)]
    pub workspaces: BTreeMap<String, String>,
}

impl GovernanceConfig {
    /// Build the runtime pieces the pipeline needs.
    pub fn into_parts(self) -> Result<(Directory, PolicySet, TokenSigner)> {
        let mut directory = Directory::new();
        for (name, org) in &self.orgs {
            directory.add_org(name.clone(), org.id.clone());
            for (workspace, id) in &org.workspaces {
                directory.add_workspace(name, workspace.clone(), id.clone())?;
            }
        }

        let policies = PolicySet {
            roles: self.roles,
            bindings: self.bindings,
        };

        let max_ttl = Duration::from_secs(
            self.approval_max_ttl_secs
                .unwrap_or(DEFAULT_APPROVAL_MAX_TTL_SECS),
        );
        let signer = TokenSigner::new(self.signing_key.as_bytes(), max_ttl)?;

        Ok((directory, policies, signer))
    }
}

/// Load and parse the governance document at `path`.
pub fn load_governance(path: &Path) -> Result<GovernanceConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::new(
            ErrorCode::ConfigRead,
            format!("failed to read governance config '{}'", path.display()),
        )
        .with_source(e)
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::new(ErrorCode::ConfigParse, "failed to parse governance config").with_source(e)
    })
}
