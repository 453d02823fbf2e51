// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tagged union for loosely-typed upstream JSON fields.
//!
//! The Graph API encodes some fields inconsistently across endpoints and
//! versions: `expires_in` arrives as an integer or a numeric string,
//! `scopes` as a sequence of strings.  [`JsonScalar`] preserves the wire
//! shape and exposes explicit coercions.

use gg_error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};

/// A dynamic JSON value restricted to the shapes the Graph API emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonScalar {
    /// A JSON integer.
    Integer(i64),
    /// A JSON float.
    Number(f64),
    /// A JSON string.
    String(String),
    /// A JSON array of strings.
    StringList(Vec<String>),
}

impl JsonScalar {
    /// Coerce to seconds: integer, integral float, or numeric string.
    pub fn as_seconds(&self) -> Result<i64> {
        match self {
            Self::Integer(n) => Ok(*n),
            Self::Number(f) if f.fract() == 0.0 => Ok(*f as i64),
            Self::String(s) => s.trim().parse::<i64>().map_err(|_| {
                Error::new(
                    ErrorCode::DebugResponseInvalid,
                    format!("'{s}' is not a numeric seconds value"),
                )
            }),
            other => Err(Error::new(
                ErrorCode::DebugResponseInvalid,
                format!("{other:?} is not a numeric seconds value"),
            )),
        }
    }

    /// Coerce to a string list; a bare string becomes a singleton.
    pub fn as_string_list(&self) -> Result<Vec<String>> {
        match self {
            Self::StringList(v) => Ok(v.clone()),
            Self::String(s) => Ok(vec![s.clone()]),
            other => Err(Error::new(
                ErrorCode::DebugResponseInvalid,
                format!("{other:?} is not a string list"),
            )),
        }
    }
}
