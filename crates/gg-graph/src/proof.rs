// SPDX-License-Identifier: MIT OR Apache-2.0

//! App-secret proof computation.

use gg_error::{Error, ErrorCode, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase-hex `HMAC-SHA256(app_secret, token)`.
///
/// Attached as the `appsecret_proof` query parameter on every authenticated
/// upstream call that carries an app secret.
pub fn app_secret_proof(token: &str, app_secret: &str) -> Result<String> {
    if token.is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            "app-secret proof requires a non-empty token",
        ));
    }
    if app_secret.is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            "app-secret proof requires a non-empty app secret",
        ));
    }
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(token.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(hex_lower(&digest))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}
