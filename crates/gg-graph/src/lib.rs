// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated Graph API caller.
//!
//! [`GraphClient`] is the single entry point for requests against the
//! upstream Graph API: it composes versioned URLs, attaches the access token
//! and HMAC app-secret proof, and normalizes upstream error envelopes into
//! the workspace error taxonomy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod envelope;
mod proof;
mod scalar;

pub use client::{GraphClient, GraphRequest, Method, RetryPolicy, DEFAULT_BASE_URL};
pub use envelope::UpstreamErrorBody;
pub use proof::app_secret_proof;
pub use scalar::JsonScalar;
