// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellation primitives shared across graphgate services.
//!
//! Every suspending operation in the core takes a [`CancellationToken`];
//! cancellation during an upstream call aborts the call and surfaces the
//! cancelled error kind unchanged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A cheaply-cloneable cancellation signal.
///
/// Clones observe the same state: once any clone is cancelled, every clone
/// reports `is_cancelled() == true` and every pending [`cancelled`]
/// future resolves.
///
/// [`cancelled`]: Self::cancelled
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

struct Shared {
    flag: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Trip the token. Safe to call any number of times.
    pub fn cancel(&self) {
        self.shared.flag.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Whether the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token is tripped; immediately if it already was.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register interest before the second flag check; a cancel in
            // between would otherwise wake nobody.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
