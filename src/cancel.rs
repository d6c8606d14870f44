//! Cooperative cancellation with attempt supersession.
//!
//! One UI surface runs at most one live resolution attempt. Starting a new
//! attempt must cancel the previous attempt's token before (or as) the new
//! one begins, so a stale attempt can never deliver its outcome after a newer
//! one has started. [`AttemptController`] makes that rule an explicit,
//! testable operation instead of shared mutable controller state.

use std::sync::Mutex;

pub use tokio_util::sync::CancellationToken;

/// Hands out cancellation tokens, one live attempt at a time.
#[derive(Debug, Default)]
pub struct AttemptController {
    current: Mutex<Option<CancellationToken>>,
}

impl AttemptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the in-flight attempt (if any) and issue a token for a new one.
    pub fn begin(&self) -> CancellationToken {
        let mut guard = self.current.lock().expect("attempt slot poisoned");
        if let Some(previous) = guard.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        token
    }

    /// Cancel the in-flight attempt without starting a new one. Idempotent.
    pub fn cancel_current(&self) {
        let guard = self.current.lock().expect("attempt slot poisoned");
        if let Some(token) = guard.as_ref() {
            token.cancel();
        }
    }
}
