//! Cooperative cancellation for background work.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cooperative cancellation flag shared between the thread that requests work and the
/// worker that performs it.
///
/// The worker polls [`CancellationToken::is_cancelled`] at each unit of work (for the
/// visibility traversal, each node dequeue) and returns early once it flips. Cancelling is
/// one-way; a fresh token is created for every new request.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let worker_copy = token.clone();
        assert!(!worker_copy.is_cancelled());
        token.cancel();
        assert!(worker_copy.is_cancelled());
    }
}
