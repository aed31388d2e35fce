//! Cooperative cancellation for store and sync operations.
//!
//! Every store operation takes a token and checks it at syscall
//! boundaries; JSONL export checks between lines. A cancelled operation
//! rolls back any open transaction, releases locks through its guards,
//! and returns [`BeadsError::Cancelled`](crate::error::BeadsError).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancellation flag shared between the requester and the
/// running operation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return the distinguished cancellation error if cancelled.
    ///
    /// # Errors
    ///
    /// Returns `BeadsError::Cancelled` once `cancel` has been called.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::error::BeadsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(
            clone.check(),
            Err(crate::error::BeadsError::Cancelled)
        ));
    }
}
