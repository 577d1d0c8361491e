//! Cooperative cancellation signal.
//!
//! A `CancelToken` fans out from the process root to drivers, supervisors,
//! workers and in-flight tool operations. Every suspension point races its
//! work against `cancelled()` so shutdown is bounded.

use std::sync::Arc;

use tokio::sync::watch;

/// Clonable cancellation token backed by a watch channel.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a fresh, untriggered token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Check without waiting.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the token is cancelled. Usable inside `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // The sender lives inside self, so changed() cannot error while we
        // hold a clone of the token.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_resolves_waiters() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should resolve")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel(); // idempotent
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("should not block");
    }
}
