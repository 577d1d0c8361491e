//! Pending-prompts table and wait logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::domain::short_id;

/// How a prompt wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user answered.
    Answered(String),
    /// The deadline passed with no answer.
    TimedOut,
}

/// Concurrent-safe rendezvous between a waiting tool and the transport.
///
/// Mutations come from the transport receive task, lookups from tool tasks;
/// the table is a mutexed map of single-shot senders keyed by prompt id.
#[derive(Clone, Default)]
pub struct PromptBroker {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<String>>>>,
}

impl PromptBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh slot, returning the prompt id and the receiver to
    /// wait on.
    pub async fn register(&self) -> (String, oneshot::Receiver<String>) {
        let prompt_id = short_id("prompt");
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(prompt_id.clone(), tx);
        debug!(%prompt_id, "PromptBroker: registered");
        (prompt_id, rx)
    }

    /// Complete a pending prompt with the user's response.
    ///
    /// Returns true when a slot was completed; a second completion of the
    /// same id (or an unknown id) is a no-op returning false.
    pub async fn complete(&self, prompt_id: &str, data: String) -> bool {
        let sender = self.pending.lock().await.remove(prompt_id);
        match sender {
            Some(tx) => {
                // The receiver may already have given up on timeout; that is
                // not an error worth surfacing.
                if tx.send(data).is_err() {
                    debug!(%prompt_id, "PromptBroker: receiver gone");
                }
                true
            }
            None => {
                debug!(%prompt_id, "PromptBroker: no pending slot");
                false
            }
        }
    }

    /// Wait for a response with a deadline. The slot is removed on timeout.
    pub async fn wait(&self, prompt_id: &str, rx: oneshot::Receiver<String>, deadline: Duration) -> PromptOutcome {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(data)) => PromptOutcome::Answered(data),
            Ok(Err(_)) => {
                // Sender dropped without completing (session disposed).
                warn!(%prompt_id, "PromptBroker: slot dropped before completion");
                PromptOutcome::TimedOut
            }
            Err(_) => {
                self.pending.lock().await.remove(prompt_id);
                debug!(%prompt_id, "PromptBroker: timed out");
                PromptOutcome::TimedOut
            }
        }
    }

    /// Reject all pending prompts (session disposal).
    pub async fn reject_all(&self) {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        pending.clear();
        if count > 0 {
            debug!(count, "PromptBroker: rejected all pending prompts");
        }
    }

    /// Number of pending prompts.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answered_prompt() {
        let broker = PromptBroker::new();
        let (id, rx) = broker.register().await;
        assert_eq!(broker.len().await, 1);

        let responder = broker.clone();
        let respond_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(responder.complete(&respond_id, "blue".to_string()).await);
        });

        let outcome = broker.wait(&id, rx, Duration::from_secs(1)).await;
        assert_eq!(outcome, PromptOutcome::Answered("blue".to_string()));
        assert_eq!(broker.len().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let broker = PromptBroker::new();
        let (id, rx) = broker.register().await;

        let outcome = broker.wait(&id, rx, Duration::from_millis(10)).await;
        assert_eq!(outcome, PromptOutcome::TimedOut);
        assert_eq!(broker.len().await, 0);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let broker = PromptBroker::new();
        let (id, rx) = broker.register().await;

        assert!(broker.complete(&id, "first".to_string()).await);
        assert!(!broker.complete(&id, "second".to_string()).await);

        let outcome = broker.wait(&id, rx, Duration::from_secs(1)).await;
        assert_eq!(outcome, PromptOutcome::Answered("first".to_string()));
    }

    #[tokio::test]
    async fn test_complete_unknown_id_is_noop() {
        let broker = PromptBroker::new();
        assert!(!broker.complete("prompt_nope", "data".to_string()).await);
    }

    #[tokio::test]
    async fn test_reject_all_clears_pending() {
        let broker = PromptBroker::new();
        let (_id1, rx1) = broker.register().await;
        let (_id2, _rx2) = broker.register().await;
        assert_eq!(broker.len().await, 2);

        broker.reject_all().await;
        assert!(broker.is_empty().await);

        // Waiter sees a dropped slot as a timeout-shaped outcome.
        let outcome = broker.wait("any", rx1, Duration::from_secs(1)).await;
        assert_eq!(outcome, PromptOutcome::TimedOut);
    }
}
