//! LlmProvider trait and the retry layer.
//!
//! A provider is stateless: each call carries the full conversation. Retry
//! and backoff live here, in front of the concrete adapters, so callers see
//! either a response or an exhausted error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cancel::CancelToken;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// The single capability the orchestration core needs from an LLM vendor.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Return the next assistant message for a conversation and tool catalogue.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Exponential backoff policy for retryable adapter failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given zero-based retry index.
    fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << retry.min(16));
        exp.min(self.max_delay)
    }
}

/// Run a completion with retries for retryable failures.
///
/// Rate-limit responses honour the server-suggested delay. Validation-class
/// errors (unparseable responses, bad requests) are surfaced immediately.
/// Cancellation aborts the in-flight HTTP call and any backoff sleep.
pub async fn complete_with_retry(
    provider: &Arc<dyn LlmProvider>,
    request: CompletionRequest,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<CompletionResponse, LlmError> {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        attempt += 1;
        debug!(attempt, max = policy.max_attempts, "complete_with_retry: calling provider");

        let result = tokio::select! {
            r = provider.complete(request.clone()) => r,
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                warn!(attempt, error = %e, "complete_with_retry: retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = e.retry_after().unwrap_or_else(|| policy.delay_for(attempt - 1));
                warn!(attempt, ?delay, error = %e, "complete_with_retry: retrying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                }
            }
        }
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider for unit tests: returns canned responses in order.
    pub struct MockProvider {
        responses: std::sync::Mutex<Vec<Result<CompletionResponse, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into_iter().map(Ok).collect()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn with_results(results: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(results),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("no more scripted responses".to_string()));
            }
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "test".to_string(),
            messages: vec![],
            tools: vec![],
            max_tokens: 100,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new(vec![CompletionResponse::text("ok")]));
        let cancel = CancelToken::new();

        let response = complete_with_retry(&provider, request(), &fast_policy(), &cancel)
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_retries_retryable_then_succeeds() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::with_results(vec![
            Err(LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Err(LlmError::Timeout(Duration::from_millis(1))),
            Ok(CompletionResponse::text("recovered")),
        ]));
        let cancel = CancelToken::new();

        let response = complete_with_retry(&provider, request(), &fast_policy(), &cancel)
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("recovered"));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let mock = Arc::new(MockProvider::with_results(vec![
            Err(LlmError::InvalidResponse("garbage".to_string())),
            Ok(CompletionResponse::text("unreachable")),
        ]));
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let cancel = CancelToken::new();

        let result = complete_with_retry(&provider, request(), &fast_policy(), &cancel).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let mock = Arc::new(MockProvider::with_results(vec![
            Err(LlmError::Timeout(Duration::from_millis(1))),
            Err(LlmError::Timeout(Duration::from_millis(1))),
            Err(LlmError::Timeout(Duration::from_millis(1))),
            Ok(CompletionResponse::text("too late")),
        ]));
        let provider: Arc<dyn LlmProvider> = mock.clone();
        let cancel = CancelToken::new();

        let result = complete_with_retry(&provider, request(), &fast_policy(), &cancel).await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancel_aborts() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::with_results(vec![Err(LlmError::RateLimited {
            retry_after: Duration::from_secs(60),
        })]));
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = complete_with_retry(&provider, request(), &fast_policy(), &cancel).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
    }
}
