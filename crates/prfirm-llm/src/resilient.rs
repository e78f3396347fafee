use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use prfirm_core::config::ResilienceConfig;
use prfirm_core::error::Result;
use prfirm_core::traits::LlmClient;
use prfirm_core::types::CompletionRequest;

use crate::breaker::CircuitBreaker;
use crate::rate_limit::RateLimiter;

/// An LLM client guarded by a circuit breaker and a rate limiter.
///
/// Each call passes the breaker gate, then the rate gate, then reaches the
/// inner client. Rejections fail fast and nothing is retried here; callers
/// retry according to their own policy. A rate-limit rejection is never
/// counted as a breaker failure.
pub struct ResilientClient {
    inner: Arc<dyn LlmClient>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
}

impl ResilientClient {
    pub fn new(
        inner: Arc<dyn LlmClient>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            inner,
            limiter,
            breaker,
        }
    }

    /// Wrap `inner` with a fresh limiter and breaker built from config.
    pub fn from_config(inner: Arc<dyn LlmClient>, config: &ResilienceConfig) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.max_calls, config.rate_limit.period());
        let breaker = CircuitBreaker::new(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.open_duration(),
        );
        Self::new(inner, Arc::new(limiter), Arc::new(breaker))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl LlmClient for ResilientClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let permit = self.breaker.try_acquire()?;
            // an undecided permit is released on drop
            self.limiter.try_acquire()?;

            match self.inner.complete(request).await {
                Ok(text) => {
                    permit.succeeded();
                    Ok(text)
                }
                Err(e) => {
                    debug!(error = %e, "Guarded call failed");
                    permit.failed();
                    Err(e)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::breaker::CircuitState;
    use prfirm_core::config::ModelConfig;
    use prfirm_core::error::PrFirmError;
    use prfirm_test_utils::{FailingLlm, ScriptedLlm};

    fn request() -> CompletionRequest {
        CompletionRequest::prompt(&ModelConfig::default(), "system", "user")
    }

    fn guarded(inner: Arc<dyn LlmClient>, max_calls: u32, threshold: u32) -> ResilientClient {
        ResilientClient::new(
            inner,
            Arc::new(RateLimiter::new(max_calls, Duration::from_secs(60))),
            Arc::new(CircuitBreaker::new(threshold, Duration::from_secs(30))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_through_when_healthy() {
        let llm = Arc::new(ScriptedLlm::repeating("copy"));
        let client = guarded(llm.clone(), 10, 3);
        assert_eq!(client.complete(request()).await.unwrap(), "copy");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rejects_without_calling_inner() {
        let llm = Arc::new(ScriptedLlm::repeating("ok"));
        let client = guarded(llm.clone(), 2, 3);
        client.complete(request()).await.unwrap();
        client.complete(request()).await.unwrap();

        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, PrFirmError::RateLimitExceeded { .. }));
        assert_eq!(llm.call_count(), 2);
        // rate rejection is not a breaker failure
        assert_eq!(client.breaker().failure_count(), 0);
        assert_eq!(client.breaker().state(), CircuitState::Closed);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(client.complete(request()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_inner_call() {
        let llm = Arc::new(FailingLlm::new("HTTP 503: unavailable"));
        let client = guarded(llm.clone(), 100, 2);

        for _ in 0..2 {
            let err = client.complete(request()).await.unwrap_err();
            assert!(matches!(err, PrFirmError::LlmRequest(_)));
        }
        assert_eq!(client.breaker().state(), CircuitState::Open);

        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, PrFirmError::CircuitOpen { .. }));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_after_open_duration_recovers() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_err("HTTP 500")
                .then_ok("recovered"),
        );
        let client = guarded(llm.clone(), 100, 1);

        assert!(client.complete(request()).await.is_err());
        assert!(client.complete(request()).await.is_err());
        assert_eq!(llm.call_count(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(client.complete(request()).await.unwrap(), "recovered");
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_rejected_trial_does_not_wedge_half_open() {
        let llm = Arc::new(ScriptedLlm::new().then_err("HTTP 500").then_ok("ok"));
        let client = guarded(llm.clone(), 1, 1);

        // consumes the single rate slot and opens the circuit
        assert!(client.complete(request()).await.is_err());
        tokio::time::advance(Duration::from_secs(30)).await;

        // window of 60s still full: trial rejected by the rate gate
        let err = client.complete(request()).await.unwrap_err();
        assert!(matches!(err, PrFirmError::RateLimitExceeded { .. }));
        assert_eq!(client.breaker().state(), CircuitState::HalfOpen);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(client.complete(request()).await.unwrap(), "ok");
    }
}
