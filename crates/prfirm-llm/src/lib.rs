pub mod breaker;
pub mod providers;
pub mod rate_limit;
pub mod resilient;

use std::sync::Arc;

use prfirm_core::config::{ModelConfig, ResilienceConfig};
use prfirm_core::error::Result;
use prfirm_core::traits::LlmClient;

pub use breaker::{CallPermit, CircuitBreaker, CircuitState};
pub use providers::openai::OpenAiClient;
pub use rate_limit::RateLimiter;
pub use resilient::ResilientClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn LlmClient>> {
    // Every supported provider speaks the OpenAI-compatible protocol
    Ok(Arc::new(OpenAiClient::from_config(config)?))
}

/// Create the provider client wrapped in the process-wide resilience guards.
pub fn create_guarded_client(
    model: &ModelConfig,
    resilience: &ResilienceConfig,
) -> Result<Arc<dyn LlmClient>> {
    let inner = create_client(model)?;
    Ok(Arc::new(ResilientClient::from_config(inner, resilience)))
}
