use std::sync::Arc;

use tracing::debug;

use prfirm_core::config::{AppConfig, ModelConfig, PipelineConfig};
use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::platform::PlatformRegistry;
use prfirm_core::traits::{LlmClient, StyleChecker};
use prfirm_core::types::CompletionRequest;
use prfirm_flow::RetryPolicy;

use crate::style::HouseStyleChecker;

/// Collaborators every stage shares for the lifetime of a pipeline.
///
/// Built once at start-up and handed to the stages by reference; the
/// platform registry in particular is never mutated after this point.
#[derive(Clone)]
pub struct StageContext {
    pub llm: Arc<dyn LlmClient>,
    pub model: ModelConfig,
    pub registry: Arc<PlatformRegistry>,
    pub checker: Arc<dyn StyleChecker>,
    pub pipeline: PipelineConfig,
}

impl StageContext {
    /// Context with the built-in platforms (plus config overrides) and the
    /// house style checker.
    pub fn new(llm: Arc<dyn LlmClient>, config: &AppConfig) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            registry: Arc::new(PlatformRegistry::from_overrides(&config.platforms)),
            checker: Arc::new(HouseStyleChecker::new()),
            pipeline: config.pipeline.clone(),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn StyleChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_registry(mut self, registry: PlatformRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Retry policy for the drafting and editing stages.
    pub fn generation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.pipeline.generation_max_retries,
            self.pipeline.generation_wait(),
        )
    }

    /// Retry policy for the validators and the director.
    pub fn validation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.pipeline.validation_max_retries,
            self.pipeline.validation_wait(),
        )
    }

    /// One system + user exchange. A blank reply is an `LlmParse` error.
    pub async fn ask(&self, system: &str, user: String) -> Result<String> {
        let request = CompletionRequest::prompt(&self.model, system, user);
        let reply = self.llm.complete(request).await?;
        debug!(chars = reply.len(), "Model reply received");
        if reply.trim().is_empty() {
            return Err(PrFirmError::LlmParse("empty reply".into()));
        }
        Ok(reply.trim().to_string())
    }
}
