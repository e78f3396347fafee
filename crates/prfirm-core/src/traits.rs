use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::Violation;
use crate::types::CompletionRequest;

/// Generative backend: one request, one text reply.
///
/// Implementations are backend clients and the decorators that wrap them
/// (the resilience wrapper, test scripts). Errors are ordinary failures from
/// the calling stage's point of view.
pub trait LlmClient: Send + Sync + 'static {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>>;
}

/// Style-violation detector consulted by the editing and compliance stages.
pub trait StyleChecker: Send + Sync + 'static {
    fn check(&self, text: &str) -> Vec<Violation>;
}
