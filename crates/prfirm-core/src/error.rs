use thiserror::Error;

use crate::state::SharedState;

#[derive(Debug, Error)]
pub enum PrFirmError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Resilience errors
    #[error("Rate limit exceeded: at most {max_calls} calls per {period_ms}ms")]
    RateLimitExceeded { max_calls: u32, period_ms: u64 },

    #[error("Circuit open: calls rejected for another {retry_in_ms}ms")]
    CircuitOpen { retry_in_ms: u64 },

    // Pipeline errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("No route from node '{node}' for action '{action}' (stage: {stage})")]
    Routing {
        stage: String,
        node: String,
        action: String,
    },

    #[error("State invariant violated in {stage}: {message}")]
    StateInvariant { stage: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PrFirmError {
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn invariant(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateInvariant {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether a node's own retry policy may absorb this error.
    ///
    /// Routing and state-invariant failures always abort the run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PrFirmError::NodeExecution { .. }
                | PrFirmError::LlmRequest(_)
                | PrFirmError::LlmParse(_)
                | PrFirmError::RateLimitExceeded { .. }
                | PrFirmError::CircuitOpen { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PrFirmError>;

/// A fatal run error together with the state as it stood when the run stopped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: PrFirmError,
    pub state: Box<SharedState>,
}

impl RunFailure {
    pub fn new(error: PrFirmError, state: SharedState) -> Self {
        Self {
            error,
            state: Box::new(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PrFirmError::node("content_craftsman", "boom").is_retryable());
        assert!(PrFirmError::LlmRequest("HTTP 502".into()).is_retryable());
        assert!(PrFirmError::RateLimitExceeded {
            max_calls: 1,
            period_ms: 1000
        }
        .is_retryable());
        assert!(PrFirmError::CircuitOpen { retry_in_ms: 10 }.is_retryable());

        assert!(!PrFirmError::Routing {
            stage: "style_compliance".into(),
            node: "style_compliance".into(),
            action: "unknown".into(),
        }
        .is_retryable());
        assert!(!PrFirmError::invariant("content_craftsman", "no persona").is_retryable());
        assert!(!PrFirmError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_routing_error_message_has_context() {
        let err = PrFirmError::Routing {
            stage: "style_compliance".into(),
            node: "style_compliance".into(),
            action: "maybe".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("style_compliance"));
        assert!(msg.contains("maybe"));
    }

    #[test]
    fn test_run_failure_keeps_partial_state() {
        let mut state = SharedState::default();
        state.request.topic = "launch".into();
        let failure = RunFailure::new(PrFirmError::Config("x".into()), state);
        assert_eq!(failure.state.request.topic, "launch");
        assert_eq!(failure.to_string(), "Config error: x");
    }
}
