use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::traits::LlmClient;
use prfirm_core::types::CompletionRequest;

/// Replays a fixed script of replies, then falls back to a repeating reply.
///
/// Scripted errors surface as `LlmRequest`. With no fallback, running past
/// the end of the script is an error too.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self::new().otherwise(text)
    }

    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    pub fn then_err(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()))
    }

    /// Reply used once the script is exhausted.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    fn push(self, step: std::result::Result<String, String>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let reply = match step {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(PrFirmError::LlmRequest(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| PrFirmError::LlmRequest("script exhausted".into())),
        };
        Box::pin(async move { reply })
    }
}

/// Fails every call with the same `LlmRequest` error.
pub struct FailingLlm {
    message: String,
    calls: AtomicUsize,
}

impl FailingLlm {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for FailingLlm {
    fn complete(&self, _request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = self.message.clone();
        Box::pin(async move { Err(PrFirmError::LlmRequest(message)) })
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;

/// Answers each request by calling a closure on it.
pub struct FnLlm {
    respond: Box<Responder>,
    calls: AtomicUsize,
}

impl FnLlm {
    pub fn new(
        respond: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for FnLlm {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.respond)(&request);
        Box::pin(async move { reply })
    }
}
