use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use prfirm_core::error::Result;
use prfirm_core::state::SharedState;

/// Binding key a batch uses for the platform of the current iteration.
pub const PLATFORM_PARAM: &str = "platform";

/// Per-iteration parameter binding handed to every node of a sub-flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn platform(platform: impl Into<String>) -> Self {
        Self::new().with(PLATFORM_PARAM, platform)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Node-level retry: `max_retries` extra attempts, `wait` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self { max_retries, wait }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Atomic unit of pipeline work.
///
/// `prepare` reads what the node needs out of the shared state, `execute`
/// does the (possibly slow, possibly failing) work without touching state,
/// and `finalize` writes the result back and returns the action label that
/// picks the next node. Only `execute` is retried.
pub trait StageNode: Send + Sync + 'static {
    type Prep: Send + Sync + 'static;
    type Exec: Send + 'static;

    fn name(&self) -> &str;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    fn prepare(&self, state: &SharedState, params: &Params) -> Result<Self::Prep>;

    fn execute<'a>(&'a self, prep: &'a Self::Prep) -> BoxFuture<'a, Result<Self::Exec>>;

    fn finalize(
        &self,
        state: &mut SharedState,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> Result<String>;
}

/// Run one node through prepare, execute (with retry), and finalize.
pub async fn run_node<N: StageNode>(
    node: &N,
    state: &mut SharedState,
    params: &Params,
) -> Result<String> {
    let prep = node.prepare(state, params)?;
    let exec = execute_with_retry(node, &prep).await?;
    node.finalize(state, prep, exec)
}

/// Call `execute` until it succeeds, a non-retryable error occurs, or the
/// policy's attempts are spent. The last error is returned unchanged.
pub async fn execute_with_retry<N: StageNode>(node: &N, prep: &N::Prep) -> Result<N::Exec> {
    let policy = node.retry_policy();
    let mut attempt = 0;
    loop {
        match node.execute(prep).await {
            Ok(exec) => return Ok(exec),
            Err(e) => {
                if e.is_retryable() && attempt < policy.max_retries {
                    attempt += 1;
                    warn!(
                        node = node.name(),
                        attempt,
                        max_retries = policy.max_retries,
                        wait_ms = policy.wait.as_millis() as u64,
                        error = %e,
                        "Retrying node"
                    );
                    tokio::time::sleep(policy.wait).await;
                    continue;
                }
                debug!(node = node.name(), attempts = attempt + 1, error = %e, "Node failed");
                return Err(e);
            }
        }
    }
}

/// Object-safe view of anything the flow engine can step into: a single
/// stage or a whole sub-flow.
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Adapts a [`StageNode`] into a [`Runnable`].
pub struct Stage<N>(pub N);

impl<N: StageNode> Stage<N> {
    pub fn new(node: N) -> Self {
        Self(node)
    }

    pub fn inner(&self) -> &N {
        &self.0
    }
}

impl<N: StageNode> Runnable for Stage<N> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn run<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(run_node(&self.0, state, params))
    }
}
