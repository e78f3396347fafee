use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::state::SharedState;

use crate::executor::Flow;
use crate::node::{Params, RetryPolicy, StageNode, PLATFORM_PARAM};

/// What a batch iterates over and how iteration results fold back into
/// the outer state.
pub trait BatchPlan: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Parameter whose value identifies an iteration. Keys must be unique.
    fn key_param(&self) -> &str {
        PLATFORM_PARAM
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// One parameter set per iteration, in merge order.
    fn items(&self, state: &SharedState) -> Result<Vec<Params>>;

    /// Fold the outcomes (already in item order) into `state` and return
    /// the batch node's action.
    fn merge(&self, state: &mut SharedState, outcomes: Vec<IterationOutcome>) -> Result<String>;
}

/// Terminal state of one sub-flow iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub key: String,
    pub params: Params,
    pub state: SharedState,
    pub last_action: String,
}

/// Prepared batch: the state snapshot every iteration starts from and the
/// keyed item list.
pub struct BatchPrep {
    snapshot: SharedState,
    items: Vec<(String, Params)>,
}

impl BatchPrep {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }
}

/// A node that runs a whole sub-flow once per item and merges the results.
///
/// Every iteration runs on its own copy of the state taken at prepare time,
/// so concurrent iterations never share mutable data. At most `concurrency`
/// iterations run at once; `1` runs them strictly in order.
pub struct BatchFlow<P> {
    plan: P,
    flow: Arc<Flow>,
    concurrency: usize,
}

impl<P: BatchPlan> BatchFlow<P> {
    pub fn new(plan: P, flow: Flow) -> Self {
        Self {
            plan,
            flow: Arc::new(flow),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn plan(&self) -> &P {
        &self.plan
    }
}

impl<P: BatchPlan> StageNode for BatchFlow<P> {
    type Prep = BatchPrep;
    type Exec = Vec<IterationOutcome>;

    fn name(&self) -> &str {
        self.plan.name()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.plan.retry_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<BatchPrep> {
        let key_param = self.plan.key_param();
        let mut seen = BTreeSet::new();
        let mut items = Vec::new();
        for params in self.plan.items(state)? {
            let key = params
                .get(key_param)
                .ok_or_else(|| {
                    PrFirmError::invariant(
                        self.name(),
                        format!("batch item is missing the '{key_param}' parameter"),
                    )
                })?
                .to_string();
            if !seen.insert(key.clone()) {
                return Err(PrFirmError::invariant(
                    self.name(),
                    format!("two batch iterations share the key '{key}'"),
                ));
            }
            items.push((key, params));
        }
        Ok(BatchPrep {
            snapshot: state.clone(),
            items,
        })
    }

    fn execute<'a>(&'a self, prep: &'a BatchPrep) -> BoxFuture<'a, Result<Vec<IterationOutcome>>> {
        Box::pin(async move {
            let processed = AtomicUsize::new(0);
            let total = prep.items.len();
            let flow = &self.flow;
            let processed_ref = &processed;

            let tasks = prep.items.iter().enumerate().map(move |(index, (key, params))| {
                let mut iteration_state = prep.snapshot.clone();
                async move {
                    debug!(batch = self.name(), key = %key, "Starting iteration");
                    let result = flow.execute(&mut iteration_state, params).await;
                    let done = processed_ref.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(batch = self.name(), key = %key, done, total, "Iteration finished");
                    result.map(|r| {
                        (
                            index,
                            IterationOutcome {
                                key: key.clone(),
                                params: params.clone(),
                                state: iteration_state,
                                last_action: r.last_action,
                            },
                        )
                    })
                }
            }).collect::<Vec<_>>();

            let results: Vec<Result<(usize, IterationOutcome)>> = stream::iter(tasks)
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let mut outcomes = results.into_iter().collect::<Result<Vec<_>>>()?;
            outcomes.sort_by_key(|(index, _)| *index);

            info!(
                batch = self.name(),
                processed = processed.load(Ordering::SeqCst),
                "Batch complete"
            );
            Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        _prep: BatchPrep,
        outcomes: Vec<IterationOutcome>,
    ) -> Result<String> {
        self.plan.merge(state, outcomes)
    }
}
