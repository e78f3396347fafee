use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info};

use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::state::SharedState;

use crate::edge::{Edge, EdgeTable, Route, DEFAULT_ACTION};
use crate::node::{Params, Runnable, Stage, StageNode};

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVisit {
    pub node: String,
    pub action: String,
    pub elapsed_ms: u64,
}

/// Trace of a completed flow run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Visits in execution order; a node appears once per visit.
    pub visits: Vec<NodeVisit>,
    /// Action returned by the final node.
    pub last_action: String,
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn visit_count(&self, node: &str) -> usize {
        self.visits.iter().filter(|v| v.node == node).count()
    }

    /// Actions returned by `node`, in order.
    pub fn actions_of(&self, node: &str) -> Vec<&str> {
        self.visits
            .iter()
            .filter(|v| v.node == node)
            .map(|v| v.action.as_str())
            .collect()
    }
}

/// A graph of runnables joined by action edges.
///
/// Execution starts at the entry node and follows `(node, action)` edges,
/// falling back to the node's `default` edge, until a node with no outgoing
/// edges finishes. Revisiting a node is allowed.
pub struct Flow {
    name: String,
    nodes: HashMap<String, Arc<dyn Runnable>>,
    edges: EdgeTable,
    entry: String,
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name)
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    /// Walk the graph over `state` with the given parameter binding.
    ///
    /// On error the state keeps every write made before the failing node.
    pub async fn execute(&self, state: &mut SharedState, params: &Params) -> Result<ExecutionResult> {
        let start = Instant::now();
        let mut visits = Vec::new();
        let mut current = self.entry.clone();

        loop {
            let node = self.nodes.get(&current).ok_or_else(|| {
                PrFirmError::Config(format!("node '{}' not found in flow '{}'", current, self.name))
            })?;

            debug!(flow = %self.name, node = %current, "Executing node");
            let node_start = Instant::now();
            let action = node.run(state, params).await?;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            debug!(flow = %self.name, node = %current, action = %action, elapsed_ms, "Node complete");
            visits.push(NodeVisit {
                node: current.clone(),
                action: action.clone(),
                elapsed_ms,
            });

            match self.edges.resolve(&current, &action) {
                Route::Next(next) => current = next.to_string(),
                Route::Terminal => {
                    info!(
                        flow = %self.name,
                        node = %current,
                        steps = visits.len(),
                        "Flow complete"
                    );
                    return Ok(ExecutionResult {
                        visits,
                        last_action: action,
                        total_elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Route::Unrouted => {
                    return Err(PrFirmError::Routing {
                        stage: state.progress.current_stage().to_string(),
                        node: current,
                        action,
                    });
                }
            }
        }
    }
}

impl Runnable for Flow {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let result = self.execute(state, params).await?;
            Ok(result.last_action)
        })
    }
}

/// Assembles a [`Flow`], checking that the entry and every edge endpoint
/// name a registered node.
pub struct FlowBuilder {
    name: String,
    nodes: Vec<Arc<dyn Runnable>>,
    edges: Vec<Edge>,
    entry: Option<String>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    /// Register a stage under its own name. The first node added is the
    /// entry unless [`FlowBuilder::entry`] says otherwise.
    pub fn stage<N: StageNode>(self, node: N) -> Self {
        self.runnable(Arc::new(Stage::new(node)))
    }

    pub fn runnable(mut self, node: Arc<dyn Runnable>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn edge(mut self, from: &str, action: &str, to: &str) -> Self {
        self.edges.push(Edge::new(from, action, to));
        self
    }

    /// `from --default--> to`
    pub fn then(self, from: &str, to: &str) -> Self {
        self.edge(from, DEFAULT_ACTION, to)
    }

    pub fn build(self) -> Result<Flow> {
        let mut nodes: HashMap<String, Arc<dyn Runnable>> = HashMap::new();
        let mut first = None;
        for node in self.nodes {
            let name = node.name().to_string();
            if nodes.contains_key(&name) {
                return Err(PrFirmError::Config(format!(
                    "duplicate node '{}' in flow '{}'",
                    name, self.name
                )));
            }
            first.get_or_insert_with(|| name.clone());
            nodes.insert(name, node);
        }

        let entry = self
            .entry
            .or(first)
            .ok_or_else(|| PrFirmError::Config(format!("flow '{}' has no nodes", self.name)))?;
        if !nodes.contains_key(&entry) {
            return Err(PrFirmError::Config(format!(
                "entry node '{}' not found in flow '{}'",
                entry, self.name
            )));
        }

        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !nodes.contains_key(end) {
                    return Err(PrFirmError::Config(format!(
                        "edge '{}' --{}--> '{}' references unknown node '{}'",
                        edge.from, edge.action, edge.to, end
                    )));
                }
            }
        }

        Ok(Flow {
            name: self.name,
            nodes,
            edges: EdgeTable::from_edges(self.edges)?,
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::node::RetryPolicy;

    /// Appends its name to the topic and returns a scripted action.
    struct Step {
        name: &'static str,
        actions: Vec<&'static str>,
        visits: AtomicU32,
    }

    impl Step {
        fn new(name: &'static str, actions: &[&'static str]) -> Self {
            Self {
                name,
                actions: actions.to_vec(),
                visits: AtomicU32::new(0),
            }
        }
    }

    impl StageNode for Step {
        type Prep = ();
        type Exec = ();

        fn name(&self) -> &str {
            self.name
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::none()
        }

        fn prepare(&self, _state: &SharedState, _params: &Params) -> Result<()> {
            Ok(())
        }

        fn execute<'a>(&'a self, _prep: &'a ()) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn finalize(&self, state: &mut SharedState, _prep: (), _exec: ()) -> Result<String> {
            let n = self.visits.fetch_add(1, Ordering::SeqCst) as usize;
            state.request.topic.push_str(self.name);
            state.request.topic.push(' ');
            let action = self
                .actions
                .get(n)
                .or(self.actions.last())
                .copied()
                .unwrap_or(DEFAULT_ACTION);
            Ok(action.to_string())
        }
    }

    #[tokio::test]
    async fn test_linear_flow_runs_to_terminal() {
        let flow = Flow::builder("linear")
            .stage(Step::new("a", &[]))
            .stage(Step::new("b", &[]))
            .stage(Step::new("c", &[]))
            .then("a", "b")
            .then("b", "c")
            .build()
            .unwrap();

        let mut state = SharedState::default();
        let result = flow.execute(&mut state, &Params::new()).await.unwrap();
        assert_eq!(state.request.topic, "a b c ");
        assert_eq!(result.visits.len(), 3);
        assert_eq!(result.last_action, "default");
    }

    #[tokio::test]
    async fn test_cycle_revisits_node_until_exit_action() {
        let flow = Flow::builder("loop")
            .stage(Step::new("edit", &[]))
            .stage(Step::new("check", &["revise", "revise", "pass"]))
            .stage(Step::new("done", &[]))
            .then("edit", "check")
            .edge("check", "revise", "edit")
            .edge("check", "pass", "done")
            .build()
            .unwrap();

        let mut state = SharedState::default();
        let result = flow.execute(&mut state, &Params::new()).await.unwrap();
        assert_eq!(result.visit_count("check"), 3);
        assert_eq!(result.actions_of("check"), vec!["revise", "revise", "pass"]);
        assert_eq!(state.request.topic, "edit check edit check edit check done ");
    }

    #[tokio::test]
    async fn test_unrouted_action_is_routing_error_with_context() {
        let flow = Flow::builder("bad")
            .stage(Step::new("check", &["maybe"]))
            .stage(Step::new("done", &[]))
            .edge("check", "pass", "done")
            .build()
            .unwrap();

        let mut state = SharedState::default();
        state.progress.set_stage("style_compliance");
        let err = flow.execute(&mut state, &Params::new()).await.unwrap_err();
        match err {
            PrFirmError::Routing {
                stage,
                node,
                action,
            } => {
                assert_eq!(stage, "style_compliance");
                assert_eq!(node, "check");
                assert_eq!(action, "maybe");
            }
            other => panic!("unexpected error: {other}"),
        }
        // writes made before the failure stay visible
        assert_eq!(state.request.topic, "check ");
    }

    #[tokio::test]
    async fn test_sub_flow_runs_as_a_node() {
        let inner = Flow::builder("inner")
            .stage(Step::new("x", &[]))
            .stage(Step::new("y", &["finished"]))
            .then("x", "y")
            .build()
            .unwrap();
        let outer = Flow::builder("outer")
            .stage(Step::new("start", &[]))
            .runnable(Arc::new(inner))
            .stage(Step::new("end", &[]))
            .then("start", "inner")
            .edge("inner", "finished", "end")
            .build()
            .unwrap();

        let mut state = SharedState::default();
        let result = outer.execute(&mut state, &Params::new()).await.unwrap();
        assert_eq!(state.request.topic, "start x y end ");
        assert_eq!(result.actions_of("inner"), vec!["finished"]);
    }

    #[test]
    fn test_builder_rejects_unknown_edge_target() {
        let err = Flow::builder("broken")
            .stage(Step::new("a", &[]))
            .then("a", "ghost")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PrFirmError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_unknown_entry_and_duplicates() {
        assert!(Flow::builder("e")
            .stage(Step::new("a", &[]))
            .entry("b")
            .build()
            .is_err());
        assert!(Flow::builder("d")
            .stage(Step::new("a", &[]))
            .stage(Step::new("a", &[]))
            .build()
            .is_err());
        assert!(Flow::builder("empty").build().is_err());
    }

    #[test]
    fn test_first_stage_is_default_entry() {
        let flow = Flow::builder("f")
            .stage(Step::new("first", &[]))
            .stage(Step::new("second", &[]))
            .build()
            .unwrap();
        assert_eq!(flow.entry(), "first");
        assert!(flow.contains("second"));
    }
}
