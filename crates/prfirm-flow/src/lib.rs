//! Flow engine: stage lifecycle with retry, action-based routing, and
//! batch fan-out over a dynamic item list.
//!
//! A flow is a graph of [`Runnable`]s joined by `(node, action) -> node`
//! edges. Each node runs prepare/execute/finalize against the shared state
//! and its finalize picks the next edge. A [`BatchFlow`] is itself a node
//! that runs a whole sub-flow once per item and merges the results back.

pub mod batch;
pub mod edge;
pub mod executor;
pub mod node;

pub use batch::{BatchFlow, BatchPlan, BatchPrep, IterationOutcome};
pub use edge::{Edge, EdgeTable, Route, DEFAULT_ACTION};
pub use executor::{ExecutionResult, Flow, FlowBuilder, NodeVisit};
pub use node::{
    execute_with_retry, run_node, Params, RetryPolicy, Runnable, Stage, StageNode, PLATFORM_PARAM,
};
