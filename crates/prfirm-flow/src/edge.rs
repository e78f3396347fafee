use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use prfirm_core::error::{PrFirmError, Result};

/// Action every node may fall back to when no exact edge matches.
pub const DEFAULT_ACTION: &str = "default";

/// A `(from, action) -> to` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node name.
    pub from: String,
    /// Action label returned by the source node's finalize.
    #[serde(default = "default_action")]
    pub action: String,
    /// Target node name.
    pub to: String,
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

impl Edge {
    pub fn new(from: impl Into<String>, action: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            action: action.into(),
            to: to.into(),
        }
    }

    /// Edge taken for the `default` action.
    pub fn default_to(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, DEFAULT_ACTION, to)
    }
}

/// Outcome of looking up the next node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Next(&'a str),
    /// The node has no outgoing edges: the flow ends here.
    Terminal,
    /// The node has outgoing edges but none for this action.
    Unrouted,
}

/// Adjacency table keyed by source node, then action.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    edges: BTreeMap<String, BTreeMap<String, String>>,
}

impl EdgeTable {
    /// Build the table. Two edges for the same `(from, action)` pair are
    /// rejected.
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Result<Self> {
        let mut table = Self::default();
        for edge in edges {
            let outgoing = table.edges.entry(edge.from.clone()).or_default();
            if let Some(existing) = outgoing.get(&edge.action) {
                return Err(PrFirmError::Config(format!(
                    "duplicate edge '{}' --{}--> '{}' (already goes to '{}')",
                    edge.from, edge.action, edge.to, existing
                )));
            }
            outgoing.insert(edge.action, edge.to);
        }
        Ok(table)
    }

    /// Exact action first, then the node's `default` edge.
    pub fn resolve(&self, node: &str, action: &str) -> Route<'_> {
        let Some(outgoing) = self.edges.get(node) else {
            return Route::Terminal;
        };
        outgoing
            .get(action)
            .or_else(|| outgoing.get(DEFAULT_ACTION))
            .map(|to| Route::Next(to.as_str()))
            .unwrap_or(Route::Unrouted)
    }

    pub fn has_outgoing(&self, node: &str) -> bool {
        self.edges.contains_key(node)
    }

    /// Every edge as `(from, action, to)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edges.iter().flat_map(|(from, outgoing)| {
            outgoing
                .iter()
                .map(move |(action, to)| (from.as_str(), action.as_str(), to.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
