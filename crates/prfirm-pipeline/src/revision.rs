//! Pass / Revise / Escalate decision for the compliance stage.

use std::fmt;

/// Outcome of one compliance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Revise,
    Escalate,
}

impl Decision {
    /// Action label routed on by the flow.
    pub fn action(self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::Revise => "revise",
            Decision::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Decide the transition for an evaluation.
///
/// `revision_count` is the number of Revise transitions taken so far, so a
/// violating evaluation is the `(revision_count + 1)`-th one. It revises
/// while that number stays below `threshold` and escalates once it reaches
/// it. The compliance stage is therefore evaluated at most
/// `max(threshold, 1)` times per run.
pub fn decide(has_violations: bool, revision_count: u32, threshold: u32) -> Decision {
    if !has_violations {
        Decision::Pass
    } else if revision_count.saturating_add(1) < threshold {
        Decision::Revise
    } else {
        Decision::Escalate
    }
}
