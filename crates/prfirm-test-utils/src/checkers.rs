use std::sync::atomic::{AtomicUsize, Ordering};

use prfirm_core::state::{Severity, Violation};
use prfirm_core::traits::StyleChecker;

/// Reports nothing, ever.
pub struct NeverViolating;

impl StyleChecker for NeverViolating {
    fn check(&self, _text: &str) -> Vec<Violation> {
        Vec::new()
    }
}

/// Reports one hard violation for every text and counts the checks.
#[derive(Default)]
pub struct AlwaysViolating {
    checks: AtomicUsize,
}

impl AlwaysViolating {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl StyleChecker for AlwaysViolating {
    fn check(&self, text: &str) -> Vec<Violation> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        vec![Violation {
            kind: "em_dash".into(),
            start: 0,
            end: text.len().min(1),
            severity: Severity::Hard,
        }]
    }
}
