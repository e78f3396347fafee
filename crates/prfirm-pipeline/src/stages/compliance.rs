use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use prfirm_core::error::Result;
use prfirm_core::state::{ComplianceReport, ComplianceRound, SharedState};
use prfirm_flow::{Params, StageNode, DEFAULT_ACTION};

use super::{EDIT_CYCLE_REPORT, FACT_VALIDATOR, STYLE_COMPLIANCE, STYLE_EDITOR};
use crate::context::StageContext;
use crate::report::build_report;
use crate::revision::{decide, Decision};

const NO_REPORT: &str = "No report available.";

/// Checks every draft and decides between pass, revise, and escalate.
pub struct StyleCompliance {
    ctx: Arc<StageContext>,
}

pub struct CompliancePrep {
    drafts: BTreeMap<String, String>,
    revision_count: u32,
    evaluation: u32,
}

impl StyleCompliance {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    fn threshold(&self) -> u32 {
        self.ctx.pipeline.revision_threshold
    }
}

impl StageNode for StyleCompliance {
    type Prep = CompliancePrep;
    type Exec = (BTreeMap<String, ComplianceReport>, Decision);

    fn name(&self) -> &str {
        STYLE_COMPLIANCE
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<CompliancePrep> {
        let drafts = state
            .require_content(STYLE_COMPLIANCE)?
            .iter()
            .map(|(platform, draft)| (platform.clone(), draft.text.clone()))
            .collect();
        Ok(CompliancePrep {
            drafts,
            revision_count: state.progress.revision_count(),
            evaluation: state.compliance_history.len() as u32 + 1,
        })
    }

    fn execute<'a>(&'a self, prep: &'a CompliancePrep) -> BoxFuture<'a, Result<Self::Exec>> {
        Box::pin(async move {
            let reports: BTreeMap<String, ComplianceReport> = prep
                .drafts
                .iter()
                .map(|(platform, text)| {
                    let report = ComplianceReport::from_violations(self.ctx.checker.check(text));
                    (platform.clone(), report)
                })
                .collect();
            let blocking = reports.values().any(ComplianceReport::has_blocking);
            let decision = decide(blocking, prep.revision_count, self.threshold());
            Ok((reports, decision))
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        prep: CompliancePrep,
        (reports, decision): Self::Exec,
    ) -> Result<String> {
        let threshold = self.threshold().max(1);
        let pct = prep.evaluation.min(threshold) * 100 / threshold;
        info!(
            "Style check {}/{} ({}%): {}",
            prep.evaluation, threshold, pct, decision
        );

        state.compliance = reports.clone();
        state.compliance_history.push(ComplianceRound {
            evaluation: prep.evaluation,
            reports,
            action: decision.action().to_string(),
        });

        match decision {
            Decision::Pass => state.progress.complete_stage(STYLE_COMPLIANCE, FACT_VALIDATOR),
            Decision::Revise => {
                state.progress.record_revision();
                state.progress.complete_stage(STYLE_COMPLIANCE, STYLE_EDITOR);
            }
            Decision::Escalate => {
                let platform = state
                    .request
                    .platforms
                    .iter()
                    .find(|p| state.content.contains_key(*p))
                    .or_else(|| state.content.keys().next())
                    .cloned()
                    .unwrap_or_else(|| "n/a".to_string());
                let last_draft = state
                    .content
                    .get(&platform)
                    .map(|d| d.text.as_str())
                    .unwrap_or_default();
                let report = build_report(&state.compliance_history, last_draft, &platform);
                warn!(platform = %platform, evaluations = prep.evaluation, "Revision limit reached; escalating");
                state.findings.edit_cycle_report = Some(report);
                state.progress.require_manual_review();
                state.progress.complete_stage(STYLE_COMPLIANCE, EDIT_CYCLE_REPORT);
            }
        }
        Ok(decision.action().to_string())
    }
}

/// Terminal stage of the escalation path; makes sure a report exists.
#[derive(Debug, Default)]
pub struct EditCycleReport;

impl StageNode for EditCycleReport {
    type Prep = Option<String>;
    type Exec = String;

    fn name(&self) -> &str {
        EDIT_CYCLE_REPORT
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<Option<String>> {
        Ok(state.findings.edit_cycle_report.clone())
    }

    fn execute<'a>(&'a self, report: &'a Option<String>) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            Ok(report
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| NO_REPORT.to_string()))
        })
    }

    fn finalize(&self, state: &mut SharedState, _prep: Option<String>, report: String) -> Result<String> {
        state.findings.edit_cycle_report = Some(report);
        state.progress.complete_stage(EDIT_CYCLE_REPORT, FACT_VALIDATOR);
        info!("Max revisions reached. Report generated.");
        Ok(DEFAULT_ACTION.to_string())
    }
}
