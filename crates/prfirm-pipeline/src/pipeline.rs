use std::sync::Arc;

use tracing::{error, info};

use prfirm_core::error::{Result, RunFailure};
use prfirm_core::platform::PlatformRegistry;
use prfirm_core::state::SharedState;
use prfirm_flow::{ExecutionResult, Flow, Params};

use crate::context::StageContext;
use crate::stages::{
    guidelines_batch, AgencyDirector, AuthenticityAuditor, BrandBibleIngest, BrandGuardian,
    ContentCraftsman, EditCycleReport, EngagementManager, FactValidator, ReviewStage,
    StyleCompliance, StyleEditor, VoiceAlignment, AGENCY_DIRECTOR, AUTHENTICITY_AUDITOR,
    BRAND_BIBLE_INGEST, BRAND_GUARDIAN, CONTENT_CRAFTSMAN, EDIT_CYCLE_REPORT, ENGAGEMENT,
    FACT_VALIDATOR, GUIDELINES, STYLE_COMPLIANCE, STYLE_EDITOR, VOICE_ALIGNMENT,
};

/// Wire every stage into the campaign graph.
///
/// The graph is linear except for the revision loop around
/// `style_compliance`, whose `revise` edge points back at `style_editor`
/// and whose `escalate` edge detours through `edit_cycle_report`.
pub fn build_flow(ctx: &Arc<StageContext>) -> Result<Flow> {
    Flow::builder("campaign")
        .stage(EngagementManager::new(ctx.clone()))
        .stage(BrandBibleIngest)
        .stage(VoiceAlignment)
        .stage(guidelines_batch(ctx)?)
        .stage(ContentCraftsman::new(ctx.clone()))
        .stage(StyleEditor::new(ctx.clone()))
        .stage(StyleCompliance::new(ctx.clone()))
        .stage(EditCycleReport)
        .stage(ReviewStage::new(FactValidator, ctx.clone()))
        .stage(ReviewStage::new(BrandGuardian, ctx.clone()))
        .stage(ReviewStage::new(AuthenticityAuditor, ctx.clone()))
        .stage(AgencyDirector::new(ctx.clone()))
        .entry(ENGAGEMENT)
        .then(ENGAGEMENT, BRAND_BIBLE_INGEST)
        .then(BRAND_BIBLE_INGEST, VOICE_ALIGNMENT)
        .then(VOICE_ALIGNMENT, GUIDELINES)
        .then(GUIDELINES, CONTENT_CRAFTSMAN)
        .then(CONTENT_CRAFTSMAN, STYLE_EDITOR)
        .then(STYLE_EDITOR, STYLE_COMPLIANCE)
        .edge(STYLE_COMPLIANCE, "pass", FACT_VALIDATOR)
        .edge(STYLE_COMPLIANCE, "revise", STYLE_EDITOR)
        .edge(STYLE_COMPLIANCE, "escalate", EDIT_CYCLE_REPORT)
        .then(EDIT_CYCLE_REPORT, FACT_VALIDATOR)
        .then(FACT_VALIDATOR, BRAND_GUARDIAN)
        .then(BRAND_GUARDIAN, AUTHENTICITY_AUDITOR)
        .then(AUTHENTICITY_AUDITOR, AGENCY_DIRECTOR)
        .build()
}

/// A ready-to-run campaign pipeline.
pub struct Pipeline {
    ctx: Arc<StageContext>,
    flow: Flow,
}

impl Pipeline {
    pub fn new(ctx: StageContext) -> Result<Self> {
        let ctx = Arc::new(ctx);
        let flow = build_flow(&ctx)?;
        Ok(Self { ctx, flow })
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.ctx.registry
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Run the campaign to completion.
    ///
    /// On failure the returned [`RunFailure`] carries the state as it stood
    /// when the failing stage stopped.
    pub async fn run(&self, state: SharedState) -> std::result::Result<SharedState, RunFailure> {
        self.run_traced(state).await.map(|(state, _)| state)
    }

    /// Like [`Pipeline::run`], also returning the visit trace.
    pub async fn run_traced(
        &self,
        mut state: SharedState,
    ) -> std::result::Result<(SharedState, ExecutionResult), RunFailure> {
        info!(
            platforms = ?state.request.platforms,
            topic = %state.request.topic,
            "Campaign run starting"
        );
        match self.flow.execute(&mut state, &Params::new()).await {
            Ok(result) => {
                info!(
                    steps = result.visits.len(),
                    revisions = state.progress.revision_count(),
                    manual_review = state.progress.manual_review_required(),
                    elapsed_ms = result.total_elapsed_ms,
                    "Campaign run finished"
                );
                Ok((state, result))
            }
            Err(e) => {
                error!(stage = %state.progress.current_stage(), error = %e, "Campaign run failed");
                Err(RunFailure::new(e, state))
            }
        }
    }
}
