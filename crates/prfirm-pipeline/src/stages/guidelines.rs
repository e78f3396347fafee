use futures::future::BoxFuture;
use tracing::{debug, info};

use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::platform::{PlatformRegistry, PlatformSpec};
use prfirm_core::state::{Guidelines, Persona, SharedState};
use prfirm_flow::{
    BatchFlow, BatchPlan, Flow, IterationOutcome, Params, StageNode, DEFAULT_ACTION,
    PLATFORM_PARAM,
};

use super::{CONTENT_CRAFTSMAN, GUIDELINES, GUIDELINES_ROUTER};
use crate::context::StageContext;

/// Dispatches a sub-flow iteration to its platform's node by returning the
/// bound platform as the action.
#[derive(Debug, Default)]
pub struct GuidelinesRouter;

impl StageNode for GuidelinesRouter {
    type Prep = String;
    type Exec = ();

    fn name(&self) -> &str {
        GUIDELINES_ROUTER
    }

    fn prepare(&self, _state: &SharedState, params: &Params) -> Result<String> {
        params
            .get(PLATFORM_PARAM)
            .map(str::to_string)
            .ok_or_else(|| PrFirmError::invariant(GUIDELINES_ROUTER, "no platform bound"))
    }

    fn execute<'a>(&'a self, _platform: &'a String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn finalize(&self, _state: &mut SharedState, platform: String, _exec: ()) -> Result<String> {
        Ok(platform)
    }
}

/// Builds the guidelines for one platform from its registry spec and the
/// aligned persona. One instance exists per registered platform.
pub struct GuidelinesNode {
    name: String,
    spec: PlatformSpec,
}

pub struct GuidelinesPrep {
    persona: Persona,
    intent: String,
    subreddit: Option<String>,
}

impl GuidelinesNode {
    pub fn new(spec: PlatformSpec) -> Self {
        Self {
            name: Self::node_name(&spec.name),
            spec,
        }
    }

    pub fn node_name(platform: &str) -> String {
        format!("{platform}_guidelines")
    }
}

impl StageNode for GuidelinesNode {
    type Prep = GuidelinesPrep;
    type Exec = Guidelines;

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<GuidelinesPrep> {
        let persona = state.require_persona(&self.name)?.clone();
        let intent = state
            .request
            .intents
            .get(&self.spec.name)
            .map(|i| i.value.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.spec.default_intent.clone());
        let subreddit = if self.spec.name == "reddit" {
            state.request.subreddit.clone()
        } else {
            None
        };
        Ok(GuidelinesPrep {
            persona,
            intent,
            subreddit,
        })
    }

    fn execute<'a>(&'a self, prep: &'a GuidelinesPrep) -> BoxFuture<'a, Result<Guidelines>> {
        Box::pin(async move {
            let spec = &self.spec;
            let mut notes = spec.notes.clone();
            if let Some(sub) = &prep.subreddit {
                notes.push(format!("Follow the posting rules of r/{sub}."));
            }
            Ok(Guidelines {
                platform: spec.name.clone(),
                intent: prep.intent.clone(),
                structure: spec.structure.clone(),
                section_budgets: spec
                    .structure
                    .iter()
                    .map(|section| (section.clone(), spec.budget_for(section)))
                    .collect(),
                limits: spec.limits.clone(),
                hashtags: spec.hashtags.clone(),
                voice: prep.persona.voice.clone(),
                axes: prep.persona.axes.clone(),
                forbiddens: prep.persona.forbiddens.iter().cloned().collect(),
                notes,
                subreddit: prep.subreddit.clone(),
            })
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        _prep: GuidelinesPrep,
        guidelines: Guidelines,
    ) -> Result<String> {
        debug!(platform = %guidelines.platform, intent = %guidelines.intent, "Guidelines built");
        state
            .guidelines
            .insert(guidelines.platform.clone(), guidelines);
        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Router plus one guidelines node per registered platform.
pub fn guidelines_flow(registry: &PlatformRegistry) -> Result<Flow> {
    let mut builder = Flow::builder("platform_guidelines").stage(GuidelinesRouter);
    for spec in registry.iter() {
        let node = GuidelinesNode::new(spec.clone());
        builder = builder
            .edge(GUIDELINES_ROUTER, &spec.name, node.name())
            .stage(node);
    }
    builder.entry(GUIDELINES_ROUTER).build()
}

/// One iteration per requested platform; merges each iteration's own
/// guidelines entry.
#[derive(Debug, Default)]
pub struct GuidelinesPlan;

impl BatchPlan for GuidelinesPlan {
    fn name(&self) -> &str {
        GUIDELINES
    }

    fn items(&self, state: &SharedState) -> Result<Vec<Params>> {
        if state.request.platforms.is_empty() {
            return Err(PrFirmError::invariant(GUIDELINES, "no platforms requested"));
        }
        Ok(state
            .request
            .platforms
            .iter()
            .map(Params::platform)
            .collect())
    }

    fn merge(&self, state: &mut SharedState, outcomes: Vec<IterationOutcome>) -> Result<String> {
        let count = outcomes.len();
        for mut outcome in outcomes {
            let guidelines = outcome.state.guidelines.remove(&outcome.key).ok_or_else(|| {
                PrFirmError::invariant(
                    GUIDELINES,
                    format!("iteration for '{}' produced no guidelines", outcome.key),
                )
            })?;
            state.guidelines.insert(outcome.key, guidelines);
        }
        state.progress.complete_stage(GUIDELINES, CONTENT_CRAFTSMAN);
        info!(platforms = count, "Platform guidelines ready");
        Ok(DEFAULT_ACTION.to_string())
    }
}

/// The guidelines stage: a batch over the requested platforms.
pub fn guidelines_batch(ctx: &StageContext) -> Result<BatchFlow<GuidelinesPlan>> {
    let flow = guidelines_flow(&ctx.registry)?;
    Ok(BatchFlow::new(GuidelinesPlan, flow).with_concurrency(ctx.pipeline.batch_concurrency))
}
