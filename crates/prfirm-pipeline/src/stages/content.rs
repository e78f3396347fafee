use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use prfirm_core::error::Result;
use prfirm_core::state::{Draft, Guidelines, Section, SharedState};
use prfirm_flow::{Params, RetryPolicy, StageNode, DEFAULT_ACTION};

use super::{CONTENT_CRAFTSMAN, STYLE_EDITOR};
use crate::context::StageContext;
use crate::style::{place_hashtags, rewrite_with_constraints};

const SYSTEM_PROMPT: &str =
    "You write concise, on-brand marketing copy that strictly follows constraints.";

/// Drafts every platform section by section.
pub struct ContentCraftsman {
    ctx: Arc<StageContext>,
}

pub struct ContentPrep {
    topic: String,
    guidelines: Vec<Guidelines>,
}

impl ContentCraftsman {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    async fn draft(&self, topic: &str, g: &Guidelines) -> Result<Draft> {
        let guidelines_json = serde_json::to_string(g)?;
        let axes_json = serde_json::to_string(&g.axes)?;
        let mut sections = Vec::with_capacity(g.structure.len());

        for section in &g.structure {
            let budget = g.section_budgets.get(section).copied().unwrap_or(120);
            let prompt = format!(
                "Platform: {platform}\n\
                 Section: {section}\n\
                 Topic/Goal: {topic}\n\
                 Intent: {intent}\n\
                 Voice: {voice} | Axes: {axes_json}\n\
                 Guidelines: {guidelines_json}\n\
                 Constraints: No em dash; no rhetorical contrasts; respect structure; \
                 keep within ~{budget} chars.",
                platform = g.platform,
                intent = g.intent,
                voice = g.voice,
            );
            let text = self.ctx.ask(SYSTEM_PROMPT, prompt).await?;
            debug!(platform = %g.platform, section = %section, chars = text.len(), "Section drafted");
            sections.push(Section {
                name: section.clone(),
                text,
            });
        }

        let joined = sections
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text = rewrite_with_constraints(&place_hashtags(&joined, &g.hashtags));
        Ok(Draft { sections, text })
    }
}

impl StageNode for ContentCraftsman {
    type Prep = ContentPrep;
    type Exec = BTreeMap<String, Draft>;

    fn name(&self) -> &str {
        CONTENT_CRAFTSMAN
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.ctx.generation_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<ContentPrep> {
        let guidelines = state
            .request
            .platforms
            .iter()
            .map(|p| state.require_guidelines(CONTENT_CRAFTSMAN, p).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(ContentPrep {
            topic: state.request.topic.clone(),
            guidelines,
        })
    }

    fn execute<'a>(&'a self, prep: &'a ContentPrep) -> BoxFuture<'a, Result<Self::Exec>> {
        Box::pin(async move {
            let mut drafts = BTreeMap::new();
            for g in &prep.guidelines {
                drafts.insert(g.platform.clone(), self.draft(&prep.topic, g).await?);
            }
            Ok(drafts)
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        _prep: ContentPrep,
        drafts: BTreeMap<String, Draft>,
    ) -> Result<String> {
        info!(platforms = drafts.len(), "Drafts written");
        state.content = drafts;
        state.progress.complete_stage(CONTENT_CRAFTSMAN, STYLE_EDITOR);
        Ok(DEFAULT_ACTION.to_string())
    }
}
