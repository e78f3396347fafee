use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use prfirm_core::error::Result;
use prfirm_core::state::{Draft, Guidelines, SharedState};
use prfirm_flow::{Params, RetryPolicy, StageNode, DEFAULT_ACTION};

use super::{STYLE_COMPLIANCE, STYLE_EDITOR};
use crate::context::StageContext;
use crate::style::{has_blocking, rewrite_with_constraints};

const SYSTEM_PROMPT: &str = "You are a precise marketing editor.";

/// Rewrites each draft to strip machine-sounding patterns.
///
/// Every platform gets up to `editor_passes` rewrites; the first candidate
/// free of hard violations is kept, otherwise the last one is.
pub struct StyleEditor {
    ctx: Arc<StageContext>,
}

pub struct EditorPrep {
    drafts: Vec<(Draft, Guidelines)>,
}

impl StyleEditor {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    async fn edit(&self, draft: &Draft, g: &Guidelines) -> Result<String> {
        let guidelines_json = serde_json::to_string(g)?;
        let axes_json = serde_json::to_string(&g.axes)?;
        let mut text = draft.text.clone();

        for pass in 1..=self.ctx.pipeline.editor_passes {
            let prompt = format!(
                "Rewrite the text to remove AI fingerprints (stiff transitions, predictable lists, \
                 tidy wrap-ups, monotone rhythm, platitudes). Do not change meaning or structure. \
                 Do not introduce em dashes or rhetorical contrasts.\n\n\
                 Voice: {voice} | Axes: {axes_json}\n\
                 Guidelines: {guidelines_json}\n\n\
                 Text:\n{text}",
                voice = g.voice,
            );
            text = rewrite_with_constraints(&self.ctx.ask(SYSTEM_PROMPT, prompt).await?);
            if !has_blocking(&self.ctx.checker.check(&text)) {
                debug!(platform = %g.platform, pass, "Clean candidate found");
                break;
            }
        }
        Ok(text)
    }
}

impl StageNode for StyleEditor {
    type Prep = EditorPrep;
    type Exec = BTreeMap<String, String>;

    fn name(&self) -> &str {
        STYLE_EDITOR
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.ctx.generation_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<EditorPrep> {
        let drafts = state
            .require_content(STYLE_EDITOR)?
            .iter()
            .map(|(platform, draft)| {
                let g = state.require_guidelines(STYLE_EDITOR, platform)?;
                Ok((draft.clone(), g.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EditorPrep { drafts })
    }

    fn execute<'a>(&'a self, prep: &'a EditorPrep) -> BoxFuture<'a, Result<Self::Exec>> {
        Box::pin(async move {
            let mut edited = BTreeMap::new();
            for (draft, g) in &prep.drafts {
                edited.insert(g.platform.clone(), self.edit(draft, g).await?);
            }
            Ok(edited)
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        _prep: EditorPrep,
        edited: BTreeMap<String, String>,
    ) -> Result<String> {
        for (platform, text) in edited {
            if let Some(draft) = state.content.get_mut(&platform) {
                draft.text = text;
            }
        }
        state.progress.complete_stage(STYLE_EDITOR, STYLE_COMPLIANCE);
        Ok(DEFAULT_ACTION.to_string())
    }
}
