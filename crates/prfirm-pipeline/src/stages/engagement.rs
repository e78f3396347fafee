use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::state::{CampaignRequest, Intent, IntentKind, SharedState};
use prfirm_flow::{Params, RetryPolicy, StageNode, DEFAULT_ACTION};

use super::{BRAND_BIBLE_INGEST, ENGAGEMENT};
use crate::context::StageContext;
use crate::json::extract_object;

const SYSTEM_PROMPT: &str = "You are a marketing strategist.";

/// Normalises the campaign request and proposes intents for platforms
/// marked `auto`.
pub struct EngagementManager {
    ctx: Arc<StageContext>,
}

pub struct EngagementPrep {
    request: CampaignRequest,
    auto_platforms: Vec<String>,
}

impl EngagementManager {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    fn fallback_intent(&self, platform: &str) -> String {
        self.ctx
            .registry
            .get(platform)
            .map(|spec| spec.default_intent.clone())
            .unwrap_or_else(|| "general".to_string())
    }
}

impl StageNode for EngagementManager {
    type Prep = EngagementPrep;
    type Exec = BTreeMap<String, String>;

    fn name(&self) -> &str {
        ENGAGEMENT
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.ctx.validation_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<EngagementPrep> {
        let mut normalized = SharedState::new(state.request.clone());
        normalized.populate_defaults(&self.ctx.registry);
        let request = normalized.request;

        let (_, unknown) = self.ctx.registry.validate(&request.platforms);
        if !unknown.is_empty() {
            return Err(PrFirmError::invariant(
                ENGAGEMENT,
                format!(
                    "unknown platform(s): {} (known: {})",
                    unknown.join(", "),
                    self.ctx.registry.names().join(", ")
                ),
            ));
        }

        let auto_platforms = request
            .platforms
            .iter()
            .filter(|p| {
                request
                    .intents
                    .get(*p)
                    .is_some_and(|i| i.kind == IntentKind::Auto && i.value.is_empty())
            })
            .cloned()
            .collect();

        Ok(EngagementPrep {
            request,
            auto_platforms,
        })
    }

    fn execute<'a>(&'a self, prep: &'a EngagementPrep) -> BoxFuture<'a, Result<Self::Exec>> {
        Box::pin(async move {
            if prep.auto_platforms.is_empty() {
                return Ok(BTreeMap::new());
            }

            let prompt = format!(
                "Suggest a concise posting intent for each platform for the given topic.\n\
                 Respond with a JSON object mapping platform name to intent string.\n\
                 Platforms: {}\nTopic: {}",
                prep.auto_platforms.join(", "),
                prep.request.topic
            );
            let reply = self.ctx.ask(SYSTEM_PROMPT, prompt).await?;

            let proposed: BTreeMap<String, String> = extract_object(&reply)
                .and_then(|v| v.as_object().cloned())
                .map(|map| {
                    map.into_iter()
                        .filter_map(|(k, v)| {
                            let value = v.as_str()?.trim().to_string();
                            (!value.is_empty()).then(|| (k.trim().to_lowercase(), value))
                        })
                        .collect()
                })
                .unwrap_or_else(|| {
                    warn!("Intent proposal was not a JSON object; using platform defaults");
                    BTreeMap::new()
                });

            Ok(prep
                .auto_platforms
                .iter()
                .map(|platform| {
                    let intent = proposed
                        .get(platform)
                        .cloned()
                        .unwrap_or_else(|| self.fallback_intent(platform));
                    (platform.clone(), intent)
                })
                .collect())
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        prep: EngagementPrep,
        proposed: BTreeMap<String, String>,
    ) -> Result<String> {
        state.request = prep.request;
        for (platform, value) in proposed {
            state.request.intents.insert(
                platform,
                Intent {
                    kind: IntentKind::Auto,
                    value,
                },
            );
        }
        state.progress.complete_stage(ENGAGEMENT, BRAND_BIBLE_INGEST);
        info!(platforms = ?state.request.platforms, "Engagement data prepared");
        Ok(DEFAULT_ACTION.to_string())
    }
}
