use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use prfirm_core::error::Result;
use prfirm_core::state::{FinalBundle, Prediction, ScheduleSlot, SharedState};
use prfirm_flow::{Params, RetryPolicy, StageNode, DEFAULT_ACTION};

use super::{AGENCY_DIRECTOR, DONE};
use crate::context::StageContext;
use crate::json::parse_reply;

const SYSTEM_PROMPT: &str = "You are an experienced content operations planner.";

/// Plans publishing and packages the deliverable.
pub struct AgencyDirector {
    ctx: Arc<StageContext>,
}

/// Schedule and predictions, restricted to the drafted platforms.
#[derive(Debug, Default, PartialEq)]
pub struct Plan {
    pub schedule: Vec<ScheduleSlot>,
    pub predictions: BTreeMap<String, Prediction>,
}

#[derive(Deserialize, Default)]
struct PlanReply {
    #[serde(default)]
    schedule: Vec<ScheduleSlot>,
    #[serde(default)]
    predictions: BTreeMap<String, Prediction>,
}

impl AgencyDirector {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

/// Keep only entries for `platforms`; every platform gets a prediction.
fn plan_from_reply(reply: &str, platforms: &[String]) -> Plan {
    let reply: PlanReply = parse_reply(reply).unwrap_or_default();
    let schedule = reply
        .schedule
        .into_iter()
        .map(|mut slot| {
            slot.platform = slot.platform.trim().to_lowercase();
            slot
        })
        .filter(|slot| platforms.contains(&slot.platform))
        .collect();

    let mut proposed: BTreeMap<String, Prediction> = reply
        .predictions
        .into_iter()
        .map(|(platform, prediction)| (platform.trim().to_lowercase(), prediction))
        .collect();
    let predictions = platforms
        .iter()
        .map(|platform| {
            let prediction = proposed.remove(platform).unwrap_or_else(|| Prediction {
                expected_engagement: "medium".to_string(),
                notes: String::new(),
            });
            (platform.clone(), prediction)
        })
        .collect();

    Plan {
        schedule,
        predictions,
    }
}

impl StageNode for AgencyDirector {
    type Prep = Vec<String>;
    type Exec = Plan;

    fn name(&self) -> &str {
        AGENCY_DIRECTOR
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.ctx.validation_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<Vec<String>> {
        Ok(state
            .require_content(AGENCY_DIRECTOR)?
            .keys()
            .cloned()
            .collect())
    }

    fn execute<'a>(&'a self, platforms: &'a Vec<String>) -> BoxFuture<'a, Result<Plan>> {
        Box::pin(async move {
            let prompt = format!(
                "Given the platform drafts, propose a simple 7-day publishing schedule \
                 (date placeholders OK) and predict relative performance. Respond with JSON:\n\
                 {{\"schedule\": [{{\"platform\": \"<platform>\", \"day\": \"<Mon..Sun>\", \"time\": \"<HH:MM>\"}}],\n\
                 \"predictions\": {{\"<platform>\": {{\"expected_engagement\": \"<low|medium|high>\", \"notes\": \"<text>\"}}}}}}\n\
                 Platforms: {}",
                platforms.join(", ")
            );
            let reply = self.ctx.ask(SYSTEM_PROMPT, prompt).await?;
            Ok(plan_from_reply(&reply, platforms))
        })
    }

    fn finalize(&self, state: &mut SharedState, _prep: Vec<String>, plan: Plan) -> Result<String> {
        state.final_bundle = Some(FinalBundle {
            approved_content: state.content.clone(),
            guidelines: state.guidelines.clone(),
            edit_cycle_report: state.findings.edit_cycle_report.clone(),
            findings: state.findings.clone(),
            publishing_schedule: plan.schedule,
            performance_predictions: plan.predictions,
            manual_review_required: state.progress.manual_review_required(),
            generated_at: Utc::now(),
        });
        state.progress.complete_stage(AGENCY_DIRECTOR, DONE);
        info!("Packaging complete");
        Ok(DEFAULT_ACTION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prfirm_core::state::Draft;
    use prfirm_flow::run_node;
    use prfirm_test_utils::{campaign_state, fast_config, ScriptedLlm};

    fn platforms() -> Vec<String> {
        vec!["email".to_string(), "linkedin".to_string()]
    }

    #[test]
    fn test_plan_filters_and_fills() {
        let reply = r#"{
            "schedule": [
                {"platform": "LinkedIn", "day": "Tue", "time": "09:00"},
                {"platform": "myspace", "day": "Wed", "time": "10:00"}
            ],
            "predictions": {"email": {"expected_engagement": "high", "notes": "warm list"}}
        }"#;
        let plan = plan_from_reply(reply, &platforms());
        assert_eq!(plan.schedule.len(), 1);
        assert_eq!(plan.schedule[0].platform, "linkedin");
        assert_eq!(plan.predictions["email"].expected_engagement, "high");
        assert_eq!(plan.predictions["linkedin"].expected_engagement, "medium");
    }

    #[test]
    fn test_unreadable_plan_gets_defaults() {
        let plan = plan_from_reply("Post on Tuesday.", &platforms());
        assert!(plan.schedule.is_empty());
        assert_eq!(plan.predictions.len(), 2);
    }

    #[tokio::test]
    async fn test_bundle_assembled_and_run_marked_done() {
        let llm = Arc::new(ScriptedLlm::repeating("{}"));
        let ctx = Arc::new(StageContext::new(llm, &fast_config()));
        let mut state = campaign_state(&["email"]);
        state.content.insert(
            "email".into(),
            Draft {
                sections: vec![],
                text: "Hello.".into(),
            },
        );
        state.findings.edit_cycle_report = Some("report".into());
        state.progress.require_manual_review();

        run_node(&AgencyDirector::new(ctx), &mut state, &Params::new())
            .await
            .unwrap();

        let bundle = state.final_bundle.as_ref().unwrap();
        assert_eq!(bundle.approved_content["email"].text, "Hello.");
        assert_eq!(bundle.edit_cycle_report.as_deref(), Some("report"));
        assert!(bundle.manual_review_required);
        assert_eq!(state.progress.current_stage(), DONE);
    }
}
