//! Per-platform reviews run after the revision loop: fact checking, brand
//! alignment, and authenticity.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, info};

use prfirm_core::error::Result;
use prfirm_core::state::{
    AuthenticityAudit, BrandAlignment, Claim, FactCheck, Findings, Persona, SharedState,
};
use prfirm_flow::{Params, RetryPolicy, StageNode, DEFAULT_ACTION};

use super::{AGENCY_DIRECTOR, AUTHENTICITY_AUDITOR, BRAND_GUARDIAN, FACT_VALIDATOR};
use crate::context::StageContext;
use crate::json::parse_reply;

/// Alignment score used when the reviewer gives none.
pub const DEFAULT_ALIGNMENT_SCORE: f64 = 0.75;

/// One kind of review: how to ask, how to read the answer, where to file it.
pub trait Review: Send + Sync + 'static {
    type Finding: Send + 'static;

    fn name(&self) -> &'static str;

    /// Stage that follows this one.
    fn next_stage(&self) -> &'static str;

    fn system_prompt(&self) -> &'static str;

    fn prompt(&self, platform: &str, text: &str, persona: &Persona) -> String;

    /// Read a reply. Malformed replies yield the neutral finding.
    fn parse(&self, reply: &str) -> Self::Finding;

    fn store(&self, findings: &mut Findings, platform: String, finding: Self::Finding);
}

/// Runs a [`Review`] once per drafted platform.
pub struct ReviewStage<R> {
    review: R,
    ctx: Arc<StageContext>,
}

pub struct ReviewPrep {
    persona: Persona,
    drafts: Vec<(String, String)>,
}

impl<R: Review> ReviewStage<R> {
    pub fn new(review: R, ctx: Arc<StageContext>) -> Self {
        Self { review, ctx }
    }
}

impl<R: Review> StageNode for ReviewStage<R> {
    type Prep = ReviewPrep;
    type Exec = Vec<(String, R::Finding)>;

    fn name(&self) -> &str {
        self.review.name()
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.ctx.validation_policy()
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<ReviewPrep> {
        let name = self.review.name();
        let persona = state.require_persona(name)?.clone();
        let drafts = state
            .require_content(name)?
            .iter()
            .map(|(platform, draft)| (platform.clone(), draft.text.clone()))
            .collect();
        Ok(ReviewPrep { persona, drafts })
    }

    fn execute<'a>(&'a self, prep: &'a ReviewPrep) -> BoxFuture<'a, Result<Self::Exec>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(prep.drafts.len());
            for (platform, text) in &prep.drafts {
                let prompt = self.review.prompt(platform, text, &prep.persona);
                let reply = self.ctx.ask(self.review.system_prompt(), prompt).await?;
                debug!(review = self.review.name(), platform = %platform, "Review received");
                out.push((platform.clone(), self.review.parse(&reply)));
            }
            Ok(out)
        })
    }

    fn finalize(
        &self,
        state: &mut SharedState,
        _prep: ReviewPrep,
        results: Self::Exec,
    ) -> Result<String> {
        let count = results.len();
        for (platform, finding) in results {
            self.review.store(&mut state.findings, platform, finding);
        }
        state
            .progress
            .complete_stage(self.review.name(), self.review.next_stage());
        info!(review = self.review.name(), platforms = count, "Review complete");
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ── Fact validation ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FactValidator;

#[derive(Deserialize, Default)]
struct ClaimsReply {
    #[serde(default)]
    claims: Vec<Claim>,
}

impl Review for FactValidator {
    type Finding = FactCheck;

    fn name(&self) -> &'static str {
        FACT_VALIDATOR
    }

    fn next_stage(&self) -> &'static str {
        BRAND_GUARDIAN
    }

    fn system_prompt(&self) -> &'static str {
        "You analyze text and identify claims that require citations."
    }

    fn prompt(&self, platform: &str, text: &str, _persona: &Persona) -> String {
        format!(
            "Platform: {platform}\nText:\n{text}\n\n\
             Extract factual claims and whether each needs a source. Respond with JSON:\n\
             {{\"claims\": [{{\"text\": \"<claim>\", \"needs_source\": true}}]}}"
        )
    }

    fn parse(&self, reply: &str) -> FactCheck {
        let reply: ClaimsReply = parse_reply(reply).unwrap_or_default();
        FactCheck {
            claims_needing_source: reply.claims.into_iter().filter(|c| c.needs_source).collect(),
        }
    }

    fn store(&self, findings: &mut Findings, platform: String, finding: FactCheck) {
        findings.fact_checks.insert(platform, finding);
    }
}

// ── Brand alignment ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct BrandGuardian;

#[derive(Deserialize, Default)]
struct AlignmentReply {
    #[serde(default)]
    alignment_score: Option<f64>,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl Review for BrandGuardian {
    type Finding = BrandAlignment;

    fn name(&self) -> &'static str {
        BRAND_GUARDIAN
    }

    fn next_stage(&self) -> &'static str {
        AUTHENTICITY_AUDITOR
    }

    fn system_prompt(&self) -> &'static str {
        "You are a brand guardian evaluating alignment."
    }

    fn prompt(&self, platform: &str, text: &str, persona: &Persona) -> String {
        let forbiddens: Vec<&str> = persona.forbiddens.iter().map(String::as_str).collect();
        format!(
            "Brand: {brand}\nVoice: {voice}\nForbidden: {forbidden}\nPlatform: {platform}\n\
             Text:\n{text}\n\n\
             Score how well the text matches the brand voice from 0 to 1 and suggest fixes. \
             Respond with JSON:\n\
             {{\"alignment_score\": 0.0, \"suggestions\": [\"<text>\"]}}",
            brand = persona.brand_name,
            voice = persona.voice,
            forbidden = forbiddens.join(", "),
        )
    }

    fn parse(&self, reply: &str) -> BrandAlignment {
        let reply: AlignmentReply = parse_reply(reply).unwrap_or_default();
        let score = reply
            .alignment_score
            .filter(|s| s.is_finite())
            .unwrap_or(DEFAULT_ALIGNMENT_SCORE)
            .clamp(0.0, 1.0);
        BrandAlignment {
            alignment_score: score,
            suggestions: reply.suggestions,
        }
    }

    fn store(&self, findings: &mut Findings, platform: String, finding: BrandAlignment) {
        findings.brand_alignment.insert(platform, finding);
    }
}

// ── Authenticity ───────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AuthenticityAuditor;

#[derive(Deserialize, Default)]
struct AuditReply {
    #[serde(default)]
    hype_flags: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl Review for AuthenticityAuditor {
    type Finding = AuthenticityAudit;

    fn name(&self) -> &'static str {
        AUTHENTICITY_AUDITOR
    }

    fn next_stage(&self) -> &'static str {
        AGENCY_DIRECTOR
    }

    fn system_prompt(&self) -> &'static str {
        "You are an authenticity auditor."
    }

    fn prompt(&self, platform: &str, text: &str, _persona: &Persona) -> String {
        format!(
            "Platform: {platform}\nText:\n{text}\n\n\
             Evaluate authenticity and flag hype or over-claiming. Respond with JSON:\n\
             {{\"hype_flags\": [\"<phrase>\"], \"suggestions\": [\"<text>\"]}}"
        )
    }

    fn parse(&self, reply: &str) -> AuthenticityAudit {
        let reply: AuditReply = parse_reply(reply).unwrap_or_default();
        AuthenticityAudit {
            hype_flags: reply.hype_flags,
            suggestions: reply.suggestions,
        }
    }

    fn store(&self, findings: &mut Findings, platform: String, finding: AuthenticityAudit) {
        findings.authenticity.insert(platform, finding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prfirm_core::error::PrFirmError;
    use prfirm_core::state::Draft;
    use prfirm_flow::run_node;
    use prfirm_test_utils::{campaign_state, fast_config, FailingLlm, ScriptedLlm};

    use crate::persona::persona_from_brand_bible;

    fn reviewed_state() -> SharedState {
        let mut state = campaign_state(&["email", "linkedin"]);
        state.persona = Some(persona_from_brand_bible(""));
        for p in ["email", "linkedin"] {
            state.content.insert(
                p.into(),
                Draft {
                    sections: vec![],
                    text: format!("{p} copy: 3x faster than anyone."),
                },
            );
        }
        state
    }

    fn ctx(llm: Arc<dyn prfirm_core::traits::LlmClient>) -> Arc<StageContext> {
        Arc::new(StageContext::new(llm, &fast_config()))
    }

    #[test]
    fn test_fact_parse_keeps_claims_needing_source() {
        let reply = r#"{"claims": [
            {"text": "3x faster", "needs_source": true},
            {"text": "we exist", "needs_source": false}
        ]}"#;
        let check = FactValidator.parse(reply);
        assert_eq!(check.claims_needing_source.len(), 1);
        assert_eq!(check.claims_needing_source[0].text, "3x faster");
        assert!(FactValidator.parse("no json").claims_needing_source.is_empty());
    }

    #[test]
    fn test_alignment_score_defaults_and_clamps() {
        assert_eq!(
            BrandGuardian.parse("unreadable").alignment_score,
            DEFAULT_ALIGNMENT_SCORE
        );
        assert_eq!(BrandGuardian.parse(r#"{"alignment_score": 1.7}"#).alignment_score, 1.0);
        assert_eq!(BrandGuardian.parse(r#"{"alignment_score": -2}"#).alignment_score, 0.0);
        let parsed = BrandGuardian.parse(r#"{"alignment_score": 0.4, "suggestions": ["warmer"]}"#);
        assert_eq!(parsed.alignment_score, 0.4);
        assert_eq!(parsed.suggestions, vec!["warmer"]);
    }

    #[test]
    fn test_audit_parse_tolerates_partial_reply() {
        let audit = AuthenticityAuditor.parse(r#"{"hype_flags": ["3x faster"]}"#);
        assert_eq!(audit.hype_flags, vec!["3x faster"]);
        assert!(audit.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_review_stage_files_findings_per_platform() {
        let llm = Arc::new(ScriptedLlm::repeating(
            r#"{"alignment_score": 0.9, "suggestions": []}"#,
        ));
        let stage = ReviewStage::new(BrandGuardian, ctx(llm.clone()));
        let mut state = reviewed_state();
        run_node(&stage, &mut state, &Params::new()).await.unwrap();

        assert_eq!(llm.call_count(), 2);
        assert_eq!(state.findings.brand_alignment.len(), 2);
        assert_eq!(state.findings.brand_alignment["linkedin"].alignment_score, 0.9);
        assert_eq!(state.progress.current_stage(), AUTHENTICITY_AUDITOR);
        assert!(llm.requests()[0]
            .text_for(prfirm_core::types::Role::User)
            .contains("Brand:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_propagates_after_retries() {
        let llm = Arc::new(FailingLlm::new("HTTP 500"));
        let stage = ReviewStage::new(FactValidator, ctx(llm.clone()));
        let mut state = reviewed_state();
        let err = run_node(&stage, &mut state, &Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PrFirmError::LlmRequest(_)));
        // validation policy in the fast config: one retry
        assert_eq!(llm.call_count(), 2);
        assert!(state.findings.fact_checks.is_empty());
    }
}
