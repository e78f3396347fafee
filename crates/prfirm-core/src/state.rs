use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PrFirmError, Result};
use crate::platform::{HashtagRule, PlatformLimits, PlatformRegistry};

pub const DEFAULT_PLATFORMS: [&str; 2] = ["email", "linkedin"];
pub const DEFAULT_TOPIC: &str = "Announce our new AI feature";
pub const DEFAULT_URGENCY: &str = "normal";
pub const DEFAULT_BRAND_BIBLE: &str = "<brand>\n  <brand_name>Acme</brand_name>\n  <voice>clear</voice>\n  <tone>warm</tone>\n  <forbiddens><item>em_dash</item></forbiddens>\n</brand>";

/// Stage name every run starts in.
pub const ENTRY_STAGE: &str = "engagement";

/// The single mutable record threaded through one pipeline run.
///
/// Each field area has exactly one writing stage; later stages only read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    pub request: CampaignRequest,
    pub persona: Option<Persona>,
    pub guidelines: BTreeMap<String, Guidelines>,
    pub content: BTreeMap<String, Draft>,
    pub compliance: BTreeMap<String, ComplianceReport>,
    pub compliance_history: Vec<ComplianceRound>,
    pub findings: Findings,
    pub progress: Progress,
    pub final_bundle: Option<FinalBundle>,
}

impl SharedState {
    pub fn new(request: CampaignRequest) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Fill missing request fields and normalise names.
    ///
    /// Applying this twice yields the same record as applying it once.
    pub fn populate_defaults(&mut self, registry: &PlatformRegistry) {
        let req = &mut self.request;

        let mut seen = BTreeSet::new();
        req.platforms = req
            .platforms
            .iter()
            .map(|p| normalize_platform(registry, p))
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect();
        if req.platforms.is_empty() {
            req.platforms = DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect();
        }

        if req.topic.trim().is_empty() {
            req.topic = DEFAULT_TOPIC.to_string();
        }
        if req.urgency.trim().is_empty() {
            req.urgency = DEFAULT_URGENCY.to_string();
        }
        if req.brand_bible.as_deref().map_or(true, |b| b.trim().is_empty()) {
            req.brand_bible = Some(DEFAULT_BRAND_BIBLE.to_string());
        }

        let mut intents = BTreeMap::new();
        for (platform, intent) in std::mem::take(&mut req.intents) {
            intents
                .entry(normalize_platform(registry, &platform))
                .or_insert(intent);
        }
        for platform in &req.platforms {
            intents.entry(platform.clone()).or_insert_with(|| {
                let value = registry
                    .get(platform)
                    .map(|spec| spec.default_intent.clone())
                    .unwrap_or_else(|| "general".to_string());
                Intent::preset(value)
            });
        }
        req.intents = intents;

        req.subreddit = req
            .subreddit
            .as_deref()
            .map(normalize_subreddit)
            .filter(|s| !s.is_empty());
    }

    /// Persona written by the brand stages; its absence is an invariant violation.
    pub fn require_persona(&self, stage: &str) -> Result<&Persona> {
        self.persona
            .as_ref()
            .ok_or_else(|| PrFirmError::invariant(stage, "persona has not been derived"))
    }

    pub fn require_guidelines(&self, stage: &str, platform: &str) -> Result<&Guidelines> {
        self.guidelines.get(platform).ok_or_else(|| {
            PrFirmError::invariant(stage, format!("no guidelines for platform '{platform}'"))
        })
    }

    pub fn require_content(&self, stage: &str) -> Result<&BTreeMap<String, Draft>> {
        if self.content.is_empty() {
            return Err(PrFirmError::invariant(stage, "no drafts have been written"));
        }
        Ok(&self.content)
    }
}

fn normalize_platform(registry: &PlatformRegistry, name: &str) -> String {
    registry
        .canonical_name(name)
        .unwrap_or_else(|| name.trim().to_lowercase())
}

/// Reduce a subreddit URL, `r/name`, or bare name to its lowercase name.
pub fn normalize_subreddit(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut s = lowered.as_str();
    if s.starts_with("http") {
        let parts: Vec<&str> = s.split('/').collect();
        if let Some(idx) = parts.iter().position(|p| *p == "r") {
            if let Some(name) = parts.get(idx + 1) {
                s = name;
            }
        }
    }
    let separator = |c: char| c == '/' || c.is_whitespace();
    loop {
        let trimmed = s.trim_start_matches(separator);
        match trimmed.strip_prefix("r/") {
            Some(rest) => s = rest,
            None => {
                s = trimmed;
                break;
            }
        }
    }
    s.trim_end_matches(separator).to_string()
}

// ── Request ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub platforms: Vec<String>,
    pub topic: String,
    pub intents: BTreeMap<String, Intent>,
    pub brand_bible: Option<String>,
    pub subreddit: Option<String>,
    pub urgency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Preset,
    Custom,
    /// Proposed by the engagement stage.
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub value: String,
}

impl Intent {
    pub fn preset(value: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Preset,
            value: value.into(),
        }
    }

    pub fn custom(value: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Custom,
            value: value.into(),
        }
    }

    pub fn auto() -> Self {
        Self {
            kind: IntentKind::Auto,
            value: String::new(),
        }
    }

    /// Parse a CLI value: `auto`, `custom:<text>`, or a preset name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("auto") {
            Self::auto()
        } else if let Some(text) = raw.strip_prefix("custom:") {
            Self::custom(text.trim())
        } else {
            Self::preset(raw)
        }
    }
}

// ── Derived data ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub brand_name: String,
    pub voice: String,
    /// Tone axes such as formality, warmth, vividness.
    pub axes: BTreeMap<String, String>,
    pub forbiddens: BTreeSet<String>,
    /// Required brand-bible fields that were absent or empty.
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidelines {
    pub platform: String,
    pub intent: String,
    pub structure: Vec<String>,
    pub section_budgets: BTreeMap<String, u32>,
    pub limits: PlatformLimits,
    pub hashtags: HashtagRule,
    pub voice: String,
    pub axes: BTreeMap<String, String>,
    pub forbiddens: Vec<String>,
    pub notes: Vec<String>,
    pub subreddit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub sections: Vec<Section>,
    pub text: String,
}

// ── Compliance ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Gates the revision loop.
    Hard,
    /// Reported only.
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: String,
    pub start: usize,
    pub end: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub violations: Vec<Violation>,
    pub score: f64,
}

impl ComplianceReport {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let hard = violations.iter().filter(|v| v.severity == Severity::Hard).count();
        let soft = violations.len() - hard;
        let score = (1.0 - 0.3 * hard as f64 - 0.1 * soft as f64).max(0.0);
        Self { violations, score }
    }

    pub fn has_blocking(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Hard)
    }
}

/// One compliance evaluation over every draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRound {
    pub evaluation: u32,
    pub reports: BTreeMap<String, ComplianceReport>,
    pub action: String,
}

impl ComplianceRound {
    pub fn issue_count(&self) -> usize {
        self.reports.values().map(|r| r.violations.len()).sum()
    }
}

// ── Findings ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    #[serde(default)]
    pub needs_source: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCheck {
    pub claims_needing_source: Vec<Claim>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandAlignment {
    pub alignment_score: f64,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticityAudit {
    pub hype_flags: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub fact_checks: BTreeMap<String, FactCheck>,
    pub brand_alignment: BTreeMap<String, BrandAlignment>,
    pub authenticity: BTreeMap<String, AuthenticityAudit>,
    pub edit_cycle_report: Option<String>,
}

// ── Progress ───────────────────────────────────────────────────

/// Run progress. Completed stages only grow and the revision count only
/// increases; the private fields keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    current_stage: String,
    completed_stages: Vec<String>,
    revision_count: u32,
    manual_review_required: bool,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            current_stage: ENTRY_STAGE.to_string(),
            completed_stages: Vec::new(),
            revision_count: 0,
            manual_review_required: false,
        }
    }
}

impl Progress {
    pub fn current_stage(&self) -> &str {
        &self.current_stage
    }

    pub fn completed_stages(&self) -> &[String] {
        &self.completed_stages
    }

    pub fn revision_count(&self) -> u32 {
        self.revision_count
    }

    pub fn manual_review_required(&self) -> bool {
        self.manual_review_required
    }

    /// Append `done` to the completed list and move to `next`.
    pub fn complete_stage(&mut self, done: &str, next: &str) {
        self.completed_stages.push(done.to_string());
        self.current_stage = next.to_string();
    }

    pub fn set_stage(&mut self, stage: &str) {
        self.current_stage = stage.to_string();
    }

    /// Count one Revise transition and return the new count.
    pub fn record_revision(&mut self) -> u32 {
        self.revision_count += 1;
        self.revision_count
    }

    pub fn require_manual_review(&mut self) {
        self.manual_review_required = true;
    }

    pub fn times_completed(&self, stage: &str) -> usize {
        self.completed_stages.iter().filter(|s| *s == stage).count()
    }
}

// ── Deliverable ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub platform: String,
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default = "default_engagement")]
    pub expected_engagement: String,
    #[serde(default)]
    pub notes: String,
}

fn default_engagement() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalBundle {
    pub approved_content: BTreeMap<String, Draft>,
    pub guidelines: BTreeMap<String, Guidelines>,
    pub edit_cycle_report: Option<String>,
    pub findings: Findings,
    pub publishing_schedule: Vec<ScheduleSlot>,
    pub performance_predictions: BTreeMap<String, Prediction>,
    pub manual_review_required: bool,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PlatformRegistry {
        PlatformRegistry::with_defaults()
    }

    #[test]
    fn test_empty_state_gets_default_request() {
        let mut state = SharedState::default();
        state.populate_defaults(&registry());

        assert_eq!(state.request.platforms, vec!["email", "linkedin"]);
        assert_eq!(state.request.topic, DEFAULT_TOPIC);
        assert_eq!(state.request.urgency, "normal");
        assert_eq!(state.request.brand_bible.as_deref(), Some(DEFAULT_BRAND_BIBLE));
        assert_eq!(state.request.intents["email"], Intent::preset("outreach"));
        assert_eq!(
            state.request.intents["linkedin"],
            Intent::preset("thought leadership")
        );
    }

    #[test]
    fn test_populate_defaults_is_idempotent() {
        let mut request = CampaignRequest {
            platforms: vec!["X".into(), " LinkedIn".into(), "twitter".into(), "fax".into()],
            subreddit: Some("https://www.reddit.com/r/RustLang/".into()),
            ..Default::default()
        };
        request.intents.insert("x".into(), Intent::auto());

        let mut once = SharedState::new(request);
        once.populate_defaults(&registry());
        let mut twice = once.clone();
        twice.populate_defaults(&registry());

        assert_eq!(once, twice);
        assert_eq!(once.request.platforms, vec!["twitter", "linkedin", "fax"]);
        assert_eq!(once.request.intents["twitter"], Intent::auto());
        assert!(!once.request.intents.contains_key("x"));
        assert_eq!(once.request.subreddit.as_deref(), Some("rustlang"));
    }

    #[test]
    fn test_populate_defaults_is_idempotent_for_messy_input() {
        let request = CampaignRequest {
            platforms: vec!["  ".into(), "".into()],
            subreddit: Some("R/Rust".into()),
            ..Default::default()
        };

        let mut once = SharedState::new(request);
        once.populate_defaults(&registry());
        let mut twice = once.clone();
        twice.populate_defaults(&registry());

        assert_eq!(once, twice);
        assert_eq!(once.request.platforms, vec!["email", "linkedin"]);
        assert_eq!(once.request.subreddit.as_deref(), Some("rust"));
    }

    #[test]
    fn test_custom_intent_survives_defaults() {
        let mut request = CampaignRequest {
            platforms: vec!["email".into()],
            ..Default::default()
        };
        request.intents.insert("email".into(), Intent::custom("win-back"));
        let mut state = SharedState::new(request);
        state.populate_defaults(&registry());
        assert_eq!(state.request.intents["email"], Intent::custom("win-back"));
    }

    #[test]
    fn test_normalize_subreddit_forms() {
        assert_eq!(normalize_subreddit("r/Rust"), "rust");
        assert_eq!(normalize_subreddit("R/Rust"), "rust");
        assert_eq!(normalize_subreddit("/R/ r/Rust /"), "rust");
        assert_eq!(normalize_subreddit("/r/rust/"), "rust");
        assert_eq!(normalize_subreddit("  rust "), "rust");
        assert_eq!(normalize_subreddit("https://reddit.com/r/Programming/top"), "programming");
        // names beginning with 'r' are not eaten
        assert_eq!(normalize_subreddit("ruby"), "ruby");
        assert_eq!(normalize_subreddit(&normalize_subreddit("r/r/rust")), "rust");
    }

    #[test]
    fn test_blank_subreddit_becomes_none() {
        let mut state = SharedState::new(CampaignRequest {
            subreddit: Some("r/".into()),
            ..Default::default()
        });
        state.populate_defaults(&registry());
        assert!(state.request.subreddit.is_none());
    }

    #[test]
    fn test_intent_parse() {
        assert_eq!(Intent::parse("auto"), Intent::auto());
        assert_eq!(Intent::parse("custom: launch day"), Intent::custom("launch day"));
        assert_eq!(Intent::parse("outreach"), Intent::preset("outreach"));
    }

    #[test]
    fn test_progress_is_append_only_and_monotonic() {
        let mut progress = Progress::default();
        assert_eq!(progress.current_stage(), "engagement");

        progress.complete_stage("engagement", "brand_bible_ingest");
        progress.complete_stage("brand_bible_ingest", "voice_alignment");
        assert_eq!(progress.completed_stages(), ["engagement", "brand_bible_ingest"]);
        assert_eq!(progress.current_stage(), "voice_alignment");

        assert_eq!(progress.record_revision(), 1);
        assert_eq!(progress.record_revision(), 2);
        assert_eq!(progress.revision_count(), 2);

        progress.require_manual_review();
        assert!(progress.manual_review_required());
    }

    #[test]
    fn test_require_persona_is_invariant_error() {
        let state = SharedState::default();
        let err = state.require_persona("voice_alignment").unwrap_err();
        assert!(matches!(err, PrFirmError::StateInvariant { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_report_score_and_blocking() {
        let soft_only = ComplianceReport::from_violations(vec![Violation {
            kind: "weasel_words".into(),
            start: 0,
            end: 8,
            severity: Severity::Soft,
        }]);
        assert!(!soft_only.has_blocking());
        assert!((soft_only.score - 0.9).abs() < 1e-9);

        let hard = ComplianceReport::from_violations(vec![Violation {
            kind: "em_dash".into(),
            start: 3,
            end: 6,
            severity: Severity::Hard,
        }]);
        assert!(hard.has_blocking());
        assert!((hard.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_state_serializes_to_json() {
        let mut state = SharedState::default();
        state.populate_defaults(&registry());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["progress"]["current_stage"], "engagement");
        assert_eq!(json["request"]["intents"]["email"]["kind"], "preset");
    }
}
