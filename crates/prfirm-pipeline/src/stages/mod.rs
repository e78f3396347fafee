//! The campaign stages, in pipeline order.

pub mod brand;
pub mod compliance;
pub mod content;
pub mod director;
pub mod editor;
pub mod engagement;
pub mod guidelines;
pub mod validators;

pub use brand::{BrandBibleIngest, VoiceAlignment};
pub use compliance::{EditCycleReport, StyleCompliance};
pub use content::ContentCraftsman;
pub use director::AgencyDirector;
pub use editor::StyleEditor;
pub use engagement::EngagementManager;
pub use guidelines::{guidelines_batch, GuidelinesNode, GuidelinesPlan, GuidelinesRouter};
pub use validators::{AuthenticityAuditor, BrandGuardian, FactValidator, Review, ReviewStage};

pub const ENGAGEMENT: &str = "engagement";
pub const BRAND_BIBLE_INGEST: &str = "brand_bible_ingest";
pub const VOICE_ALIGNMENT: &str = "voice_alignment";
pub const GUIDELINES: &str = "guidelines";
pub const GUIDELINES_ROUTER: &str = "guidelines_router";
pub const CONTENT_CRAFTSMAN: &str = "content_craftsman";
pub const STYLE_EDITOR: &str = "style_editor";
pub const STYLE_COMPLIANCE: &str = "style_compliance";
pub const EDIT_CYCLE_REPORT: &str = "edit_cycle_report";
pub const FACT_VALIDATOR: &str = "fact_validator";
pub const BRAND_GUARDIAN: &str = "brand_guardian";
pub const AUTHENTICITY_AUDITOR: &str = "authenticity_auditor";
pub const AGENCY_DIRECTOR: &str = "agency_director";
/// Terminal value of `progress.current_stage`.
pub const DONE: &str = "done";
