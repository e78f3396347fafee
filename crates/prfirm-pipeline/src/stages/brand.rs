use futures::future::BoxFuture;
use tracing::{info, warn};

use prfirm_core::error::Result;
use prfirm_core::state::{Persona, SharedState, DEFAULT_BRAND_BIBLE};
use prfirm_flow::{Params, StageNode, DEFAULT_ACTION};

use super::{BRAND_BIBLE_INGEST, GUIDELINES, VOICE_ALIGNMENT};
use crate::persona::{align, persona_from_brand_bible};

/// Derives the persona from the brand bible text.
#[derive(Debug, Default)]
pub struct BrandBibleIngest;

impl StageNode for BrandBibleIngest {
    type Prep = String;
    type Exec = Persona;

    fn name(&self) -> &str {
        BRAND_BIBLE_INGEST
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<String> {
        Ok(state
            .request
            .brand_bible
            .clone()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRAND_BIBLE.to_string()))
    }

    fn execute<'a>(&'a self, bible: &'a String) -> BoxFuture<'a, Result<Persona>> {
        Box::pin(async move { Ok(persona_from_brand_bible(bible)) })
    }

    fn finalize(&self, state: &mut SharedState, _bible: String, persona: Persona) -> Result<String> {
        if !persona.missing_fields.is_empty() {
            warn!(missing = ?persona.missing_fields, "Brand bible is incomplete");
        }
        info!(brand = %persona.brand_name, voice = %persona.voice, "Persona derived");
        state.persona = Some(persona);
        state.progress.complete_stage(BRAND_BIBLE_INGEST, VOICE_ALIGNMENT);
        Ok(DEFAULT_ACTION.to_string())
    }
}

/// Normalises persona axes and adds the non-negotiable bans.
#[derive(Debug, Default)]
pub struct VoiceAlignment;

impl StageNode for VoiceAlignment {
    type Prep = Persona;
    type Exec = Persona;

    fn name(&self) -> &str {
        VOICE_ALIGNMENT
    }

    fn prepare(&self, state: &SharedState, _params: &Params) -> Result<Persona> {
        state.require_persona(VOICE_ALIGNMENT).cloned()
    }

    fn execute<'a>(&'a self, persona: &'a Persona) -> BoxFuture<'a, Result<Persona>> {
        Box::pin(async move { Ok(align(persona.clone())) })
    }

    fn finalize(&self, state: &mut SharedState, _prep: Persona, persona: Persona) -> Result<String> {
        state.persona = Some(persona);
        state.progress.complete_stage(VOICE_ALIGNMENT, GUIDELINES);
        Ok(DEFAULT_ACTION.to_string())
    }
}
