//! Brand-bible parsing and persona normalisation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use prfirm_core::state::Persona;

/// Constructions every persona bans, whatever the brand bible says.
pub const HARD_BANS: [&str; 2] = ["em_dash", "rhetorical_contrast"];

const DEFAULT_VOICE: &str = "clear";
const DEFAULT_TONE: &str = "neutral";

/// Fields a brand bible is expected to carry.
const REQUIRED_FIELDS: [&str; 2] = ["brand_name", "voice"];

struct Tags {
    brand_name: Regex,
    voice: Regex,
    tone: Regex,
    forbiddens: Regex,
    item: Regex,
}

fn tags() -> &'static Tags {
    static TAGS: OnceLock<Tags> = OnceLock::new();
    TAGS.get_or_init(|| {
        let tag = |name: &str| {
            Regex::new(&format!(r"(?is)<{name}>\s*(.*?)\s*</{name}>")).expect("brand tag pattern")
        };
        Tags {
            brand_name: tag("brand_name"),
            voice: tag("voice"),
            tone: tag("tone"),
            forbiddens: tag("forbiddens"),
            item: tag("item"),
        }
    })
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fields pulled out of a brand bible before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandBible {
    pub brand_name: Option<String>,
    pub voice: Option<String>,
    pub tone: Option<String>,
    pub forbiddens: Vec<String>,
}

impl BrandBible {
    /// Extract the known tags. Unknown markup is ignored and malformed input
    /// simply yields empty fields.
    pub fn parse(text: &str) -> Self {
        let t = tags();
        let forbiddens = t
            .forbiddens
            .captures(text)
            .map(|block| {
                t.item
                    .captures_iter(&block[1])
                    .map(|c| c[1].trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            brand_name: capture(&t.brand_name, text),
            voice: capture(&t.voice, text),
            tone: capture(&t.tone, text),
            forbiddens,
        }
    }

    pub fn missing_fields(&self) -> Vec<String> {
        REQUIRED_FIELDS
            .iter()
            .filter(|field| match **field {
                "brand_name" => self.brand_name.is_none(),
                "voice" => self.voice.is_none(),
                _ => false,
            })
            .map(|field| field.to_string())
            .collect()
    }
}

/// Build the working persona from a brand bible.
pub fn persona_from_brand_bible(text: &str) -> Persona {
    let bible = BrandBible::parse(text);
    let missing_fields = bible.missing_fields();

    let mut axes = BTreeMap::new();
    axes.insert("formality".to_string(), "medium".to_string());
    axes.insert(
        "warmth".to_string(),
        bible.tone.clone().unwrap_or_else(|| DEFAULT_TONE.to_string()),
    );
    axes.insert("vividness".to_string(), "balanced".to_string());

    let mut forbiddens: BTreeSet<String> = HARD_BANS.iter().map(|s| s.to_string()).collect();
    forbiddens.extend(bible.forbiddens);

    Persona {
        brand_name: bible.brand_name.unwrap_or_default(),
        voice: bible.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        axes,
        forbiddens,
        missing_fields,
    }
}

/// Fill axis and voice gaps and make sure the hard bans are present.
pub fn align(mut persona: Persona) -> Persona {
    for (axis, value) in [
        ("formality", "medium"),
        ("warmth", DEFAULT_TONE),
        ("vividness", "balanced"),
    ] {
        persona
            .axes
            .entry(axis.to_string())
            .or_insert_with(|| value.to_string());
    }
    if persona.voice.trim().is_empty() {
        persona.voice = DEFAULT_VOICE.to_string();
    }
    persona
        .forbiddens
        .extend(HARD_BANS.iter().map(|s| s.to_string()));
    persona
}
