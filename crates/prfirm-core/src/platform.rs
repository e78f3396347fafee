//! Platform registry: the per-platform constraints every stage consults.
//!
//! Built once at process start (`with_defaults` plus config overrides) and
//! shared by reference; nothing here is global or mutable after startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where hashtags belong in a finished post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashtagPlacement {
    #[default]
    None,
    Inline,
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagRule {
    #[serde(default)]
    pub placement: HashtagPlacement,
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    /// Hard character cap, when the platform has one.
    #[serde(default)]
    pub chars: Option<u32>,
    /// Target length used when there is no hard cap.
    #[serde(default = "default_approx_chars")]
    pub approx_chars: u32,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            chars: None,
            approx_chars: default_approx_chars(),
        }
    }
}

fn default_approx_chars() -> u32 { 800 }
fn default_intent() -> String { "general".to_string() }

/// Static description of one publishing platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub structure: Vec<String>,
    #[serde(default)]
    pub section_budgets: BTreeMap<String, u32>,
    #[serde(default)]
    pub limits: PlatformLimits,
    #[serde(default)]
    pub hashtags: HashtagRule,
    #[serde(default = "default_intent")]
    pub default_intent: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl PlatformSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            aliases: vec![],
            structure: vec![],
            section_budgets: BTreeMap::new(),
            limits: PlatformLimits::default(),
            hashtags: HashtagRule::default(),
            default_intent: default_intent(),
            notes: vec![],
        }
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Character budget for one section.
    ///
    /// Explicit budgets win; otherwise the total length is split evenly
    /// across the structure with a floor of 40 characters.
    pub fn budget_for(&self, section: &str) -> u32 {
        if let Some(b) = self.section_budgets.get(section) {
            return *b;
        }
        let total = self.limits.chars.unwrap_or(self.limits.approx_chars);
        let parts = self.structure.len().max(1) as u32;
        (total / parts).max(40)
    }

    fn with_structure(mut self, sections: &[(&str, u32)]) -> Self {
        self.structure = sections.iter().map(|(s, _)| s.to_string()).collect();
        self.section_budgets = sections.iter().map(|(s, b)| (s.to_string(), *b)).collect();
        self
    }

    fn with_limits(mut self, chars: Option<u32>, approx_chars: u32) -> Self {
        self.limits = PlatformLimits {
            chars,
            approx_chars,
        };
        self
    }

    fn with_hashtags(mut self, placement: HashtagPlacement, min: u32, max: u32) -> Self {
        self.hashtags = HashtagRule {
            placement,
            min,
            max,
        };
        self
    }

    fn with_intent(mut self, intent: &str) -> Self {
        self.default_intent = intent.to_string();
        self
    }

    fn with_display(mut self, display: &str) -> Self {
        self.display_name = Some(display.to_string());
        self
    }
}

/// Registry of known platforms, keyed by lowercase canonical name.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: BTreeMap<String, PlatformSpec>,
    aliases: BTreeMap<String, String>,
}

impl PlatformRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the six built-in platforms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for spec in builtin_platforms() {
            registry.register(spec);
        }
        registry
    }

    /// Registry with defaults, then `overrides` registered on top.
    pub fn from_overrides(overrides: &[PlatformSpec]) -> Self {
        let mut registry = Self::with_defaults();
        registry.apply_overrides(overrides);
        registry
    }

    pub fn apply_overrides(&mut self, overrides: &[PlatformSpec]) {
        for spec in overrides {
            self.register(spec.clone());
        }
    }

    /// Register (or replace) a platform. Names and aliases are lowercased.
    pub fn register(&mut self, mut spec: PlatformSpec) {
        spec.name = spec.name.trim().to_lowercase();
        for alias in &spec.aliases {
            self.aliases
                .insert(alias.trim().to_lowercase(), spec.name.clone());
        }
        self.platforms.insert(spec.name.clone(), spec);
    }

    /// Resolve a user-supplied name or alias to its canonical name.
    pub fn canonical_name(&self, name: &str) -> Option<String> {
        let key = name.trim().to_lowercase();
        if self.platforms.contains_key(&key) {
            return Some(key);
        }
        self.aliases.get(&key).cloned()
    }

    pub fn get(&self, name: &str) -> Option<&PlatformSpec> {
        self.canonical_name(name)
            .and_then(|canonical| self.platforms.get(&canonical))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical_name(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.platforms.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformSpec> {
        self.platforms.values()
    }

    /// Split a list of names into (known canonical names, unknown names).
    pub fn validate(&self, names: &[String]) -> (Vec<String>, Vec<String>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for name in names {
            match self.canonical_name(name) {
                Some(canonical) => valid.push(canonical),
                None => invalid.push(name.clone()),
            }
        }
        (valid, invalid)
    }
}

fn builtin_platforms() -> Vec<PlatformSpec> {
    use HashtagPlacement::{End, Inline, None as NoTags};

    vec![
        PlatformSpec::new("twitter")
            .with_display("Twitter/X")
            .with_structure(&[("hook", 60), ("body", 180), ("cta", 40)])
            .with_limits(Some(280), 280)
            .with_hashtags(Inline, 0, 3)
            .with_intent("engagement")
            .aliased("x"),
        PlatformSpec::new("linkedin")
            .with_display("LinkedIn")
            .with_structure(&[("hook", 150), ("story", 400), ("insight", 300), ("cta", 100)])
            .with_limits(Some(3000), 1200)
            .with_hashtags(End, 0, 3)
            .with_intent("thought leadership"),
        PlatformSpec::new("instagram")
            .with_display("Instagram")
            .with_structure(&[("hook", 100), ("body", 500), ("hashtags", 200)])
            .with_limits(Some(2200), 800)
            .with_hashtags(End, 8, 20)
            .with_intent("engagement"),
        PlatformSpec::new("reddit")
            .with_display("Reddit")
            .with_structure(&[("tl_dr", 100), ("body", 1500), ("context", 400)])
            .with_limits(None, 2000)
            .with_hashtags(NoTags, 0, 0)
            .with_intent("discussion")
            .noted("TL;DR recommended at end."),
        PlatformSpec::new("email")
            .with_display("Email")
            .with_structure(&[
                ("subject", 50),
                ("greeting", 50),
                ("body", 1000),
                ("cta", 100),
                ("signature", 100),
            ])
            .with_limits(None, 1500)
            .with_hashtags(NoTags, 0, 0)
            .with_intent("outreach")
            .noted("Single call to action."),
        PlatformSpec::new("blog")
            .with_display("Blog")
            .with_structure(&[
                ("title", 60),
                ("intro", 200),
                ("h2_section", 500),
                ("h3_section", 300),
                ("conclusion", 200),
            ])
            .with_limits(Some(50_000), 2000)
            .with_hashtags(NoTags, 0, 0)
            .with_intent("education"),
    ]
}

impl PlatformSpec {
    fn aliased(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    fn noted(mut self, note: &str) -> Self {
        self.notes.push(note.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_builtin_platforms() {
        let registry = PlatformRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["blog", "email", "instagram", "linkedin", "reddit", "twitter"]
        );
    }

    #[test]
    fn test_alias_resolves_to_canonical() {
        let registry = PlatformRegistry::with_defaults();
        assert_eq!(registry.canonical_name("X").as_deref(), Some("twitter"));
        assert_eq!(registry.canonical_name(" LinkedIn ").as_deref(), Some("linkedin"));
        assert!(registry.canonical_name("myspace").is_none());
    }

    #[test]
    fn test_validate_splits_known_and_unknown() {
        let registry = PlatformRegistry::with_defaults();
        let (valid, invalid) =
            registry.validate(&["email".into(), "x".into(), "fax".into()]);
        assert_eq!(valid, vec!["email", "twitter"]);
        assert_eq!(invalid, vec!["fax"]);
    }

    #[test]
    fn test_budget_prefers_explicit_then_derives() {
        let registry = PlatformRegistry::with_defaults();
        let email = registry.get("email").unwrap();
        assert_eq!(email.budget_for("body"), 1000);

        let mut custom = PlatformSpec::new("sms");
        custom.structure = vec!["body".into(), "cta".into()];
        custom.limits.chars = Some(60);
        assert_eq!(custom.budget_for("body"), 40);

        custom.limits.chars = Some(400);
        assert_eq!(custom.budget_for("cta"), 200);
    }

    #[test]
    fn test_override_replaces_builtin() {
        let mut spec = PlatformSpec::new("Email");
        spec.default_intent = "newsletter".into();
        let registry = PlatformRegistry::from_overrides(&[spec]);
        assert_eq!(registry.get("email").unwrap().default_intent, "newsletter");
        assert_eq!(registry.names().len(), 6);
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: PlatformSpec = toml::from_str(r#"name = "threads""#).unwrap();
        assert_eq!(spec.default_intent, "general");
        assert_eq!(spec.limits.approx_chars, 800);
        assert_eq!(spec.hashtags.placement, HashtagPlacement::None);
        assert_eq!(spec.display_name(), "threads");
    }
}
