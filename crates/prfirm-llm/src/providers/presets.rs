/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    /// Environment variable consulted when `model.api_key` is unset.
    pub api_key_env: Option<&'static str>,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

impl ProviderPreset {
    pub fn needs_api_key(&self) -> bool {
        self.api_key_env.is_some()
    }
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            api_key_env: Some("OPENROUTER_API_KEY"),
            extra_headers: &[("X-Title", "PR Firm")],
        }),
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1/chat/completions",
            api_key_env: Some("OPENAI_API_KEY"),
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1/chat/completions",
            api_key_env: Some("GROQ_API_KEY"),
            extra_headers: &[],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1/chat/completions",
            api_key_env: Some("TOGETHER_API_KEY"),
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1/chat/completions",
            api_key_env: None,
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openrouter", "openai", "groq", "together", "ollama"]
}
