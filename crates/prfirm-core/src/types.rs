use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the generative backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// One outbound call: a full prompt in, a single text reply out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(config: &ModelConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model_id.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Convenience for the common system + user prompt pair.
    pub fn prompt(config: &ModelConfig, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::new(
            config,
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Concatenated text of every message with the given role.
    pub fn text_for(&self, role: Role) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_builds_system_and_user() {
        let config = ModelConfig::default();
        let req = CompletionRequest::prompt(&config, "You are an editor.", "Fix this.");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.text_for(Role::User), "Fix this.");
        assert_eq!(req.model, config.model_id);
        assert_eq!(req.max_tokens, config.max_tokens);
    }

    #[test]
    fn test_with_temperature_overrides_config() {
        let config = ModelConfig::default();
        let req = CompletionRequest::prompt(&config, "s", "u").with_temperature(0.3);
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }
}
