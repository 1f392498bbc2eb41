use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message, as stored and as sent to the completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling parameters sent with every completion. Only the model is selectable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingConfig {
    pub model: String,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
}

impl SamplingConfig {
    pub const PRESENCE_PENALTY: f64 = 0.0;
    pub const FREQUENCY_PENALTY: f64 = 0.3;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            presence_penalty: Self::PRESENCE_PENALTY,
            frequency_penalty: Self::FREQUENCY_PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("API key is required")]
    MissingApiKey,
    #[error("Completion API error: {0}")]
    Api(String),
    #[error("Completion returned no content")]
    EmptyResponse,
    #[error("Completion request failed: {0}")]
    Request(String),
}

/// Request body for the chat-completion endpoint.
#[derive(Debug, Serialize)]
pub(super) struct CompletionRequest<'a> {
    pub(super) model: &'a str,
    pub(super) messages: &'a [ChatMessage],
    pub(super) presence_penalty: f64,
    pub(super) frequency_penalty: f64,
}

/// BYOT response type; keeps DeepSeek-style `reasoning_content` as a fallback.
#[derive(Debug, Deserialize)]
pub(super) struct ByotChatCompletionResponse {
    #[serde(default)]
    pub(super) choices: Vec<ByotChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ByotChatChoice {
    pub(super) message: ByotChatMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ByotChatMessage {
    pub(super) content: Option<String>,
    #[serde(rename = "reasoning_content")]
    pub(super) reasoning_content: Option<String>,
}
