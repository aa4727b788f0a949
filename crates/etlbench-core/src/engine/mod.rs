//! Reasoning engine seam.
//!
//! The driver talks to the model only through [`ReasoningEngine`]. Two
//! implementations ship: [`AnthropicEngine`] (Messages API over HTTPS) and
//! [`ScriptedEngine`] (canned responses, used by tests and offline runs).

mod anthropic;
mod scripted;

pub use anthropic::AnthropicEngine;
pub use scripted::{RecordedRequest, ScriptedEngine};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ContentPart, ConversationMessage, Usage};
use crate::sandbox::ToolDefinition;

/// One generation request: full history plus the tool catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct EngineRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<&'a str>,
    pub tools: &'a [ToolDefinition],
    pub messages: &'a [ConversationMessage],
}

/// Raw engine response. The stop reason stays unparsed so the driver can
/// reject values outside the closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub usage: Usage,
}

impl EngineResponse {
    pub fn new(stop_reason: &str, content: Vec<ContentPart>) -> Self {
        Self {
            stop_reason: Some(stop_reason.to_string()),
            content,
            usage: Usage::default(),
        }
    }

    /// Plain-text turn ending with `end_turn`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new("end_turn", vec![ContentPart::text(text)])
    }

    /// Single tool invocation ending with `tool_use`.
    pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> Self {
        Self::new("tool_use", vec![ContentPart::tool_use(id, name, input)])
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }
}

/// Errors from an engine backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed engine response: {0}")]
    Decode(String),

    #[error("missing API key (set ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("scripted engine has no response for turn {turn}")]
    ScriptExhausted { turn: usize },
}

/// A model that can take a conversation turn.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    async fn generate(&self, request: &EngineRequest<'_>) -> Result<EngineResponse, EngineError>;
}
