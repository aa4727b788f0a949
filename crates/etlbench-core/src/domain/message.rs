//! Conversation messages in the Messages API wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One content block of a message.
///
/// Block types this crate does not model deserialize as `Unsupported` and are
/// never recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },
    #[serde(other)]
    Unsupported,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// A single turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ConversationMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Ids of the tool invocations in this message, in order.
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Ids answered by the tool results in this message, in order.
    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
    }
}

/// Append-only conversation history of one trial.
///
/// Threaded by value: every append consumes the transcript and returns the
/// extended one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, message: ConversationMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of assistant turns recorded so far.
    pub fn assistant_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

/// Why the engine stopped generating. Closed set; anything else is a
/// protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "end_turn" => Some(Self::EndTurn),
            "tool_use" => Some(Self::ToolUse),
            "max_tokens" => Some(Self::MaxTokens),
            "stop_sequence" => Some(Self::StopSequence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::ToolUse => "tool_use",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
        }
    }
}

/// Token usage reported for one engine response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_part_wire_shape() {
        let part = ContentPart::ToolResult {
            tool_use_id: "tu_1".to_string(),
            content: "{}".to_string(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "tu_1", "content": "{}"})
        );

        let part: ContentPart =
            serde_json::from_value(json!({"type": "tool_use", "id": "a", "name": "b", "input": {}}))
                .unwrap();
        assert_eq!(part, ContentPart::tool_use("a", "b", json!({})));
    }

    #[test]
    fn test_unknown_block_type_is_unsupported() {
        let part: ContentPart =
            serde_json::from_value(json!({"type": "thinking", "thinking": "hmm"})).unwrap();
        assert!(!part.is_supported());
    }

    #[test]
    fn test_stop_reason_is_closed() {
        assert_eq!(StopReason::parse("tool_use"), Some(StopReason::ToolUse));
        assert_eq!(StopReason::parse("pause_turn"), None);
        assert_eq!(StopReason::MaxTokens.as_str(), "max_tokens");
    }

    #[test]
    fn test_transcript_push_is_append_only() {
        let t = Transcript::new()
            .push(ConversationMessage::user_text("hi"))
            .push(ConversationMessage::assistant(vec![ContentPart::text("hello")]));
        assert_eq!(t.len(), 2);
        assert_eq!(t.assistant_turns(), 1);
        assert_eq!(t.messages()[0].role, Role::User);
    }
}
