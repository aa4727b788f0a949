//! In-process engine replaying canned responses.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{EngineError, EngineRequest, EngineResponse, ReasoningEngine};
use crate::domain::ConversationMessage;

/// What the scripted engine saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub model: String,
    pub tool_names: Vec<String>,
    pub messages: Vec<ConversationMessage>,
}

/// Replays a fixed script keyed by conversation turn.
///
/// The response for a request is `script[n]`, where `n` is the number of
/// assistant turns already in the request's history. Each conversation
/// therefore walks the script from the start, so one engine can serve many
/// trials at once.
pub struct ScriptedEngine {
    script: Vec<EngineResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<EngineResponse>) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &EngineRequest<'_>) -> Result<EngineResponse, EngineError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(RecordedRequest {
                model: request.model.to_string(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
                messages: request.messages.to_vec(),
            });
        }

        let turn = request
            .messages
            .iter()
            .filter(|m| m.role == crate::domain::Role::Assistant)
            .count();
        self.script
            .get(turn)
            .cloned()
            .ok_or(EngineError::ScriptExhausted { turn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentPart;

    fn request<'a>(messages: &'a [ConversationMessage]) -> EngineRequest<'a> {
        EngineRequest {
            model: "scripted-model",
            max_tokens: 100,
            system: None,
            tools: &[],
            messages,
        }
    }

    #[tokio::test]
    async fn test_script_is_keyed_by_assistant_turns() {
        let engine = ScriptedEngine::new(vec![
            EngineResponse::text("first"),
            EngineResponse::text("second"),
        ]);

        let opening = vec![ConversationMessage::user_text("go")];
        let r = engine.generate(&request(&opening)).await.unwrap();
        assert_eq!(r.content, vec![ContentPart::text("first")]);

        let later = vec![
            ConversationMessage::user_text("go"),
            ConversationMessage::assistant(vec![ContentPart::text("first")]),
            ConversationMessage::user_text("continue"),
        ];
        let r = engine.generate(&request(&later)).await.unwrap();
        assert_eq!(r.content, vec![ContentPart::text("second")]);

        // A fresh conversation starts over.
        let r = engine.generate(&request(&opening)).await.unwrap();
        assert_eq!(r.content, vec![ContentPart::text("first")]);
        assert_eq!(engine.request_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let engine = ScriptedEngine::new(vec![]);
        let opening = vec![ConversationMessage::user_text("go")];
        let err = engine.generate(&request(&opening)).await.unwrap_err();
        assert!(matches!(err, EngineError::ScriptExhausted { turn: 0 }));
    }
}
