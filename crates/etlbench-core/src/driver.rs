//! Bounded multi-turn conversation driver.
//!
//! Each turn sends the full transcript and the tool catalogue to the engine,
//! records the reply, dispatches its tool invocations against the sandbox
//! and answers them in the next user message. The loop ends on
//! `submit_answer`, on budget exhaustion, or on a fatal fault.

use tracing::{debug, warn};

use crate::config::{DriverConfig, EngineConfig};
use crate::domain::{
    ContentPart, ConversationMessage, EvalError, ResourceCost, StopReason, Transcript,
};
use crate::engine::{EngineRequest, ReasoningEngine};
use crate::metrics::METRICS;
use crate::obs;
use crate::sandbox::{catalogue, Sandbox, ToolCall, ToolDefinition, ToolInvocation, ToolResult};

/// Sent after a plain-text reply so roles keep alternating.
pub const CONTINUE_PROMPT: &str =
    "Continue working on the task. Use the execute_code tool to run SQL, \
     and call submit_answer with the complete repaired script when you are done.";

/// Successful end of a conversation.
#[derive(Debug, Clone)]
pub struct DriverRun {
    /// Submitted payload; `None` when the budget ran out first.
    pub answer: Option<String>,
    pub transcript: Transcript,
    pub cost: ResourceCost,
    pub steps: usize,
}

/// Fatal fault, with everything recorded up to that point.
#[derive(Debug)]
pub struct DriverFailure {
    pub error: EvalError,
    pub transcript: Transcript,
    pub cost: ResourceCost,
}

/// Drives one agent conversation.
pub struct Driver<'a> {
    engine: &'a dyn ReasoningEngine,
    model: String,
    max_tokens: u32,
    max_steps: usize,
    tools: Vec<ToolDefinition>,
}

enum Dispatch {
    Continue(Transcript),
    Submitted(Transcript, String),
}

impl<'a> Driver<'a> {
    pub fn new(
        engine: &'a dyn ReasoningEngine,
        engine_config: &EngineConfig,
        config: &DriverConfig,
    ) -> Self {
        Self {
            engine,
            model: engine_config.model.clone(),
            max_tokens: engine_config.max_tokens,
            max_steps: config.max_steps,
            tools: catalogue(),
        }
    }

    pub async fn run(
        &self,
        trial_id: usize,
        instructions: &str,
        sandbox: &mut Sandbox,
    ) -> Result<DriverRun, DriverFailure> {
        let mut transcript = Transcript::new().push(ConversationMessage::user_text(instructions));
        let mut cost = ResourceCost::default();

        for step in 1..=self.max_steps {
            let request = EngineRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                system: None,
                tools: &self.tools,
                messages: transcript.messages(),
            };
            let generated = self.engine.generate(&request).await;
            let response = match generated {
                Ok(response) => response,
                Err(err) => {
                    return Err(DriverFailure {
                        error: err.into(),
                        transcript,
                        cost,
                    })
                }
            };
            cost.record_response(&response.usage);
            METRICS.inc_engine_requests();

            let raw_stop = response.stop_reason.as_deref().unwrap_or("<missing>");
            let Some(stop_reason) = StopReason::parse(raw_stop) else {
                return Err(DriverFailure {
                    error: EvalError::ProtocolViolation {
                        stop_reason: raw_stop.to_string(),
                    },
                    transcript,
                    cost,
                });
            };
            if stop_reason == StopReason::MaxTokens {
                warn!(
                    trial_id,
                    step,
                    max_tokens = self.max_tokens,
                    "Engine reply truncated at max_tokens; continuing"
                );
            }

            let total_parts = response.content.len();
            let parts: Vec<ContentPart> = response
                .content
                .into_iter()
                .filter(ContentPart::is_supported)
                .collect();
            if parts.len() < total_parts {
                debug!(
                    dropped = total_parts - parts.len(),
                    "Dropped unsupported content parts"
                );
            }

            let invocations = parts
                .iter()
                .filter(|p| matches!(p, ContentPart::ToolUse { .. }))
                .count();
            obs::emit_driver_step(trial_id, step, stop_reason.as_str(), invocations);

            if invocations == 0 {
                if !parts.is_empty() {
                    transcript = transcript
                        .push(ConversationMessage::assistant(parts))
                        .push(ConversationMessage::user_text(CONTINUE_PROMPT));
                }
                continue;
            }

            match self
                .dispatch(trial_id, parts, transcript, sandbox, &mut cost)
                .await
            {
                Ok(Dispatch::Continue(next)) => transcript = next,
                Ok(Dispatch::Submitted(transcript, answer)) => {
                    return Ok(DriverRun {
                        answer: Some(answer),
                        transcript,
                        cost,
                        steps: step,
                    })
                }
                Err((error, transcript)) => {
                    return Err(DriverFailure {
                        error,
                        transcript,
                        cost,
                    })
                }
            }
        }

        debug!(trial_id, max_steps = self.max_steps, "Step budget exhausted without submit");
        Ok(DriverRun {
            answer: None,
            transcript,
            cost,
            steps: self.max_steps,
        })
    }

    /// Dispatch invocations in order. A submit ends dispatch; anything after
    /// it is dropped from the recorded assistant message.
    async fn dispatch(
        &self,
        trial_id: usize,
        parts: Vec<ContentPart>,
        transcript: Transcript,
        sandbox: &mut Sandbox,
        cost: &mut ResourceCost,
    ) -> Result<Dispatch, (EvalError, Transcript)> {
        let total = parts.len();
        let mut recorded = Vec::with_capacity(total);
        let mut results = Vec::new();
        let mut answer = None;

        for part in parts {
            let Some(invocation) = ToolInvocation::from_part(&part) else {
                recorded.push(part);
                continue;
            };
            cost.record_tool_call();
            METRICS.inc_tool_calls();

            let call = ToolCall::parse(&invocation);
            let result = match &call {
                ToolCall::ExecuteCode { code } => sandbox.execute_code(code).await,
                ToolCall::SubmitAnswer { answer: payload } => match sandbox.submit(payload) {
                    Ok(_) => {
                        answer = Some(payload.clone());
                        ToolResult::ok("answer submitted")
                    }
                    Err(err) => return Err((err.into(), transcript)),
                },
                ToolCall::Malformed { .. } | ToolCall::Unknown { .. } => call
                    .rejection()
                    .unwrap_or_else(|| ToolResult::error("tool call rejected")),
            };
            obs::emit_tool_dispatched(trial_id, &invocation.name, result.is_error);

            recorded.push(part);
            results.push(result.into_part(&invocation.id));
            if answer.is_some() {
                break;
            }
        }

        if recorded.len() < total {
            debug!(
                discarded = total - recorded.len(),
                "Discarded content after submit_answer"
            );
        }

        let transcript = transcript
            .push(ConversationMessage::assistant(recorded))
            .push(ConversationMessage::user(results));
        Ok(match answer {
            Some(answer) => Dispatch::Submitted(transcript, answer),
            None => Dispatch::Continue(transcript),
        })
    }
}
