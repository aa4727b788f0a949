//! Tool catalogue and total dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::ContentPart;

/// The closed set of tools the agent may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ExecuteCode,
    SubmitAnswer,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::ExecuteCode, ToolKind::SubmitAnswer];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecuteCode => "execute_code",
            Self::SubmitAnswer => "submit_answer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn argument(&self) -> &'static str {
        match self {
            Self::ExecuteCode => "code",
            Self::SubmitAnswer => "answer",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, arg_description) = match self {
            Self::ExecuteCode => (
                "Execute SQLite SQL against your persistent workspace database. \
                 Tables, views and indexes you create stay available to later calls. \
                 The sample source is attached read-only as `source`. \
                 Returns rendered result rows or affected-row counts.",
                "One or more SQL statements separated by semicolons.",
            ),
            Self::SubmitAnswer => (
                "Submit the repaired ETL script. Ends the task; no further code can run.",
                "The complete SQL script of the repaired job.",
            ),
        };
        let field = self.argument();
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    field: {"type": "string", "description": arg_description}
                },
                "required": [field]
            }),
        }
    }
}

/// Tool definition in the Messages API `tools` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Definitions of every tool in [`ToolKind::ALL`].
pub fn catalogue() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(ToolKind::definition).collect()
}

/// A tool call as emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn from_part(part: &ContentPart) -> Option<Self> {
        match part {
            ContentPart::ToolUse { id, name, input } => Some(Self {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }),
            _ => None,
        }
    }
}

/// Routed form of an invocation. Every invocation maps to exactly one arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ExecuteCode { code: String },
    SubmitAnswer { answer: String },
    Malformed { tool: ToolKind, reason: String },
    Unknown { name: String },
}

impl ToolCall {
    pub fn parse(invocation: &ToolInvocation) -> Self {
        let Some(kind) = ToolKind::from_name(&invocation.name) else {
            return Self::Unknown {
                name: invocation.name.clone(),
            };
        };

        let field = kind.argument();
        let value = match invocation.arguments.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Self::Malformed {
                    tool: kind,
                    reason: format!("`{field}` must be a string, got {}", json_type(other)),
                }
            }
            None => {
                return Self::Malformed {
                    tool: kind,
                    reason: format!("missing required argument `{field}`"),
                }
            }
        };
        if value.trim().is_empty() {
            return Self::Malformed {
                tool: kind,
                reason: format!("`{field}` must not be empty"),
            };
        }

        match kind {
            ToolKind::ExecuteCode => Self::ExecuteCode { code: value },
            ToolKind::SubmitAnswer => Self::SubmitAnswer { answer: value },
        }
    }

    /// Error result for the arms that cannot be executed.
    pub fn rejection(&self) -> Option<ToolResult> {
        match self {
            Self::Unknown { name } => Some(ToolResult::error(format!("unknown tool: {name}"))),
            Self::Malformed { tool, reason } => Some(ToolResult::error(format!(
                "malformed arguments for {}: {reason}",
                tool.name()
            ))),
            _ => None,
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of one tool call. Always produced, never a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub is_error: bool,
    pub payload: String,
}

impl ToolResult {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            is_error: false,
            payload: payload.into(),
        }
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self {
            is_error: true,
            payload: payload.into(),
        }
    }

    /// JSON body sent back to the engine: `{"output": ..., "error": ...}`.
    pub fn wire_content(&self) -> String {
        let body = if self.is_error {
            json!({"output": Value::Null, "error": self.payload})
        } else {
            json!({"output": self.payload, "error": Value::Null})
        };
        body.to_string()
    }

    /// The `tool_result` block answering `tool_use_id`.
    pub fn into_part(self, tool_use_id: &str) -> ContentPart {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: self.wire_content(),
            is_error: self.is_error,
        }
    }
}
