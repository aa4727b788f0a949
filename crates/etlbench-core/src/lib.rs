//! etlbench Core Library
//!
//! Evaluation harness for agents repairing an incremental ETL job: a bounded
//! conversation driver, a per-trial SQL sandbox, a multi-day scenario grader
//! and a trial orchestrator.

pub mod config;
pub mod domain;
pub mod driver;
pub mod engine;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod sandbox;
pub mod scenario;
pub mod telemetry;

pub use config::{DriverConfig, EngineConfig, EvalConfig, ModeName, OrchestratorConfig};

pub use domain::{
    ContentPart, ConversationMessage, EvalError, FailureReason, FaultKind, GradeResult, Invariant,
    ResourceCost, Result, Role, RunSummary, StopReason, Transcript, TrialOutcome, TrialRecord,
    Usage,
};

pub use driver::{Driver, DriverFailure, DriverRun, CONTINUE_PROMPT};

pub use engine::{
    AnthropicEngine, EngineError, EngineRequest, EngineResponse, ReasoningEngine, ScriptedEngine,
};

pub use orchestrator::{CompletionCallback, ExecutionMode, Orchestrator, RunOutput};

pub use sandbox::{Sandbox, SandboxConfig, SandboxError, ToolCall, ToolResult};

pub use scenario::{
    extract_artifact, task_prompt, Grader, ScenarioConfig, ScenarioError, BROKEN_ARTIFACT,
};

pub use telemetry::init_tracing;
