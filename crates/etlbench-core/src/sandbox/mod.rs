//! Sandbox: isolated, stateful code execution for one trial.
//!
//! Agent code is SQLite SQL run against a per-trial connection whose schema
//! persists between calls. The sample source is attached read-only and the
//! connection is locked down so fragments cannot reach files outside the
//! trial directory. Every fault comes back as an error [`ToolResult`].
//!
//! # Modules
//!
//! - [`tools`]     - `ToolKind`, catalogue, `ToolCall::parse`, `ToolResult`
//! - [`workspace`] - `Sandbox`, `SandboxConfig`
//! - [`error`]     - `SandboxError` / `SandboxResult`

pub mod error;
pub mod tools;
pub mod workspace;

pub use error::{SandboxError, SandboxResult};
pub use tools::{catalogue, ToolCall, ToolDefinition, ToolInvocation, ToolKind, ToolResult};
pub use workspace::{Sandbox, SandboxConfig};
