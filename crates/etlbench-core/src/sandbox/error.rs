//! Error types for the sandbox module.

/// Errors produced while setting up or closing a sandbox.
///
/// Fragment failures are not errors; they become error tool results.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workspace store error: {0}")]
    Store(#[from] etlbench_store::StoreError),

    #[error("sandbox is closed: an answer was already submitted")]
    Closed,

    #[error("sandbox worker failed: {0}")]
    Worker(String),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
