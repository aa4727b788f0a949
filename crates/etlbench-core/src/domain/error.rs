//! Top-level error taxonomy for etlbench.

use crate::engine::EngineError;
use crate::sandbox::SandboxError;
use crate::scenario::ScenarioError;
use etlbench_store::StoreError;

use super::trial::FaultKind;

/// Errors that end a trial without a grade.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("protocol violation: unknown stop reason '{stop_reason}'")]
    ProtocolViolation { stop_reason: String },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("task join error: {0}")]
    TaskJoin(String),
}

impl EvalError {
    /// Layer to blame in a faulted trial record.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Self::ProtocolViolation { .. } => FaultKind::Protocol,
            Self::Engine(_) => FaultKind::Engine,
            Self::Sandbox(_) => FaultKind::Sandbox,
            Self::Scenario(_) | Self::Store(_) => FaultKind::Grader,
            Self::TaskJoin(_) => FaultKind::Panic,
            Self::Io(_) | Self::Serialization(_) | Self::InvalidConfig(_) => {
                FaultKind::Infrastructure
            }
        }
    }
}

impl From<tokio::task::JoinError> for EvalError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Result type for etlbench operations.
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_display() {
        let err = EvalError::ProtocolViolation {
            stop_reason: "pause_turn".to_string(),
        };
        assert!(err.to_string().contains("pause_turn"));
        assert_eq!(err.fault_kind(), FaultKind::Protocol);
    }

    #[test]
    fn test_engine_errors_convert() {
        let err: EvalError = EngineError::RateLimited.into();
        assert_eq!(err.fault_kind(), FaultKind::Engine);
        assert!(err.to_string().contains("rate limited"));
    }
}
