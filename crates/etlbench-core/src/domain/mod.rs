//! Domain model: conversation messages, grading verdicts, trial records.

pub mod error;
pub mod grade;
pub mod message;
pub mod trial;

pub use error::{EvalError, Result};
pub use grade::{FailureReason, GradeResult, Invariant};
pub use message::{ContentPart, ConversationMessage, Role, StopReason, Transcript, Usage};
pub use trial::{FaultKind, ResourceCost, RunSummary, TrialOutcome, TrialRecord};
