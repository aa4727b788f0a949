//! etlbench-store: SQLite dataset stores for etlbench trials
//!
//! Every trial owns its databases outright. The sandbox uses one store as the
//! agent's conversational workspace; the grader uses two more (source and
//! warehouse) for its private replay. Nothing here is shared between trials.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: confinement to the trial directory, bounded execution, and
//! deterministic read-back.
//!
//! ## Key Components
//!
//! - `DatasetStore`: connection wrapper (attach, lock down, run fragments and scripts)
//! - `OrderRecord` / `TargetRow`: the source and target row shapes
//! - `RenderLimits`: caps applied when query results are rendered as text

mod error;
mod handle;
mod render;
pub mod schema;

pub use error::StoreError;
pub use handle::DatasetStore;
pub use render::RenderLimits;
pub use schema::{
    format_record_date, parse_record_date, OrderRecord, RunContext, TargetRow, CONTEXT_SCHEMA,
    SOURCE_ALIAS, SOURCE_SCHEMA, TARGET_SCHEMA,
};

/// Result type for etlbench-store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
