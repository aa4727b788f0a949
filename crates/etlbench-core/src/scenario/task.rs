//! Task definition: prompt, broken job, artifact handling.

use regex::Regex;
use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::sync::OnceLock;

use super::ScenarioConfig;

/// The incremental load job the agent has to repair.
pub const BROKEN_ARTIFACT: &str = "\
-- Nightly incremental load: source.orders -> dim_orders
-- Bug 0: no uniqueness guard on order_id
CREATE TABLE IF NOT EXISTS dim_orders (
    order_id INTEGER,
    customer_id INTEGER,
    amount REAL,
    created_at TEXT,
    loaded_at TEXT
);

-- Bug 1: watermark taken from created_at, which is neither unique nor increasing
-- Bug 2: DD/MM/YYYY strings compared as text break at month boundaries
-- Bug 3: no ORDER BY
-- Bug 4: exclusive (>) watermark
-- Bug 5: appends without checking for existing rows
INSERT INTO dim_orders (order_id, customer_id, amount, created_at, loaded_at)
SELECT order_id, customer_id, amount, created_at, (SELECT run_at FROM etl_context)
FROM source.orders
WHERE created_at > (
    SELECT COALESCE(MAX(created_at), '01/01/1900 00:00:00') FROM dim_orders
);
";

/// Instructions for the agent, embedding the broken job.
pub fn task_prompt(config: &ScenarioConfig) -> String {
    format!(
        r#"# Role and Objective
You are a Senior Data Engineer fixing a broken incremental ETL job.

# Plan First
Begin with a concise checklist (3-7 bullets) of the sub-tasks required before making any fix.

# Instructions
- Find and fix every bug so that after {days} simulated days of incremental loads, the final `dim_orders` table matches a load of all data from scratch: no duplicates, no missing rows.
- The job is scheduled nightly and may run more than once per day. It must be idempotent.
- Business users may add historical orders (dated in the past) to the source at any time.
- Rows written by one run must be inserted in chronological order of `created_at`.
- Follow standard ETL practice and handle these real-world cases robustly.

# Environment
The job is a SQLite SQL script. Each run executes it on the warehouse database where:
- `source.orders(order_id INTEGER PRIMARY KEY, customer_id, amount, created_at TEXT)` is attached read-only. `created_at` is stored as `DD/MM/YYYY HH:MM:SS` text.
- `dim_orders(order_id, customer_id, amount, created_at, loaded_at)` is already provisioned. Do not drop or redefine it; you may add indexes.
- `etl_context(run_at, run_date)` holds the simulated time of the current run. Use it instead of the real clock.
- ATTACH and DETACH are not permitted.

Your workspace mirrors this layout with a small sample of the source spanning a month boundary.

# Tools
- `execute_code`: run SQL in your persistent workspace to explore data and test your fix.
- `submit_answer`: submit the complete repaired script. This ends the task.

# Output Requirements
- Submit the full fixed script through `submit_answer`; do not paste code as a reply.
- Keep the original structure and comments except where a fix requires a change. Briefly comment on each fix.
- After each tool call, validate the output in 1-2 lines and decide whether to proceed or self-correct.

Hint: "Is the current watermark column always unique and increasing for incremental loads?"

Here is the broken job:
```sql
{broken}```
"#,
        days = config.days,
        broken = BROKEN_ARTIFACT,
    )
}

fn fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

/// Unwrap a submission fenced in Markdown; plain SQL passes through trimmed.
pub fn extract_artifact(answer: &str) -> String {
    let body = fence()
        .and_then(|re| re.captures(answer))
        .and_then(|c| c.get(1));
    match body {
        Some(body) => body.as_str().trim().to_string(),
        None => answer.trim().to_string(),
    }
}

/// SHA-256 of the artifact text, hex encoded.
pub fn artifact_digest(artifact: &str) -> String {
    hex::encode(Sha256::digest(artifact.as_bytes()))
}

/// Unified diff of the artifact against the broken job.
pub fn artifact_diff(artifact: &str) -> String {
    TextDiff::from_lines(BROKEN_ARTIFACT, artifact)
        .unified_diff()
        .context_radius(3)
        .header("broken_job.sql", "artifact.sql")
        .to_string()
}
