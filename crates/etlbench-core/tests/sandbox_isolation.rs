//! Per-trial workspace isolation tests.

use chrono::NaiveDate;
use etlbench_core::sandbox::{Sandbox, SandboxConfig};
use etlbench_core::scenario::{build_schedule, sample_orders, sample_run_context, ScenarioConfig};
use etlbench_store::{OrderRecord, RunContext};

fn sample() -> (Vec<OrderRecord>, RunContext) {
    let schedule = build_schedule(&ScenarioConfig::default()).unwrap();
    (
        sample_orders(&schedule, 5),
        sample_run_context(&schedule).unwrap(),
    )
}

fn open(root: &std::path::Path) -> Sandbox {
    let (orders, ctx) = sample();
    Sandbox::open(root, SandboxConfig::default(), &orders, ctx).unwrap()
}

#[tokio::test]
async fn test_fresh_workspace_is_empty_even_when_directory_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("workspace");

    let first = open(&root);
    let created = first
        .execute_code("CREATE TABLE scratch (x INTEGER); CREATE INDEX ix_scratch ON scratch (x);")
        .await;
    assert!(!created.is_error, "{}", created.payload);
    let inserted = first
        .execute_code("INSERT INTO dim_orders (order_id) VALUES (1)")
        .await;
    assert!(!inserted.is_error, "{}", inserted.payload);
    drop(first);

    let second = open(&root);
    let objects = second.user_objects().await.unwrap();
    assert!(!objects.iter().any(|name| name.contains("scratch")), "{objects:?}");

    let rows = second.execute_code("SELECT COUNT(*) FROM dim_orders").await;
    assert!(!rows.is_error, "{}", rows.payload);
    assert!(rows.payload.contains("[1] COUNT(*)"), "{}", rows.payload);
    assert!(rows.payload.lines().any(|line| line.trim() == "0"), "{}", rows.payload);
}

#[tokio::test]
async fn test_state_persists_between_fragments() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = open(&dir.path().join("ws"));

    let create = sandbox
        .execute_code("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('kept');")
        .await;
    assert!(!create.is_error, "{}", create.payload);
    assert!(create.payload.contains("[2] ok, 1 row(s) affected"), "{}", create.payload);

    let read = sandbox.execute_code("SELECT body FROM notes").await;
    assert!(read.payload.contains("kept"), "{}", read.payload);
}

#[tokio::test]
async fn test_source_sample_spans_month_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = open(&dir.path().join("ws"));

    let result = sandbox
        .execute_code(
            "SELECT COUNT(*) FROM source.orders WHERE substr(created_at, 4, 7) = '02/2023';",
        )
        .await;
    assert!(!result.is_error, "{}", result.payload);
    assert!(!result.payload.lines().any(|line| line.trim() == "0"), "{}", result.payload);

    let jan = sandbox
        .execute_code("SELECT COUNT(*) FROM source.orders WHERE substr(created_at, 4, 7) = '01/2023';")
        .await;
    assert!(!jan.payload.lines().any(|line| line.trim() == "0"), "{}", jan.payload);
}

#[tokio::test]
async fn test_faults_come_back_as_error_results() {
    let dir = tempfile::tempdir().unwrap();
    let outside = dir.path().join("outside.db");
    let sandbox = open(&dir.path().join("ws"));

    let attach = sandbox
        .execute_code(&format!("ATTACH DATABASE '{}' AS other", outside.display()))
        .await;
    assert!(attach.is_error);
    assert!(!outside.exists());

    let write_source = sandbox.execute_code("DELETE FROM source.orders").await;
    assert!(write_source.is_error);

    let syntax = sandbox.execute_code("SELEC 1").await;
    assert!(syntax.is_error);
    assert!(syntax.payload.contains("statement 1"), "{}", syntax.payload);

    // The connection survives every fault.
    let after = sandbox.execute_code("SELECT 42 AS answer").await;
    assert!(!after.is_error, "{}", after.payload);
    assert!(after.payload.contains("42"));
}

#[tokio::test]
async fn test_runaway_fragment_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let (orders, ctx) = sample();
    let config = SandboxConfig {
        timeout_ms: 200,
        ..SandboxConfig::default()
    };
    let sandbox = Sandbox::open(&dir.path().join("ws"), config, &orders, ctx).unwrap();

    let result = sandbox
        .execute_code(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n) SELECT COUNT(*) FROM n;",
        )
        .await;
    assert!(result.is_error);
    assert!(result.payload.contains("200"), "{}", result.payload);
}

#[test]
fn test_run_context_is_last_sampled_day() {
    let (_, ctx) = sample();
    assert_eq!(ctx.run_date_text(), "2023-02-03");
    assert_eq!(
        ctx.run_at.date(),
        NaiveDate::from_ymd_opt(2023, 2, 3).unwrap()
    );
}
