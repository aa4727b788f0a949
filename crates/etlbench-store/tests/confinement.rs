//! Confinement tests for file-backed stores.

use chrono::NaiveDate;
use etlbench_store::{
    DatasetStore, OrderRecord, RenderLimits, RunContext, StoreError, SOURCE_ALIAS, SOURCE_SCHEMA,
    TARGET_SCHEMA,
};
use std::time::Duration;

fn order(id: i64, day: u32) -> OrderRecord {
    OrderRecord {
        order_id: id,
        customer_id: 10 + id,
        amount: 9.99,
        created_at: NaiveDate::from_ymd_opt(2023, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    }
}

fn seeded_pair(dir: &std::path::Path) -> DatasetStore {
    let mut source = DatasetStore::open(&dir.join("source.db")).unwrap();
    source.init_schema(SOURCE_SCHEMA).unwrap();
    source.insert_orders(&[order(1, 30), order(2, 31)]).unwrap();
    drop(source);

    let mut main = DatasetStore::open(&dir.join("workspace.db")).unwrap();
    main.init_schema(TARGET_SCHEMA).unwrap();
    main.attach_read_only(&dir.join("source.db"), SOURCE_ALIAS)
        .unwrap();
    main.lock_down();
    main
}

#[test]
fn attached_source_is_readable_but_not_writable() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_pair(dir.path());
    let limits = RenderLimits::default();

    let out = store
        .run_fragment(
            "SELECT COUNT(*) AS n FROM source.orders",
            &limits,
            Duration::from_secs(5),
        )
        .unwrap();
    assert!(out.contains("\n2\n"), "{out}");

    let err = store
        .run_fragment(
            "DELETE FROM source.orders",
            &limits,
            Duration::from_secs(5),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Statement { index: 1, .. }), "{err}");
}

#[test]
fn locked_store_cannot_attach_outside_files() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let store = seeded_pair(dir.path());

    let sql = format!(
        "ATTACH DATABASE '{}' AS escape",
        outside.path().join("x.db").display()
    );
    let result = store.run_fragment(&sql, &RenderLimits::default(), Duration::from_secs(5));

    assert!(result.is_err());
    assert!(!outside.path().join("x.db").exists());
}

#[test]
fn script_sees_source_and_run_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_pair(dir.path());
    let run_at = NaiveDate::from_ymd_opt(2023, 2, 1)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();
    store.set_run_context(&RunContext::new(run_at)).unwrap();

    store
        .run_script(
            "INSERT INTO dim_orders (order_id, customer_id, amount, created_at, loaded_at)
             SELECT order_id, customer_id, amount, created_at, (SELECT run_at FROM etl_context)
             FROM source.orders ORDER BY order_id;",
            Duration::from_secs(5),
        )
        .unwrap();

    let rows = store.read_target().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].order_id, Some(1));
    assert_eq!(rows[1].created_at.as_deref(), Some("31/01/2023 12:00:00"));
}

#[test]
fn reopened_file_keeps_objects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workspace.db");
    {
        let store = DatasetStore::open(&path).unwrap();
        store
            .run_fragment(
                "CREATE TABLE scratch (x)",
                &RenderLimits::default(),
                Duration::from_secs(5),
            )
            .unwrap();
    }
    let store = DatasetStore::open(&path).unwrap();
    assert_eq!(store.user_objects().unwrap(), vec!["scratch".to_string()]);
}
