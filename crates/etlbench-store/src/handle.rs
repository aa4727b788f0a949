//! Dataset Handle - Connection and Operations
//!
//! Wraps one rusqlite connection and provides:
//! - attach_read_only / lock_down (confinement)
//! - run_fragment (agent code, rendered for the transcript)
//! - run_script (ETL artifact, one job invocation)
//! - insert_orders / read_target / set_run_context (grader plumbing)

use crate::error::StoreError;
use crate::render::{render_value, FragmentOutput, RenderLimits};
use crate::schema::{OrderRecord, RunContext, TargetRow, CONTEXT_SCHEMA};
use crate::StoreResult;
use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::{params, Batch, Connection};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

/// A single dataset connection owned by one trial.
pub struct DatasetStore {
    conn: Connection,
    path: Option<PathBuf>,
    locked: bool,
}

impl std::fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("path", &self.path)
            .field("locked", &self.locked)
            .finish()
    }
}

impl DatasetStore {
    /// Open (or create) a database file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> StoreResult<Self> {
        debug!("Opening dataset store");
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            locked: false,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
            locked: false,
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether attach/detach are denied on this connection.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Apply DDL (idempotent `CREATE ... IF NOT EXISTS` batches).
    pub fn init_schema(&self, ddl: &str) -> StoreResult<()> {
        self.conn.execute_batch(ddl)?;
        Ok(())
    }

    /// Attach another database file read-only under `alias`.
    ///
    /// Must happen before [`lock_down`](Self::lock_down).
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn attach_read_only(&self, path: &Path, alias: &str) -> StoreResult<()> {
        validate_identifier(alias)?;
        let uri = read_only_uri(path);
        self.conn
            .execute(&format!("ATTACH DATABASE ?1 AS {alias}"), params![uri])?;
        debug!("Attached read-only database");
        Ok(())
    }

    /// Deny ATTACH and DETACH for the rest of the connection's life.
    pub fn lock_down(&mut self) {
        self.conn.authorizer(Some(confine_to_trial));
        self.locked = true;
    }

    /// Replace the `etl_context` row with the simulated "now".
    pub fn set_run_context(&self, ctx: &RunContext) -> StoreResult<()> {
        self.conn.execute_batch(CONTEXT_SCHEMA)?;
        self.conn.execute("DELETE FROM temp.etl_context", [])?;
        self.conn.execute(
            "INSERT INTO temp.etl_context (run_at, run_date) VALUES (?1, ?2)",
            params![ctx.run_at_text(), ctx.run_date_text()],
        )?;
        Ok(())
    }

    /// Insert source records in one transaction.
    pub fn insert_orders(&mut self, records: &[OrderRecord]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO orders (order_id, customer_id, amount, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.order_id,
                    record.customer_id,
                    record.amount,
                    record.created_at_text()
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Read `dim_orders` back in storage order.
    pub fn read_target(&self) -> StoreResult<Vec<TargetRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT rowid, order_id, created_at FROM main.dim_orders ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TargetRow {
                    rowid: row.get(0)?,
                    order_id: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Names of user objects in the main and temp schemas.
    pub fn user_objects(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM main.sqlite_master WHERE name NOT LIKE 'sqlite_%'
             UNION ALL
             SELECT name FROM temp.sqlite_master WHERE name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Row count of a table in the main schema.
    pub fn count_rows(&self, table: &str) -> StoreResult<i64> {
        validate_identifier(table)?;
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM main.{table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    /// Execute an agent fragment and render its results.
    ///
    /// Each statement runs in turn; the first failure aborts the rest and is
    /// reported with its 1-based index.
    #[instrument(skip(self, sql), fields(len = sql.len()))]
    pub fn run_fragment(
        &self,
        sql: &str,
        limits: &RenderLimits,
        timeout: Duration,
    ) -> StoreResult<String> {
        self.with_deadline(timeout, || self.run_statements(sql, limits))
    }

    /// Run an ETL script as one job invocation.
    ///
    /// Statements autocommit individually unless the script manages its own
    /// transaction. A transaction left open is committed on success and
    /// rolled back on failure.
    #[instrument(skip(self, sql), fields(len = sql.len()))]
    pub fn run_script(&self, sql: &str, timeout: Duration) -> StoreResult<()> {
        let result = self.with_deadline(timeout, || {
            self.conn.execute_batch(sql)?;
            Ok(())
        });
        if !self.conn.is_autocommit() {
            let closing = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
            if let Err(err) = self.conn.execute_batch(closing) {
                warn!(error = %err, "Failed to close transaction left open by script");
                return result.and(Err(err.into()));
            }
        }
        result
    }

    fn with_deadline<T>(
        &self,
        timeout: Duration,
        op: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let deadline = Instant::now() + timeout;
        self.conn
            .progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        let result = op();
        self.conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Err(err) if err.is_interrupt() => Err(StoreError::Timeout {
                limit_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            other => other,
        }
    }

    fn run_statements(&self, sql: &str, limits: &RenderLimits) -> StoreResult<String> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut output = FragmentOutput::default();
        let mut index = 0usize;

        loop {
            index += 1;
            let fail = |source| StoreError::Statement { index, source };
            let Some(mut stmt) = batch.next().map_err(fail)? else {
                break;
            };

            if stmt.column_count() == 0 {
                let changed = stmt.execute([]).map_err(fail)?;
                output.push_changes(index, changed);
                continue;
            }

            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let mut rows = stmt.query([]).map_err(fail)?;
            let mut shown = Vec::new();
            let mut total = 0usize;
            while let Some(row) = rows.next().map_err(fail)? {
                total += 1;
                if shown.len() < limits.max_rows {
                    let mut cells = Vec::with_capacity(columns.len());
                    for i in 0..columns.len() {
                        cells.push(render_value(row.get_ref(i).map_err(fail)?));
                    }
                    shown.push(cells);
                }
            }
            output.push_table(index, &columns, &shown, total);
        }

        Ok(output.finish(limits))
    }
}

fn confine_to_trial(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Attach { .. } | AuthAction::Detach { .. } => Authorization::Deny,
        _ => Authorization::Allow,
    }
}

/// `file:` URI opening `path` read-only. Characters that SQLite would read as
/// URI syntax are percent-encoded.
fn read_only_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for c in path.to_string_lossy().chars() {
        match c {
            '%' | '?' | '#' => uri.push_str(&format!("%{:02X}", c as u32)),
            _ => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TARGET_SCHEMA;

    fn limits() -> RenderLimits {
        RenderLimits::default()
    }

    #[test]
    fn test_fragment_state_persists_between_calls() {
        let store = DatasetStore::open_in_memory().unwrap();
        store
            .run_fragment(
                "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2);",
                &limits(),
                Duration::from_secs(5),
            )
            .unwrap();

        let out = store
            .run_fragment("SELECT SUM(x) AS total FROM t", &limits(), Duration::from_secs(5))
            .unwrap();
        assert!(out.contains("[1] total\n3\n(1 row(s))"), "{out}");
    }

    #[test]
    fn test_failing_statement_is_numbered() {
        let store = DatasetStore::open_in_memory().unwrap();
        let err = store
            .run_fragment(
                "CREATE TABLE t (x); SELECT * FROM missing;",
                &limits(),
                Duration::from_secs(5),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { index: 2, .. }), "{err}");
    }

    #[test]
    fn test_runaway_query_times_out() {
        let store = DatasetStore::open_in_memory().unwrap();
        let err = store
            .run_fragment(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n) SELECT COUNT(*) FROM n;",
                &limits(),
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout { limit_ms: 50 }), "{err}");

        // Connection stays usable afterwards.
        store
            .run_fragment("SELECT 1", &limits(), Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn test_lock_down_denies_attach() {
        let mut store = DatasetStore::open_in_memory().unwrap();
        store.lock_down();
        assert!(store.is_locked());
        let err = store
            .run_fragment("ATTACH DATABASE ':memory:' AS other", &limits(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { index: 1, .. }));
    }

    #[test]
    fn test_failed_script_rolls_back_open_transaction() {
        let store = DatasetStore::open_in_memory().unwrap();
        store.init_schema(TARGET_SCHEMA).unwrap();
        let err = store.run_script(
            "BEGIN; INSERT INTO dim_orders (order_id) VALUES (1); SELECT * FROM missing;",
            Duration::from_secs(5),
        );
        assert!(err.is_err());
        assert_eq!(store.count_rows("dim_orders").unwrap(), 0);
    }

    #[test]
    fn test_unclosed_transaction_is_committed() {
        let store = DatasetStore::open_in_memory().unwrap();
        store.init_schema(TARGET_SCHEMA).unwrap();
        store
            .run_script(
                "BEGIN; INSERT INTO dim_orders (order_id) VALUES (1);",
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(store.count_rows("dim_orders").unwrap(), 1);
    }

    #[test]
    fn test_read_only_uri_escapes_uri_syntax() {
        assert_eq!(
            read_only_uri(Path::new("/runs/a?b#c%d/source.db")),
            "file:/runs/a%3Fb%23c%25d/source.db?mode=ro"
        );
        assert_eq!(
            read_only_uri(Path::new("/runs/plain/source.db")),
            "file:/runs/plain/source.db?mode=ro"
        );
    }

    #[test]
    fn test_attach_from_directory_with_uri_characters() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("run?1#a%20b");
        std::fs::create_dir_all(&nested).unwrap();
        let source_path = nested.join("source.db");
        let source = DatasetStore::open(&source_path).unwrap();
        source
            .init_schema("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();

        let store = DatasetStore::open_in_memory().unwrap();
        store.attach_read_only(&source_path, "src").unwrap();
        let out = store
            .run_fragment("SELECT x FROM src.t", &limits(), Duration::from_secs(5))
            .unwrap();
        assert!(out.contains("7"), "{out}");

        let err = store
            .run_fragment("INSERT INTO src.t VALUES (8)", &limits(), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { index: 1, .. }), "{err}");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("source").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("1x").is_err());
        assert!(validate_identifier("a; DROP").is_err());
    }
}
