//! Table definitions and row types for the ETL datasets.
//!
//! The source system writes `created_at` as `DD/MM/YYYY HH:MM:SS` text. That
//! format does not sort chronologically as a string, which is exactly the
//! defect class the scenario probes, so parsing here is always explicit.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Text format of `orders.created_at` in the source system.
pub const SOURCE_DATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// ISO format, accepted when reading back rewritten dates.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Schema alias under which the source database is attached.
pub const SOURCE_ALIAS: &str = "source";

/// Source table. Keys are unique and increasing; dates are not.
pub const SOURCE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS orders (
    order_id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    created_at TEXT NOT NULL
);";

/// Declared target table: record key, record date, payload. No constraints.
pub const TARGET_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS dim_orders (
    order_id INTEGER,
    customer_id INTEGER,
    amount REAL,
    created_at TEXT,
    loaded_at TEXT
);";

/// Per-connection run context visible to the ETL script.
pub const CONTEXT_SCHEMA: &str = "CREATE TEMP TABLE IF NOT EXISTS etl_context (
    run_at TEXT NOT NULL,
    run_date TEXT NOT NULL
);";

/// One source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: i64,
    pub customer_id: i64,
    pub amount: f64,
    pub created_at: NaiveDateTime,
}

impl OrderRecord {
    /// `created_at` rendered the way the source system stores it.
    pub fn created_at_text(&self) -> String {
        format_record_date(&self.created_at)
    }
}

/// A target row as read back in storage (rowid) order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRow {
    pub rowid: i64,
    pub order_id: Option<i64>,
    pub created_at: Option<String>,
}

/// Simulated "now" for one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub run_at: NaiveDateTime,
}

impl RunContext {
    pub fn new(run_at: NaiveDateTime) -> Self {
        Self { run_at }
    }

    pub fn run_at_text(&self) -> String {
        self.run_at.format(ISO_DATE_FORMAT).to_string()
    }

    pub fn run_date_text(&self) -> String {
        self.run_at.date().format("%Y-%m-%d").to_string()
    }
}

/// Render a timestamp in the source format (seconds precision).
pub fn format_record_date(value: &NaiveDateTime) -> String {
    value
        .with_nanosecond(0)
        .unwrap_or(*value)
        .format(SOURCE_DATE_FORMAT)
        .to_string()
}

/// Parse a stored record date, source format first, then ISO.
pub fn parse_record_date(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, SOURCE_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, ISO_DATE_FORMAT))
        .ok()
}
