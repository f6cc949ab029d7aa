//! SQLite-backed metric store
//!
//! Four tables, one per scope, each holding one row per (key, metric):
//!
//! | table            | key columns                        |
//! |------------------|------------------------------------|
//! | `package_metrics`| package                            |
//! | `file_metrics`   | package, file                      |
//! | `class_metrics`  | package, file, class               |
//! | `method_metrics` | package, file, class, method       |
//!
//! Row creation uses `ON CONFLICT (<primary key>) DO NOTHING` and reads the
//! changed-row count, so a duplicate key is a normal outcome while any other
//! constraint still fails. Accumulate and set-maximum are single `UPDATE` statements.

use super::{check_applicable, check_combinator, check_seed, MetricStore, RowWrite, StoreError, StoredRow};
use crate::catalog::{Combinator, Metric, ScopeKind};
use crate::scope::ScopeKey;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default busy timeout (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS package_metrics (
    package TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (package, metric)
);
CREATE TABLE IF NOT EXISTS file_metrics (
    package TEXT NOT NULL,
    file TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (package, file, metric)
);
CREATE TABLE IF NOT EXISTS class_metrics (
    package TEXT NOT NULL,
    file TEXT NOT NULL,
    class TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (package, file, class, metric)
);
CREATE TABLE IF NOT EXISTS method_metrics (
    package TEXT NOT NULL,
    file TEXT NOT NULL,
    class TEXT NOT NULL,
    method TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (package, file, class, method, metric)
);
"#;

/// SQLite journal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    Wal,
    #[default]
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
        }
    }
}

/// Connection settings for [`SqliteMetricStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteStoreConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    /// `None` leaves the database's persisted journal mode untouched
    pub journal_mode: Option<JournalMode>,
}

impl SqliteStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteStoreConfig {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: None,
        }
    }

    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = Some(mode);
        self
    }
}

/// Table name and key columns for a scope
fn table(scope: ScopeKind) -> (&'static str, &'static [&'static str]) {
    match scope {
        ScopeKind::Package => ("package_metrics", &["package"]),
        ScopeKind::File => ("file_metrics", &["package", "file"]),
        ScopeKind::Class => ("class_metrics", &["package", "file", "class"]),
        ScopeKind::Method => ("method_metrics", &["package", "file", "class", "method"]),
    }
}

/// `col1 = ?1 AND ... AND metric = ?n`, plus the index of the next free parameter
fn row_filter(columns: &[&str]) -> (String, usize) {
    let mut clauses: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect();
    clauses.push(format!("metric = ?{}", columns.len() + 1));
    (clauses.join(" AND "), columns.len() + 2)
}

fn insert_sql(scope: ScopeKind) -> String {
    let (table, columns) = table(scope);
    let placeholders: Vec<String> = (1..=columns.len() + 2).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {table} ({columns}, metric, value) VALUES ({values}) \
         ON CONFLICT ({columns}, metric) DO NOTHING",
        table = table,
        columns = columns.join(", "),
        values = placeholders.join(", ")
    )
}

fn accumulate_sql(scope: ScopeKind) -> String {
    let (table, columns) = table(scope);
    let (filter, value_param) = row_filter(columns);
    format!(
        "UPDATE {} SET value = value + ?{} WHERE {}",
        table, value_param, filter
    )
}

fn set_maximum_sql(scope: ScopeKind) -> String {
    let (table, columns) = table(scope);
    let (filter, value_param) = row_filter(columns);
    format!(
        "UPDATE {table} SET value = CASE WHEN value IS NULL OR value < ?{p} THEN ?{p} ELSE value END WHERE {filter}",
        table = table,
        p = value_param,
        filter = filter
    )
}

fn select_row_sql(scope: ScopeKind) -> String {
    let (table, columns) = table(scope);
    let (filter, _) = row_filter(columns);
    format!("SELECT value FROM {} WHERE {}", table, filter)
}

fn select_all_sql(scope: ScopeKind) -> String {
    let (table, columns) = table(scope);
    format!(
        "SELECT {}, metric, value FROM {}",
        columns.join(", "),
        table
    )
}

/// Positional parameters: key columns, metric name, then an optional value
fn bind<'a>(
    parts: &'a [&'a str],
    metric: &'a &'static str,
    value: Option<&'a dyn ToSql>,
) -> Vec<&'a dyn ToSql> {
    let mut params: Vec<&dyn ToSql> = parts.iter().map(|p| p as &dyn ToSql).collect();
    params.push(metric);
    params.extend(value);
    params
}

/// Metric store persisting to a SQLite database
///
/// The connection is owned by the store and closed when it is dropped.
pub struct SqliteMetricStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteMetricStore {
    /// Open (or create) the database file described by `config`
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(&config.path).map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to open database {}: {}",
                config.path.display(),
                e
            ))
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if let Some(mode) = config.journal_mode {
            conn.execute_batch(&format!("PRAGMA journal_mode = {};", mode.pragma_value()))?;
        }
        Ok(SqliteMetricStore {
            conn,
            path: Some(config.path.clone()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("failed to open in-memory database: {}", e)))?;
        Ok(SqliteMetricStore { conn, path: None })
    }

    /// Journal mode currently in effect, as SQLite reports it
    pub fn journal_mode(&self) -> Result<String, StoreError> {
        Ok(self
            .conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))?)
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run an UPDATE against one row; zero changed rows means the row is missing
    fn update_row(
        &mut self,
        sql: &str,
        key: &ScopeKey,
        metric: Metric,
        value: f64,
    ) -> Result<(), StoreError> {
        let parts = key.components();
        let name = metric.as_str();
        let params = bind(&parts, &name, Some(&value));
        let changed = self.conn.prepare_cached(sql)?.execute(params.as_slice())?;
        if changed == 0 {
            return Err(StoreError::MissingRow {
                key: key.clone(),
                metric,
            });
        }
        Ok(())
    }
}

impl MetricStore for SqliteMetricStore {
    fn init_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn create_row(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        value: Option<f64>,
    ) -> Result<RowWrite, StoreError> {
        check_applicable(key, metric)?;
        check_seed(key, metric, value)?;
        let parts = key.components();
        let name = metric.as_str();
        let params = bind(&parts, &name, Some(&value));
        let inserted = self
            .conn
            .prepare_cached(&insert_sql(key.kind()))?
            .execute(params.as_slice())?;
        Ok(if inserted == 0 {
            RowWrite::AlreadyPresent
        } else {
            RowWrite::Created
        })
    }

    fn accumulate(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        delta: f64,
    ) -> Result<(), StoreError> {
        check_combinator(metric, Combinator::Sum, "accumulate")?;
        self.update_row(&accumulate_sql(key.kind()), key, metric, delta)
    }

    fn set_maximum(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        candidate: f64,
    ) -> Result<(), StoreError> {
        check_combinator(metric, Combinator::Max, "set_maximum")?;
        self.update_row(&set_maximum_sql(key.kind()), key, metric, candidate)
    }

    fn row(&self, key: &ScopeKey, metric: Metric) -> Result<Option<StoredRow>, StoreError> {
        let parts = key.components();
        let name = metric.as_str();
        let params = bind(&parts, &name, None);
        let value: Option<Option<f64>> = self
            .conn
            .prepare_cached(&select_row_sql(key.kind()))?
            .query_row(params.as_slice(), |row| row.get(0))
            .optional()?;
        Ok(value.map(|value| StoredRow {
            key: key.clone(),
            metric,
            value,
        }))
    }

    fn rows(&self, scope: ScopeKind) -> Result<Vec<StoredRow>, StoreError> {
        let width = table(scope).1.len();
        let mut stmt = self.conn.prepare(&select_all_sql(scope))?;
        let raw = stmt
            .query_map([], |row| {
                let mut parts = Vec::with_capacity(width);
                for i in 0..width {
                    parts.push(row.get::<_, String>(i)?);
                }
                let metric: String = row.get(width)?;
                let value: Option<f64> = row.get(width + 1)?;
                Ok((parts, metric, value))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (parts, metric, value) in raw {
            let key = ScopeKey::from_components(scope, &parts).ok_or_else(|| {
                StoreError::Corrupt(format!("malformed {} key: {:?}", scope, parts))
            })?;
            let metric: Metric = metric
                .parse()
                .map_err(|e: anyhow::Error| StoreError::Corrupt(e.to_string()))?;
            rows.push(StoredRow { key, metric, value });
        }
        rows.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.metric.cmp(&b.metric)));
        Ok(rows)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
