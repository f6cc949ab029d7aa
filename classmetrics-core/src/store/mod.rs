//! Idempotent metric store
//!
//! The aggregator talks to persistence only through [`MetricStore`]. Row
//! creation reports a collision as [`RowWrite::AlreadyPresent`] instead of an
//! error, so "create once, accumulate many" never relies on error codes.
//!
//! Global invariants enforced:
//! - At most one row per (scope key, metric)
//! - Sum rows only move by accumulate, Max rows only by set_maximum
//! - Writes to a missing row are invariant violations, never silently created

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryMetricStore;
pub use sqlite::{JournalMode, SqliteMetricStore, SqliteStoreConfig};

use crate::catalog::{Combinator, Metric, ScopeKind};
use crate::scope::ScopeKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a metric store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Accumulate or set_maximum hit a row that was never created
    #[error("no {metric} row for {key} (row was never ensured)")]
    MissingRow { key: ScopeKey, metric: Metric },

    /// The metric is not defined at the key's scope
    #[error("{metric} is not defined at {scope} scope")]
    NotApplicable { scope: ScopeKind, metric: Metric },

    /// The write does not match the metric's combinator
    #[error("{metric} combines by {combinator:?}; {operation} is not allowed")]
    CombinatorMismatch {
        metric: Metric,
        combinator: Combinator,
        operation: &'static str,
    },

    /// A Sum row was created without a starting value
    #[error("{metric} row for {key} needs a starting value")]
    UnseededSum { key: ScopeKey, metric: Metric },

    /// The backing store could not be opened or reached
    #[error("metric store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted
    #[error("metric store holds invalid data: {0}")]
    Corrupt(String),

    /// SQLite reported an error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result of a row creation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowWrite {
    Created,
    AlreadyPresent,
}

/// One persisted metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredRow {
    pub key: ScopeKey,
    pub metric: Metric,
    /// `None` for a Max row that has not been written yet
    pub value: Option<f64>,
}

/// Persistence backend for metric rows
pub trait MetricStore {
    /// Create the four metric tables if they do not exist
    fn init_schema(&mut self) -> Result<(), StoreError>;

    /// Insert a row with `value` unless one exists for (key, metric)
    ///
    /// Only Max rows may start without a value.
    fn create_row(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        value: Option<f64>,
    ) -> Result<RowWrite, StoreError>;

    /// Add `delta` to an existing Sum row
    fn accumulate(&mut self, key: &ScopeKey, metric: Metric, delta: f64)
        -> Result<(), StoreError>;

    /// Raise an existing Max row to `candidate` if it is larger
    fn set_maximum(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        candidate: f64,
    ) -> Result<(), StoreError>;

    /// Read one row back
    fn row(&self, key: &ScopeKey, metric: Metric) -> Result<Option<StoredRow>, StoreError>;

    /// All rows of one scope, ordered by key then catalog order
    fn rows(&self, scope: ScopeKind) -> Result<Vec<StoredRow>, StoreError>;

    /// Insert a row with the metric's seed if absent
    fn ensure_row(&mut self, key: &ScopeKey, metric: Metric) -> Result<RowWrite, StoreError> {
        self.create_row(key, metric, metric.combinator().seed())
    }

    /// Current value of a row, if the row exists and has been written
    fn value(&self, key: &ScopeKey, metric: Metric) -> Result<Option<f64>, StoreError> {
        Ok(self.row(key, metric)?.and_then(|row| row.value))
    }

    /// Start a unit of work covering one class
    fn begin(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Make the current unit of work durable
    fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Discard writes since [`MetricStore::begin`]
    fn rollback(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Reject metrics that are not defined at the key's scope
pub(crate) fn check_applicable(key: &ScopeKey, metric: Metric) -> Result<(), StoreError> {
    let scope = key.kind();
    if metric.applies_to(scope) {
        Ok(())
    } else {
        Err(StoreError::NotApplicable { scope, metric })
    }
}

/// Reject a Sum row without a starting value
pub(crate) fn check_seed(
    key: &ScopeKey,
    metric: Metric,
    value: Option<f64>,
) -> Result<(), StoreError> {
    if value.is_none() && metric.combinator() == Combinator::Sum {
        return Err(StoreError::UnseededSum {
            key: key.clone(),
            metric,
        });
    }
    Ok(())
}

/// Reject writes that do not match the metric's combinator
pub(crate) fn check_combinator(
    metric: Metric,
    expected: Combinator,
    operation: &'static str,
) -> Result<(), StoreError> {
    let combinator = metric.combinator();
    if combinator == expected {
        Ok(())
    } else {
        Err(StoreError::CombinatorMismatch {
            metric,
            combinator,
            operation,
        })
    }
}
