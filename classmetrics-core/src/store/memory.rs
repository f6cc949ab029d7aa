//! In-memory metric store for tests and dry runs

use super::{
    check_applicable, check_combinator, check_seed, MetricStore, RowWrite, StoreError, StoredRow,
};
use crate::catalog::{Combinator, Metric, ScopeKind};
use crate::scope::ScopeKey;
use std::collections::BTreeMap;

type RowId = (ScopeKey, Metric);

/// BTreeMap-backed store with undo-log transactions
#[derive(Debug, Default, Clone)]
pub struct InMemoryMetricStore {
    rows: BTreeMap<RowId, Option<f64>>,
    /// Previous state of every row touched since `begin`; `None` means absent
    undo: Option<Vec<(RowId, Option<Option<f64>>)>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all scopes
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn record_undo(&mut self, id: &RowId) {
        if let Some(log) = self.undo.as_mut() {
            log.push((id.clone(), self.rows.get(id).copied()));
        }
    }

    fn existing(&self, key: &ScopeKey, metric: Metric) -> Result<RowId, StoreError> {
        let id = (key.clone(), metric);
        if self.rows.contains_key(&id) {
            Ok(id)
        } else {
            Err(StoreError::MissingRow {
                key: key.clone(),
                metric,
            })
        }
    }
}

impl MetricStore for InMemoryMetricStore {
    fn init_schema(&mut self) -> Result<(), StoreError> {
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
        let id = (key.clone(), metric);
        if self.rows.contains_key(&id) {
            return Ok(RowWrite::AlreadyPresent);
        }
        self.record_undo(&id);
        self.rows.insert(id, value);
        Ok(RowWrite::Created)
    }

    fn accumulate(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        delta: f64,
    ) -> Result<(), StoreError> {
        check_combinator(metric, Combinator::Sum, "accumulate")?;
        let id = self.existing(key, metric)?;
        self.record_undo(&id);
        if let Some(value) = self.rows.get_mut(&id) {
            *value = Some(value.unwrap_or(0.0) + delta);
        }
        Ok(())
    }

    fn set_maximum(
        &mut self,
        key: &ScopeKey,
        metric: Metric,
        candidate: f64,
    ) -> Result<(), StoreError> {
        check_combinator(metric, Combinator::Max, "set_maximum")?;
        let id = self.existing(key, metric)?;
        self.record_undo(&id);
        if let Some(value) = self.rows.get_mut(&id) {
            *value = Some(match *value {
                Some(current) if current >= candidate => current,
                _ => candidate,
            });
        }
        Ok(())
    }

    fn row(&self, key: &ScopeKey, metric: Metric) -> Result<Option<StoredRow>, StoreError> {
        Ok(self
            .rows
            .get(&(key.clone(), metric))
            .map(|value| StoredRow {
                key: key.clone(),
                metric,
                value: *value,
            }))
    }

    fn rows(&self, scope: ScopeKind) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self
            .rows
            .iter()
            .filter(|((key, _), _)| key.kind() == scope)
            .map(|((key, metric), value)| StoredRow {
                key: key.clone(),
                metric: *metric,
                value: *value,
            })
            .collect())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.undo = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.undo = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(log) = self.undo.take() {
            for (id, previous) in log.into_iter().rev() {
                match previous {
                    Some(value) => {
                        self.rows.insert(id, value);
                    }
                    None => {
                        self.rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}
