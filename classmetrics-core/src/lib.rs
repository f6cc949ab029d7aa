//! classmetrics core library - hierarchical JVM metrics aggregation and persistence

// Global invariants enforced in this crate:
// - Classes are processed strictly in input order, one at a time
// - Every (scope, key, metric) row is created exactly once
// - Sum rows only accumulate, Max rows never decrease
// - A failed class never leaves partial rows behind
// - No global mutable state, threads, or async

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod input;
pub mod model;
pub mod report;
pub mod scope;
pub mod store;

pub use aggregate::{plan_class, Aggregator, ClassPlan, DescriptorFailure, Operation};
pub use catalog::{Metric, ScopeKind};
pub use config::ResolvedConfig;
pub use model::{AnalyzedClass, AnalyzedMethod};
pub use scope::ScopeKey;
pub use store::{InMemoryMetricStore, MetricStore, SqliteMetricStore, StoreError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    pub classes_processed: usize,
    /// Classes dropped by include/exclude patterns
    pub classes_skipped: usize,
    pub methods_processed: usize,
    pub rows_created: usize,
    pub duplicate_rows: usize,
    pub descriptor_failures: Vec<DescriptorFailure>,
}

/// A store failure that stopped the run
#[derive(Debug, Error)]
#[error("ingest stopped at class {class} after {committed} committed class(es): {source}")]
pub struct IngestError {
    /// Classes fully committed before the failure
    pub committed: usize,
    pub class: String,
    #[source]
    pub source: StoreError,
}

/// Aggregate every class into the store, in order
///
/// Classes rejected by `filter` are counted and skipped. The first store
/// failure stops the run; classes committed before it stay in the store.
pub fn ingest<S: MetricStore + ?Sized>(
    classes: &[AnalyzedClass],
    store: &mut S,
    filter: Option<&ResolvedConfig>,
) -> Result<RunSummary, IngestError> {
    let mut summary = RunSummary::default();
    let mut aggregator = Aggregator::new(store);

    for class in classes {
        if let Some(config) = filter {
            if !config.should_include(&class.source_path()) {
                debug!(class = %class.class_name, "excluded by config");
                summary.classes_skipped += 1;
                continue;
            }
        }

        let (outcome, failures) =
            aggregator
                .apply_class(class)
                .map_err(|source| IngestError {
                    committed: summary.classes_processed,
                    class: class.class_name.clone(),
                    source,
                })?;

        summary.classes_processed += 1;
        summary.methods_processed += class.methods.len();
        summary.rows_created += outcome.rows_created;
        summary.duplicate_rows += outcome.duplicate_rows;
        summary.descriptor_failures.extend(failures);
    }

    info!(
        classes = summary.classes_processed,
        skipped = summary.classes_skipped,
        methods = summary.methods_processed,
        rows = summary.rows_created,
        duplicates = summary.duplicate_rows,
        descriptor_failures = summary.descriptor_failures.len(),
        "ingest complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(file: &str, name: &str, complexity: u64) -> AnalyzedClass {
        AnalyzedClass {
            package_name: "pkg".to_string(),
            source_file_name: file.to_string(),
            class_name: name.to_string(),
            complexity_total: complexity,
            lines_total: 10,
            method_count: 0,
            methods: vec![],
        }
    }

    #[test]
    fn test_ingest_counts_classes() {
        let mut store = InMemoryMetricStore::new();
        let classes = vec![class("A.java", "pkg/A", 5), class("B.java", "pkg/B", 3)];
        let summary = ingest(&classes, &mut store, None).unwrap();
        assert_eq!(summary.classes_processed, 2);
        assert_eq!(summary.classes_skipped, 0);
        // 5 package rows once, 7 file rows and 4 class rows per class
        assert_eq!(summary.rows_created, 5 + 2 * (7 + 4));
    }

    #[test]
    fn test_ingest_applies_filter() {
        let config: config::ClassmetricsConfig =
            serde_json::from_str(r#"{"exclude": ["pkg/Gen*.java"]}"#).unwrap();
        let resolved = config.resolve().unwrap();

        let mut store = InMemoryMetricStore::new();
        let classes = vec![class("A.java", "pkg/A", 5), class("Gen1.java", "pkg/Gen1", 9)];
        let summary = ingest(&classes, &mut store, Some(&resolved)).unwrap();
        assert_eq!(summary.classes_processed, 1);
        assert_eq!(summary.classes_skipped, 1);

        let package = ScopeKey::Package {
            package: "pkg".to_string(),
        };
        assert_eq!(
            store.value(&package, Metric::MaxCyclomatic).unwrap(),
            Some(5.0)
        );
    }
}
