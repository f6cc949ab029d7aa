//! Hierarchical aggregation
//!
//! Turns one analyzed class into the ordered row operations that roll its
//! measurements up through file and package scope, then applies them to a
//! [`MetricStore`].
//!
//! Global invariants enforced:
//! - Every operation of a class is applied before the next class starts
//! - Package and file rows are ensured before they are accumulated
//! - Class and method rows are created once, seeded with their measurement
//! - A malformed descriptor drops only that method's CountParams row

use crate::catalog::{metrics_for, Combinator, Metric, ScopeKind};
use crate::descriptor::{count_parameters, DescriptorError};
use crate::model::{AnalyzedClass, AnalyzedMethod};
use crate::scope::{method_key, ClassScopes, ScopeKey};
use crate::store::{MetricStore, RowWrite, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One row-level write
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create the row with its catalog seed if absent
    EnsureRow { key: ScopeKey, metric: Metric },
    /// Create a fresh row seeded with a measurement
    CreateRow {
        key: ScopeKey,
        metric: Metric,
        value: f64,
    },
    Accumulate {
        key: ScopeKey,
        metric: Metric,
        delta: f64,
    },
    SetMaximum {
        key: ScopeKey,
        metric: Metric,
        candidate: f64,
    },
}

impl Operation {
    pub fn key(&self) -> &ScopeKey {
        match self {
            Operation::EnsureRow { key, .. }
            | Operation::CreateRow { key, .. }
            | Operation::Accumulate { key, .. }
            | Operation::SetMaximum { key, .. } => key,
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            Operation::EnsureRow { metric, .. }
            | Operation::CreateRow { metric, .. }
            | Operation::Accumulate { metric, .. }
            | Operation::SetMaximum { metric, .. } => *metric,
        }
    }
}

/// A method whose descriptor could not be parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DescriptorFailure {
    pub class: String,
    pub method: String,
    pub descriptor: String,
}

/// Everything the aggregator will do for one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPlan {
    pub operations: Vec<Operation>,
    pub descriptor_failures: Vec<DescriptorFailure>,
}

/// Emission order for package and file rollups
const ROLLUP_ORDER: &[Metric] = &[
    Metric::CyclomaticModified,
    Metric::Cyclomatic,
    Metric::CountLineCode,
    Metric::MaxCyclomatic,
    Metric::MaxCyclomaticModified,
    Metric::CountDeclClass,
];

/// Emission order for method rows
const METHOD_ORDER: &[Metric] = &[
    Metric::CyclomaticModified,
    Metric::Cyclomatic,
    Metric::CountLineCode,
    Metric::CountParams,
];

/// Measurement a class contributes to a rolled-up metric
fn class_measure(metric: Metric, class: &AnalyzedClass) -> Option<f64> {
    match metric {
        Metric::Cyclomatic
        | Metric::CyclomaticModified
        | Metric::MaxCyclomatic
        | Metric::MaxCyclomaticModified => Some(class.complexity_total as f64),
        Metric::CountLineCode => Some(class.lines_total as f64),
        Metric::CountDeclMethod => Some(class.method_count as f64),
        Metric::CountDeclClass => Some(1.0),
        Metric::CountDeclFunction | Metric::CountParams => None,
    }
}

/// Measurement seeding a method row
fn method_measure(
    metric: Metric,
    method: &AnalyzedMethod,
) -> Option<Result<f64, DescriptorError>> {
    match metric {
        Metric::Cyclomatic | Metric::CyclomaticModified => Some(Ok(method.complexity_total as f64)),
        Metric::CountLineCode => Some(Ok(method.lines_total as f64)),
        Metric::CountParams => Some(count_parameters(&method.descriptor).map(|n| n as f64)),
        _ => None,
    }
}

/// Accumulate/set-maximum operations rolling a class into a package or file row
fn rollup(key: &ScopeKey, class: &AnalyzedClass, operations: &mut Vec<Operation>) {
    let scope = key.kind();
    for &metric in ROLLUP_ORDER.iter().filter(|m| m.applies_to(scope)) {
        let Some(value) = class_measure(metric, class) else {
            continue;
        };
        operations.push(match metric.combinator() {
            Combinator::Sum => Operation::Accumulate {
                key: key.clone(),
                metric,
                delta: value,
            },
            Combinator::Max => Operation::SetMaximum {
                key: key.clone(),
                metric,
                candidate: value,
            },
        });
    }
}

/// Build the ordered operations for one analyzed class
///
/// Ensures come first in catalog order, then the fresh class rows, then the
/// package and file rollups in `ROLLUP_ORDER`, then each method in input
/// order with its rows in `METHOD_ORDER`.
pub fn plan_class(class: &AnalyzedClass) -> ClassPlan {
    let scopes = ClassScopes::new(class);
    let mut operations = Vec::new();
    let mut descriptor_failures = Vec::new();

    // Package and file rows exist before anything accumulates into them
    for key in [&scopes.package, &scopes.file] {
        for metric in metrics_for(key.kind()) {
            operations.push(Operation::EnsureRow {
                key: key.clone(),
                metric,
            });
        }
    }

    // Fresh class rows, one per metric
    for metric in metrics_for(ScopeKind::Class) {
        if let Some(value) = class_measure(metric, class) {
            operations.push(Operation::CreateRow {
                key: scopes.class.clone(),
                metric,
                value,
            });
        }
    }

    rollup(&scopes.package, class, &mut operations);
    rollup(&scopes.file, class, &mut operations);

    for method in &class.methods {
        operations.push(Operation::Accumulate {
            key: scopes.file.clone(),
            metric: Metric::CountDeclFunction,
            delta: 1.0,
        });
        let key = method_key(class, method);
        for &metric in METHOD_ORDER {
            match method_measure(metric, method) {
                Some(Ok(value)) => operations.push(Operation::CreateRow {
                    key: key.clone(),
                    metric,
                    value,
                }),
                Some(Err(err)) => {
                    warn!(class = %class.class_name, method = %method.name, "{}", err);
                    descriptor_failures.push(DescriptorFailure {
                        class: class.class_name.clone(),
                        method: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                    });
                }
                None => {}
            }
        }
    }

    ClassPlan {
        operations,
        descriptor_failures,
    }
}

/// Counters describing what applying one class did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassOutcome {
    pub rows_created: usize,
    /// Class or method rows that already existed (the class appeared before)
    pub duplicate_rows: usize,
    pub operations: usize,
}

/// Apply one operation to the store
pub fn apply_operation<S: MetricStore + ?Sized>(
    store: &mut S,
    operation: &Operation,
) -> Result<RowWrite, StoreError> {
    match operation {
        Operation::EnsureRow { key, metric } => store.ensure_row(key, *metric),
        Operation::CreateRow { key, metric, value } => {
            store.create_row(key, *metric, Some(*value))
        }
        Operation::Accumulate { key, metric, delta } => {
            store.accumulate(key, *metric, *delta)?;
            Ok(RowWrite::AlreadyPresent)
        }
        Operation::SetMaximum {
            key,
            metric,
            candidate,
        } => {
            store.set_maximum(key, *metric, *candidate)?;
            Ok(RowWrite::AlreadyPresent)
        }
    }
}

/// Applies class plans to a store, one class per unit of work
pub struct Aggregator<'s, S: MetricStore + ?Sized> {
    store: &'s mut S,
}

impl<'s, S: MetricStore + ?Sized> Aggregator<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Aggregator { store }
    }

    /// Apply a planned class
    ///
    /// On failure the class's partial writes are rolled back; rows committed
    /// for earlier classes are untouched.
    pub fn apply(&mut self, plan: &ClassPlan) -> Result<ClassOutcome, StoreError> {
        self.store.begin()?;
        match self.apply_operations(plan) {
            Ok(outcome) => {
                self.store.commit()?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback() {
                    warn!("rollback failed after store error: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    fn apply_operations(&mut self, plan: &ClassPlan) -> Result<ClassOutcome, StoreError> {
        let mut outcome = ClassOutcome::default();
        for operation in &plan.operations {
            let write = apply_operation(&mut *self.store, operation)?;
            outcome.operations += 1;
            match (operation, write) {
                (Operation::EnsureRow { .. } | Operation::CreateRow { .. }, RowWrite::Created) => {
                    outcome.rows_created += 1;
                }
                (Operation::CreateRow { key, metric, .. }, RowWrite::AlreadyPresent) => {
                    debug!(%key, %metric, "row already present, keeping first value");
                    outcome.duplicate_rows += 1;
                }
                _ => {}
            }
        }
        Ok(outcome)
    }

    /// Plan and apply one analyzed class
    pub fn apply_class(
        &mut self,
        class: &AnalyzedClass,
    ) -> Result<(ClassOutcome, Vec<DescriptorFailure>), StoreError> {
        let plan = plan_class(class);
        let outcome = self.apply(&plan)?;
        if outcome.duplicate_rows > 0 {
            warn!(
                class = %class.class_name,
                rows = outcome.duplicate_rows,
                "class appeared more than once; kept the first class and method rows"
            );
        }
        debug!(
            class = %class.class_name,
            operations = outcome.operations,
            created = outcome.rows_created,
            "applied class"
        );
        Ok((outcome, plan.descriptor_failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMetricStore;

    fn foo_class() -> AnalyzedClass {
        AnalyzedClass {
            package_name: "pkg".to_string(),
            source_file_name: "Foo.java".to_string(),
            class_name: "Foo".to_string(),
            complexity_total: 7,
            lines_total: 40,
            method_count: 1,
            methods: vec![AnalyzedMethod {
                name: "bar".to_string(),
                descriptor: "(I)V".to_string(),
                complexity_total: 2,
                lines_total: 5,
            }],
        }
    }

    fn kinds(plan: &ClassPlan) -> Vec<ScopeKind> {
        plan.operations.iter().map(|op| op.key().kind()).collect()
    }

    #[test]
    fn test_plan_starts_with_ensures_for_package_then_file() {
        let plan = plan_class(&foo_class());
        let ensures: Vec<_> = plan
            .operations
            .iter()
            .take_while(|op| matches!(op, Operation::EnsureRow { .. }))
            .map(|op| op.key().kind())
            .collect();
        assert_eq!(ensures.len(), 5 + 7);
        assert!(ensures[..5].iter().all(|k| *k == ScopeKind::Package));
        assert!(ensures[5..].iter().all(|k| *k == ScopeKind::File));
    }

    #[test]
    fn test_plan_creates_class_rows_before_rollup() {
        let plan = plan_class(&foo_class());
        let class_rows: Vec<_> = plan
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::CreateRow { key, metric, value } if key.kind() == ScopeKind::Class => {
                    Some((*metric, *value))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            class_rows,
            vec![
                (Metric::Cyclomatic, 7.0),
                (Metric::CyclomaticModified, 7.0),
                (Metric::CountLineCode, 40.0),
                (Metric::CountDeclMethod, 1.0),
            ]
        );
        let scopes = kinds(&plan);
        let first_rollup = plan
            .operations
            .iter()
            .position(|op| matches!(op, Operation::Accumulate { .. }))
            .unwrap();
        assert!(scopes[..first_rollup].contains(&ScopeKind::Class));
    }

    #[test]
    fn test_plan_rolls_up_with_combinators() {
        let plan = plan_class(&foo_class());
        assert!(plan.operations.contains(&Operation::SetMaximum {
            key: ScopeKey::Package {
                package: "pkg".to_string()
            },
            metric: Metric::MaxCyclomatic,
            candidate: 7.0,
        }));
        assert!(plan.operations.contains(&Operation::Accumulate {
            key: ScopeKey::File {
                package: "pkg".to_string(),
                file: "Foo.java".to_string()
            },
            metric: Metric::CountDeclClass,
            delta: 1.0,
        }));
        let package_decl_class = plan.operations.iter().any(|op| {
            op.key().kind() == ScopeKind::Package && op.metric() == Metric::CountDeclClass
        });
        assert!(!package_decl_class, "CountDeclClass is file-scoped");
    }

    #[test]
    fn test_plan_ends_with_method_rows() {
        let plan = plan_class(&foo_class());
        let tail: Vec<_> = plan.operations[plan.operations.len() - 5..].to_vec();
        assert_eq!(
            tail[0],
            Operation::Accumulate {
                key: ScopeKey::File {
                    package: "pkg".to_string(),
                    file: "Foo.java".to_string()
                },
                metric: Metric::CountDeclFunction,
                delta: 1.0,
            }
        );
        assert!(tail[1..]
            .iter()
            .all(|op| op.key().kind() == ScopeKind::Method));
        assert_eq!(tail[4].metric(), Metric::CountParams);
    }

    #[test]
    fn test_malformed_descriptor_skips_only_count_params() {
        let mut class = foo_class();
        class.methods[0].descriptor = "V".to_string();
        let plan = plan_class(&class);

        assert_eq!(plan.descriptor_failures.len(), 1);
        assert_eq!(plan.descriptor_failures[0].method, "bar");
        let method_metrics: Vec<_> = plan
            .operations
            .iter()
            .filter(|op| op.key().kind() == ScopeKind::Method)
            .map(|op| op.metric())
            .collect();
        assert_eq!(
            method_metrics,
            vec![
                Metric::CyclomaticModified,
                Metric::Cyclomatic,
                Metric::CountLineCode
            ]
        );
    }

    #[test]
    fn test_rollup_starts_with_modified_complexity() {
        let plan = plan_class(&foo_class());
        let package_rollup: Vec<_> = plan
            .operations
            .iter()
            .filter(|op| {
                op.key().kind() == ScopeKind::Package
                    && !matches!(op, Operation::EnsureRow { .. })
            })
            .map(|op| op.metric())
            .collect();
        assert_eq!(
            package_rollup,
            vec![
                Metric::CyclomaticModified,
                Metric::Cyclomatic,
                Metric::CountLineCode,
                Metric::MaxCyclomatic,
                Metric::MaxCyclomaticModified,
            ]
        );

        let method_rows: Vec<_> = plan
            .operations
            .iter()
            .filter(|op| op.key().kind() == ScopeKind::Method)
            .map(|op| op.metric())
            .collect();
        assert_eq!(method_rows, METHOD_ORDER.to_vec());
    }

    #[test]
    fn test_emission_orders_cover_the_catalog() {
        for scope in [ScopeKind::Package, ScopeKind::File] {
            let mut planned: Vec<_> = ROLLUP_ORDER
                .iter()
                .copied()
                .filter(|m| m.applies_to(scope))
                .collect();
            // CountDeclFunction is added per method rather than per class
            if scope == ScopeKind::File {
                planned.push(Metric::CountDeclFunction);
            }
            planned.sort();
            assert_eq!(planned, metrics_for(scope).collect::<Vec<_>>());
        }
        let mut methods = METHOD_ORDER.to_vec();
        methods.sort();
        assert_eq!(methods, metrics_for(ScopeKind::Method).collect::<Vec<_>>());
    }

    #[test]
    fn test_apply_class_counts_created_rows() {
        let mut store = InMemoryMetricStore::new();
        let mut aggregator = Aggregator::new(&mut store);
        let (outcome, failures) = aggregator.apply_class(&foo_class()).unwrap();
        assert!(failures.is_empty());
        // 5 package + 7 file + 4 class + 4 method rows
        assert_eq!(outcome.rows_created, 20);
        assert_eq!(outcome.duplicate_rows, 0);
        assert_eq!(store.len(), 20);
    }

    #[test]
    fn test_repeated_class_keeps_first_rows() {
        let mut store = InMemoryMetricStore::new();
        let mut aggregator = Aggregator::new(&mut store);
        aggregator.apply_class(&foo_class()).unwrap();
        let mut again = foo_class();
        again.lines_total = 99;
        let (outcome, _) = aggregator.apply_class(&again).unwrap();
        assert_eq!(outcome.rows_created, 0);
        assert_eq!(outcome.duplicate_rows, 8);

        let class_key = ScopeKey::Class {
            package: "pkg".to_string(),
            file: "Foo.java".to_string(),
            class: "Foo".to_string(),
        };
        assert_eq!(
            store.value(&class_key, Metric::CountLineCode).unwrap(),
            Some(40.0)
        );
    }
}
