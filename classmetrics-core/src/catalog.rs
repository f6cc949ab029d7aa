//! Metric catalog
//!
//! Declares which metrics exist, the scopes they apply to, and how repeated
//! contributions combine. Adding a metric means adding a variant and a row
//! to [`CATALOG`]; the aggregator and stores read everything else from here.
//!
//! Global invariants enforced:
//! - Metric names form a closed set (no free-form strings reach the store)
//! - Catalog order is the deterministic emission order within a scope

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A level in the aggregation hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Package,
    File,
    Class,
    Method,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 4] = [
        ScopeKind::Package,
        ScopeKind::File,
        ScopeKind::Class,
        ScopeKind::Method,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Package => "package",
            ScopeKind::File => "file",
            ScopeKind::Class => "class",
            ScopeKind::Method => "method",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            ScopeKind::Package => 0b0001,
            ScopeKind::File => 0b0010,
            ScopeKind::Class => 0b0100,
            ScopeKind::Method => 0b1000,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule for merging repeated contributions into one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    Sum,
    Max,
}

impl Combinator {
    /// Value a freshly ensured row starts with
    ///
    /// Max rows have no value until the first maximum is written.
    pub fn seed(&self) -> Option<f64> {
        match self {
            Combinator::Sum => Some(0.0),
            Combinator::Max => None,
        }
    }
}

/// Every metric the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    Cyclomatic,
    CyclomaticModified,
    CountLineCode,
    MaxCyclomatic,
    MaxCyclomaticModified,
    CountDeclClass,
    CountDeclMethod,
    CountDeclFunction,
    CountParams,
}

/// Set of scopes a metric applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scopes(u8);

impl Scopes {
    const ROLLUP: Scopes = Scopes(0b0011);
    const ALL: Scopes = Scopes(0b1111);

    const fn only(scope: ScopeKind) -> Scopes {
        Scopes(scope.bit())
    }

    pub fn contains(&self, scope: ScopeKind) -> bool {
        self.0 & scope.bit() != 0
    }
}

/// One catalog entry
#[derive(Debug, Clone, Copy)]
pub struct MetricDefinition {
    pub metric: Metric,
    pub combinator: Combinator,
    pub scopes: Scopes,
}

/// The metric catalog, in emission order
pub const CATALOG: &[MetricDefinition] = &[
    MetricDefinition {
        metric: Metric::Cyclomatic,
        combinator: Combinator::Sum,
        scopes: Scopes::ALL,
    },
    MetricDefinition {
        metric: Metric::CyclomaticModified,
        combinator: Combinator::Sum,
        scopes: Scopes::ALL,
    },
    MetricDefinition {
        metric: Metric::CountLineCode,
        combinator: Combinator::Sum,
        scopes: Scopes::ALL,
    },
    MetricDefinition {
        metric: Metric::MaxCyclomatic,
        combinator: Combinator::Max,
        scopes: Scopes::ROLLUP,
    },
    MetricDefinition {
        metric: Metric::MaxCyclomaticModified,
        combinator: Combinator::Max,
        scopes: Scopes::ROLLUP,
    },
    MetricDefinition {
        metric: Metric::CountDeclClass,
        combinator: Combinator::Sum,
        scopes: Scopes::only(ScopeKind::File),
    },
    MetricDefinition {
        metric: Metric::CountDeclMethod,
        combinator: Combinator::Sum,
        scopes: Scopes::only(ScopeKind::Class),
    },
    MetricDefinition {
        metric: Metric::CountDeclFunction,
        combinator: Combinator::Sum,
        scopes: Scopes::only(ScopeKind::File),
    },
    MetricDefinition {
        metric: Metric::CountParams,
        combinator: Combinator::Sum,
        scopes: Scopes::only(ScopeKind::Method),
    },
];

/// Metrics applicable at a scope, in catalog order
pub fn metrics_for(scope: ScopeKind) -> impl Iterator<Item = Metric> {
    CATALOG
        .iter()
        .filter(move |def| def.scopes.contains(scope))
        .map(|def| def.metric)
}

impl Metric {
    pub fn definition(&self) -> &'static MetricDefinition {
        // CATALOG is laid out in declaration order (checked in tests)
        &CATALOG[*self as usize]
    }

    pub fn combinator(&self) -> Combinator {
        self.definition().combinator
    }

    pub fn applies_to(&self, scope: ScopeKind) -> bool {
        self.definition().scopes.contains(scope)
    }

    /// Canonical name as persisted in the `metric` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cyclomatic => "Cyclomatic",
            Metric::CyclomaticModified => "CyclomaticModified",
            Metric::CountLineCode => "CountLineCode",
            Metric::MaxCyclomatic => "MaxCyclomatic",
            Metric::MaxCyclomaticModified => "MaxCyclomaticModified",
            Metric::CountDeclClass => "CountDeclClass",
            Metric::CountDeclMethod => "CountDeclMethod",
            Metric::CountDeclFunction => "CountDeclFunction",
            Metric::CountParams => "CountParams",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .map(|def| def.metric)
            .find(|m| m.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown metric: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIANTS: [Metric; 9] = [
        Metric::Cyclomatic,
        Metric::CyclomaticModified,
        Metric::CountLineCode,
        Metric::MaxCyclomatic,
        Metric::MaxCyclomaticModified,
        Metric::CountDeclClass,
        Metric::CountDeclMethod,
        Metric::CountDeclFunction,
        Metric::CountParams,
    ];

    #[test]
    fn test_every_metric_has_exactly_one_definition() {
        for metric in VARIANTS {
            let rows = CATALOG.iter().filter(|d| d.metric == metric).count();
            assert_eq!(rows, 1, "{} should have one catalog row", metric);
        }
        assert_eq!(CATALOG.len(), VARIANTS.len());
        for (index, def) in CATALOG.iter().enumerate() {
            assert_eq!(def.metric as usize, index, "{} is out of order", def.metric);
        }
    }

    #[test]
    fn test_package_metrics() {
        let metrics: Vec<_> = metrics_for(ScopeKind::Package).collect();
        assert_eq!(
            metrics,
            vec![
                Metric::Cyclomatic,
                Metric::CyclomaticModified,
                Metric::CountLineCode,
                Metric::MaxCyclomatic,
                Metric::MaxCyclomaticModified,
            ]
        );
    }

    #[test]
    fn test_file_metrics_include_declaration_counts() {
        let metrics: Vec<_> = metrics_for(ScopeKind::File).collect();
        assert_eq!(metrics.len(), 7);
        assert!(metrics.contains(&Metric::CountDeclClass));
        assert!(metrics.contains(&Metric::CountDeclFunction));
        assert!(!metrics.contains(&Metric::CountDeclMethod));
    }

    #[test]
    fn test_class_and_method_metrics() {
        let class: Vec<_> = metrics_for(ScopeKind::Class).collect();
        assert_eq!(
            class,
            vec![
                Metric::Cyclomatic,
                Metric::CyclomaticModified,
                Metric::CountLineCode,
                Metric::CountDeclMethod,
            ]
        );
        let method: Vec<_> = metrics_for(ScopeKind::Method).collect();
        assert_eq!(
            method,
            vec![
                Metric::Cyclomatic,
                Metric::CyclomaticModified,
                Metric::CountLineCode,
                Metric::CountParams,
            ]
        );
    }

    #[test]
    fn test_combinators_and_seeds() {
        assert_eq!(Metric::MaxCyclomatic.combinator(), Combinator::Max);
        assert_eq!(Metric::CountDeclClass.combinator(), Combinator::Sum);
        assert_eq!(Combinator::Sum.seed(), Some(0.0));
        assert_eq!(Combinator::Max.seed(), None);
    }

    #[test]
    fn test_metric_names_parse_back() {
        for metric in VARIANTS {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
        assert!("Cyclomatc".parse::<Metric>().is_err());
    }
}
