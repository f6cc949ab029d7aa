//! Analyzed-class records produced by the external bytecode analyzer
//!
//! These are read-only inputs: the aggregation pass never mutates them.

use serde::{Deserialize, Serialize};

/// One analyzed class with its counters and methods
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AnalyzedClass {
    /// Package name; empty for the default package
    #[serde(default)]
    pub package_name: String,
    pub source_file_name: String,
    /// Fully qualified class name
    pub class_name: String,
    pub complexity_total: u64,
    pub lines_total: u64,
    pub method_count: u64,
    #[serde(default)]
    pub methods: Vec<AnalyzedMethod>,
}

/// One analyzed method belonging to an [`AnalyzedClass`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AnalyzedMethod {
    pub name: String,
    /// JVM method descriptor, e.g. `(ILjava/lang/String;)V`
    pub descriptor: String,
    pub complexity_total: u64,
    pub lines_total: u64,
}

impl AnalyzedClass {
    /// Path used for include/exclude matching: `package/SourceFile.java`
    ///
    /// Dotted package names are normalized to `/` so globs read like paths.
    pub fn source_path(&self) -> String {
        if self.package_name.is_empty() {
            self.source_file_name.clone()
        } else {
            format!(
                "{}/{}",
                self.package_name.replace('.', "/"),
                self.source_file_name
            )
        }
    }
}
