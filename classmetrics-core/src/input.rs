//! Loading analyzed-class records
//!
//! Accepts either a JSON array of records or JSON Lines (one record per
//! non-blank line). Record order is preserved; it is the aggregation order.

use crate::model::AnalyzedClass;
use anyhow::{Context, Result};
use std::path::Path;

/// Read analyzed classes from a file
pub fn load_classes(path: &Path) -> Result<Vec<AnalyzedClass>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input: {}", path.display()))?;
    parse_classes(&content).with_context(|| format!("failed to parse input: {}", path.display()))
}

/// Parse analyzed classes from a JSON array or JSON Lines document
pub fn parse_classes(content: &str) -> Result<Vec<AnalyzedClass>> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array of class records");
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid class record on line {}", i + 1))
        })
        .collect()
}
