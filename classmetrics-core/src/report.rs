//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering (scope key, then catalog order)
//! - Unwritten Max rows render as `-` in text and `null` in JSON

use crate::store::StoredRow;
use crate::RunSummary;

/// Render a run summary as human-readable text
pub fn render_summary_text(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "classes processed:   {}\n",
        summary.classes_processed
    ));
    output.push_str(&format!("classes skipped:     {}\n", summary.classes_skipped));
    output.push_str(&format!(
        "methods processed:   {}\n",
        summary.methods_processed
    ));
    output.push_str(&format!("rows created:        {}\n", summary.rows_created));
    output.push_str(&format!("duplicate rows:      {}\n", summary.duplicate_rows));
    output.push_str(&format!(
        "descriptor failures: {}\n",
        summary.descriptor_failures.len()
    ));
    for failure in &summary.descriptor_failures {
        output.push_str(&format!(
            "  {} {} {}\n",
            failure.class, failure.method, failure.descriptor
        ));
    }
    output
}

/// Render a run summary as pretty JSON
pub fn render_summary_json(summary: &RunSummary) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

/// Render stored rows as an aligned text table
pub fn render_rows_text(rows: &[StoredRow]) -> String {
    if rows.is_empty() {
        return "no rows\n".to_string();
    }

    let keys: Vec<String> = rows
        .iter()
        .map(|row| row.key.components().join("  "))
        .collect();
    let key_width = keys.iter().map(|k| k.len()).max().unwrap_or(0).max("key".len());
    let metric_width = rows
        .iter()
        .map(|row| row.metric.as_str().len())
        .max()
        .unwrap_or(0)
        .max("metric".len());

    let mut output = format!(
        "{:<kw$}  {:<mw$}  value\n",
        "key",
        "metric",
        kw = key_width,
        mw = metric_width
    );
    for (row, key) in rows.iter().zip(&keys) {
        output.push_str(&format!(
            "{:<kw$}  {:<mw$}  {}\n",
            key,
            row.metric.as_str(),
            format_value(row.value),
            kw = key_width,
            mw = metric_width
        ));
    }
    output
}

/// Render stored rows as pretty JSON
pub fn render_rows_json(rows: &[StoredRow]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}
