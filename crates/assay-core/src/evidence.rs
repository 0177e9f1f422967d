//! Execution Evidence - Proof that real work was performed
//!
//! An artifact can claim anything; evidence is what separates "done" from
//! "described". This module collects execution traces (applied diffs, files
//! touched, commands run, test outcomes) from an artifact and its evaluation
//! context so the correctness and completeness evaluators can demand proof.

use serde_json::Value;

/// Artifact keys that carry execution evidence.
const ARTIFACT_EVIDENCE_KEYS: &[&str] = &[
    "actions_taken",
    "executed_operations",
    "applied_changes",
    "files_modified",
    "commands_run",
    "diff_summary",
    "evidence",
];

/// Context keys that carry execution evidence.
const CONTEXT_EVIDENCE_KEYS: &[&str] = &["evidence", "execution", "diff_summary", "applied_changes"];

/// Collect every piece of evidence that real work was performed.
///
/// Scans the artifact and the context for execution markers and returns
/// human-readable descriptions, deduplicated in first-seen order. An empty
/// result means no verifiable work was found anywhere.
pub fn extract_execution_evidence(artifact: &Value, context: &Value) -> Vec<String> {
    let mut evidence = Vec::new();

    if artifact.is_object() {
        for key in ARTIFACT_EVIDENCE_KEYS {
            if let Some(value) = artifact.get(key) {
                collect(value, Some(key), &mut evidence);
            }
        }
    }

    for key in CONTEXT_EVIDENCE_KEYS {
        if let Some(value) = context.get(key) {
            collect(value, Some(key), &mut evidence);
        }
    }

    if let Some(test_results) = context.get("test_results").and_then(Value::as_object) {
        if test_results
            .get("passed")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            evidence.push("tests: suite passed".to_string());
        }
        if let Some(pass_rate) = test_results.get("pass_rate").and_then(Value::as_f64) {
            if pass_rate > 0.0 {
                evidence.push(format!("tests: pass rate {:.0}%", pass_rate * 100.0));
            }
        }
    }

    dedup_preserving_order(evidence)
}

/// Recursively flatten a value into labelled evidence strings.
///
/// Empty strings, nulls, and empty containers contribute nothing: the
/// presence of a key alone is not evidence.
fn collect(value: &Value, prefix: Option<&str>, out: &mut Vec<String>) {
    let label = prefix.map(|p| format!("{p}: ")).unwrap_or_default();

    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => out.push(format!("{label}{s}")),
                    Value::Number(n) => out.push(format!("{label}{n}")),
                    Value::Object(_) | Value::Array(_) => collect(item, prefix, out),
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            for (subkey, subvalue) in map {
                let nested = match prefix {
                    Some(p) => format!("{p}: {subkey}"),
                    None => subkey.clone(),
                };
                collect(subvalue, Some(&nested), out);
            }
        }
        Value::String(s) if !s.trim().is_empty() => out.push(format!("{label}{s}")),
        Value::Number(n) => out.push(format!("{label}{n}")),
        Value::Bool(true) => out.push(format!("{label}true")),
        _ => {}
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
