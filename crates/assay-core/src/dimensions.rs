//! Quality Dimensions - The fixed rubric and its built-in evaluators
//!
//! Each dimension starts from a fixed baseline and applies deterministic,
//! explainable deductions or additions based on simple pattern checks against
//! the artifact and the evaluation context. Two evaluators carry anti-gaming
//! rules: an artifact cannot score well on correctness or completeness by
//! assertion alone, only by showing execution evidence.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::extract_execution_evidence;

/// Quality evaluation dimensions.
///
/// `Review` is the primary external-review dimension: it has no built-in
/// evaluator and enters an assessment through the evaluation context or a
/// primary-evaluator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Does the artifact do what it claims, with proof?
    Correctness,
    /// Is the work finished rather than planned?
    Completeness,
    /// Is the artifact easy to understand and modify?
    Maintainability,
    /// Does it avoid dangerous patterns?
    Security,
    /// Does it meet latency/memory expectations?
    Performance,
    /// Does it hold up under projected load?
    Scalability,
    /// Is it covered by automated tests?
    Testability,
    /// Is it pleasant to use?
    Usability,
    /// External review score (primary correctness-like judgment)
    Review,
}

impl Dimension {
    /// The eight dimensions with built-in evaluators, in evaluation order.
    pub const BUILT_IN: [Dimension; 8] = [
        Dimension::Correctness,
        Dimension::Completeness,
        Dimension::Maintainability,
        Dimension::Security,
        Dimension::Performance,
        Dimension::Scalability,
        Dimension::Testability,
        Dimension::Usability,
    ];

    /// Default importance weight for this dimension (0-1).
    pub fn default_weight(&self) -> f64 {
        match self {
            Dimension::Correctness => 0.25,
            Dimension::Completeness => 0.20,
            Dimension::Maintainability => 0.10,
            Dimension::Security => 0.10,
            Dimension::Performance => 0.10,
            Dimension::Scalability => 0.10,
            Dimension::Testability => 0.10,
            Dimension::Usability => 0.05,
            Dimension::Review => 0.25,
        }
    }

    /// Snake-case name of this dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Correctness => "correctness",
            Dimension::Completeness => "completeness",
            Dimension::Maintainability => "maintainability",
            Dimension::Security => "security",
            Dimension::Performance => "performance",
            Dimension::Scalability => "scalability",
            Dimension::Testability => "testability",
            Dimension::Usability => "usability",
            Dimension::Review => "review",
        }
    }

    /// Parse a dimension from its snake-case name.
    pub fn parse(name: &str) -> Option<Dimension> {
        match name {
            "correctness" => Some(Dimension::Correctness),
            "completeness" => Some(Dimension::Completeness),
            "maintainability" => Some(Dimension::Maintainability),
            "security" => Some(Dimension::Security),
            "performance" => Some(Dimension::Performance),
            "scalability" => Some(Dimension::Scalability),
            "testability" => Some(Dimension::Testability),
            "usability" => Some(Dimension::Usability),
            "review" => Some(Dimension::Review),
            _ => None,
        }
    }
}

/// One dimension's evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetric {
    /// Dimension this metric scores
    pub dimension: Dimension,
    /// Score, clamped to 0-100
    pub score: f64,
    /// Importance weight (0-1)
    pub weight: f64,
    /// Free-text detail of how the score was derived
    pub details: String,
    /// Issues found
    pub issues: Vec<String>,
    /// Suggested remediations
    pub suggestions: Vec<String>,
}

impl QualityMetric {
    /// Create a metric, clamping the score into 0-100.
    pub fn new(dimension: Dimension, score: f64, details: impl Into<String>) -> Self {
        Self {
            dimension,
            score: score.clamp(0.0, 100.0),
            weight: dimension.default_weight(),
            details: details.into(),
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A built-in evaluator function.
pub type EvaluatorFn = fn(&Value, &Value) -> QualityMetric;

/// Fixed dimension -> evaluator table, built once at scorer construction.
pub fn evaluator_table() -> Vec<(Dimension, EvaluatorFn)> {
    vec![
        (Dimension::Correctness, evaluate_correctness as EvaluatorFn),
        (Dimension::Completeness, evaluate_completeness),
        (Dimension::Maintainability, evaluate_maintainability),
        (Dimension::Security, evaluate_security),
        (Dimension::Performance, evaluate_performance),
        (Dimension::Scalability, evaluate_scalability),
        (Dimension::Testability, evaluate_testability),
        (Dimension::Usability, evaluate_usability),
    ]
}

/// Textual rendering of an artifact for keyword scans.
fn artifact_text(artifact: &Value) -> String {
    match artifact {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Python-style truthiness: present, non-null, non-empty, non-zero.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn evaluate_correctness(artifact: &Value, context: &Value) -> QualityMetric {
    let mut score = 70.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();
    let mut declared_success = false;

    if let Some(map) = artifact.as_object() {
        if map.get("errors").map(is_truthy).unwrap_or(false) {
            score -= 30.0;
            issues.push("Errors present in output".to_string());
            suggestions.push("Fix errors before proceeding".to_string());
        }

        // A missing success flag counts as declared success; only an
        // explicit false is penalized.
        let success = map.get("success").and_then(Value::as_bool).unwrap_or(true);
        if !success {
            score -= 20.0;
            issues.push("Operation not marked as successful".to_string());
        } else {
            declared_success = true;
        }
    }

    if let Some(pass_rate) = context
        .get("test_results")
        .and_then(|t| t.get("pass_rate"))
        .and_then(Value::as_f64)
    {
        score = pass_rate * 100.0;
    }

    let execution_evidence = extract_execution_evidence(artifact, context);
    if declared_success && execution_evidence.is_empty() {
        score = score.min(40.0);
        issues.push("Declared success without execution evidence".to_string());
        suggestions
            .push("Share applied diffs, commands, or test logs before claiming success".to_string());
    }

    let mut metric = QualityMetric::new(
        Dimension::Correctness,
        score,
        "Correctness based on errors and test results",
    );
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn evaluate_completeness(artifact: &Value, context: &Value) -> QualityMetric {
    let mut score = 80.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let text = artifact_text(artifact);
    let text_lower = text.to_lowercase();

    if let Some(requirements) = context.get("requirements").and_then(Value::as_array) {
        if !requirements.is_empty() {
            let mut met = 0usize;
            for requirement in requirements {
                let Some(requirement) = requirement.as_str() else {
                    continue;
                };
                if requirement_met(&text_lower, requirement) {
                    met += 1;
                } else {
                    issues.push(format!("Missing requirement: {requirement}"));
                    suggestions.push(format!("Implement {requirement}"));
                }
            }
            score = (met as f64 / requirements.len() as f64) * 100.0;
        }
    }

    if text.contains("TODO") || text.contains("FIXME") {
        score -= 20.0;
        issues.push("Contains TODO/FIXME comments".to_string());
        suggestions.push("Complete all TODO items".to_string());
    }

    let execution_evidence = extract_execution_evidence(artifact, context);
    let mut planned_only = false;
    if let Some(map) = artifact.as_object() {
        if map.get("status").and_then(Value::as_str) == Some("plan-only") {
            planned_only = true;
        }

        let planned_actions = map
            .get("planned_actions")
            .or_else(|| map.get("plan"))
            .map(is_truthy)
            .unwrap_or(false);
        if planned_actions && execution_evidence.is_empty() {
            planned_only = true;
        }
    }

    if planned_only && execution_evidence.is_empty() {
        score = score.min(25.0);
        issues.push("Only a plan was produced; no concrete work verified".to_string());
        suggestions.push("Execute the plan and capture diffs/tests before re-evaluating".to_string());
    }

    let mut metric = QualityMetric::new(
        Dimension::Completeness,
        score,
        "Completeness of implementation",
    );
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

/// All whitespace-separated keywords of the requirement appear in the text.
fn requirement_met(text_lower: &str, requirement: &str) -> bool {
    requirement
        .to_lowercase()
        .split_whitespace()
        .all(|keyword| text_lower.contains(keyword))
}

fn evaluate_maintainability(artifact: &Value, _context: &Value) -> QualityMetric {
    let mut score = 75.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let code = artifact.get("code").and_then(Value::as_str);
    if let Some(code) = code {
        let lines: Vec<&str> = code.lines().collect();

        if function_blocks(code).iter().any(|block| block.len() > 50) {
            score -= 15.0;
            issues.push("Functions too long".to_string());
            suggestions.push("Break down long functions".to_string());
        }

        if lines.len() > 500 {
            score -= 10.0;
            issues.push("File too long".to_string());
            suggestions.push("Split into multiple modules".to_string());
        }
    }

    let duplication_text = code.map(String::from).unwrap_or_else(|| artifact_text(artifact));
    if has_duplication(&duplication_text) {
        score -= 15.0;
        issues.push("Code duplication detected".to_string());
        suggestions.push("Extract common functionality".to_string());
    }

    let mut metric = QualityMetric::new(Dimension::Maintainability, score, "Code maintainability");
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

/// Split code into function-sized blocks by function-start lines.
fn function_blocks(code: &str) -> Vec<Vec<&str>> {
    const FUNCTION_STARTS: [&str; 3] = ["fn ", "def ", "function "];

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in code.lines() {
        let trimmed = line.trim_start();
        let starts_function = FUNCTION_STARTS
            .iter()
            .any(|prefix| trimmed.starts_with(prefix));
        if starts_function {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.push(line);
        } else if !current.is_empty() {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Any non-trivial line repeated more than twice counts as duplication.
fn has_duplication(text: &str) -> bool {
    let mut counts: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.len() > 20 {
            *counts.entry(stripped).or_insert(0) += 1;
        }
    }
    counts.values().any(|&count| count > 2)
}

lazy_static! {
    /// Dangerous-pattern table: (pattern, issue, penalty).
    static ref SECURITY_PATTERNS: Vec<(Regex, &'static str, f64)> = vec![
        (
            Regex::new(r"(?i)eval\(").expect("static regex"),
            "Use of eval() is dangerous",
            20.0,
        ),
        (
            Regex::new(r"(?i)exec\(").expect("static regex"),
            "Use of exec() is dangerous",
            20.0,
        ),
        (
            Regex::new(r"(?i)pickle\.loads").expect("static regex"),
            "Unsafe deserialization",
            15.0,
        ),
        (
            Regex::new(r"(?i)os\.system").expect("static regex"),
            "Direct system calls",
            15.0,
        ),
        (
            Regex::new(r#"(?i)password\s*=\s*["']"#).expect("static regex"),
            "Hardcoded password",
            25.0,
        ),
    ];
}

fn evaluate_security(artifact: &Value, _context: &Value) -> QualityMetric {
    let mut score = 80.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let text = artifact_text(artifact);

    for (pattern, issue, penalty) in SECURITY_PATTERNS.iter() {
        if pattern.is_match(&text) {
            score -= penalty;
            issues.push((*issue).to_string());
            suggestions.push(format!("Fix security issue: {issue}"));
        }
    }

    if text.contains("user_input") && !text.contains("validate") {
        score -= 10.0;
        issues.push("No input validation".to_string());
        suggestions.push("Add input validation".to_string());
    }

    let mut metric = QualityMetric::new(Dimension::Security, score, "Security assessment");
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn evaluate_performance(_artifact: &Value, context: &Value) -> QualityMetric {
    let mut score = 70.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    if let Some(metrics) = context.get("metrics") {
        let response_time = metrics
            .get("response_time")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if response_time > 1000.0 {
            score -= 20.0;
            issues.push("High response time".to_string());
            suggestions.push("Optimize response time".to_string());
        }

        let memory_mb = metrics
            .get("memory_mb")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if memory_mb > 500.0 {
            score -= 15.0;
            issues.push("High memory usage".to_string());
            suggestions.push("Reduce memory footprint".to_string());
        }
    }

    let mut metric = QualityMetric::new(Dimension::Performance, score, "Performance metrics");
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn evaluate_scalability(artifact: &Value, context: &Value) -> QualityMetric {
    let mut score = 70.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let text_lower = artifact_text(artifact).to_lowercase();

    if let Some(scalability) = context.get("scalability").filter(|v| is_truthy(v)) {
        let projected_load = scalability.get("projected_load").and_then(Value::as_f64);
        let current_capacity = scalability.get("current_capacity").and_then(Value::as_f64);
        if let (Some(load), Some(capacity)) = (projected_load, current_capacity) {
            if capacity < load {
                score -= 20.0;
                issues.push("Projected load exceeds current capacity".to_string());
                suggestions.push("Increase capacity or introduce load balancing".to_string());
            } else {
                score += 5.0;
            }
        }

        if let Some(bottlenecks) = scalability.get("bottlenecks").and_then(Value::as_array) {
            if !bottlenecks.is_empty() {
                let penalty = (10.0 * bottlenecks.len() as f64).min(30.0);
                score -= penalty;
                issues.push("Scalability bottlenecks identified".to_string());
                suggestions.push(format!(
                    "Address bottlenecks: {}",
                    join_values(bottlenecks)
                ));
            }
        }

        if let Some(strategies) = scalability.get("strategies").and_then(Value::as_array) {
            if !strategies.is_empty() {
                score += (3.0 * strategies.len() as f64).min(10.0);
            }
        }
    } else {
        // Heuristic detection from artifact text
        if text_lower.contains("single server") || text_lower.contains("monolith") {
            score -= 10.0;
            issues.push("Potential single server scaling limitation".to_string());
            suggestions.push("Consider horizontal scaling or modularization".to_string());
        }
        if ["autoscale", "queue", "shard", "partition"]
            .iter()
            .any(|keyword| text_lower.contains(keyword))
        {
            score += 5.0;
        }
    }

    let mut metric = QualityMetric::new(
        Dimension::Scalability,
        score,
        "Scalability assessment from architecture and context",
    );
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn evaluate_testability(artifact: &Value, context: &Value) -> QualityMetric {
    let mut score: f64 = 65.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let text_lower = artifact_text(artifact).to_lowercase();

    if let Some(test_results) = context.get("test_results").filter(|v| is_truthy(v)) {
        if let Some(pass_rate) = test_results.get("pass_rate").and_then(Value::as_f64) {
            score = score.max(pass_rate * 100.0);
        }

        if test_results.get("tests_collected").and_then(Value::as_u64) == Some(0) {
            score -= 25.0;
            issues.push("No automated tests were discovered".to_string());
            suggestions.push("Add unit and integration tests for critical paths".to_string());
        }

        if let Some(coverage) = test_results.get("coverage").and_then(Value::as_f64) {
            if coverage < 0.6 {
                score -= 15.0;
                issues.push("Test coverage below 60%".to_string());
                suggestions.push("Increase coverage for high-risk modules".to_string());
            }
        }
    } else if text_lower.contains("todo tests") {
        score -= 20.0;
        issues.push("Tests marked as TODO".to_string());
        suggestions.push("Implement pending tests before shipping".to_string());
    }

    let mut metric = QualityMetric::new(
        Dimension::Testability,
        score,
        "Testability based on automated test signals",
    );
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn evaluate_usability(artifact: &Value, context: &Value) -> QualityMetric {
    let mut score = 75.0;
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let feedback = context
        .get("usability_feedback")
        .or_else(|| context.get("user_feedback"));
    if let Some(feedback) = feedback.and_then(Value::as_object) {
        if let Some(satisfaction) = feedback.get("satisfaction").and_then(Value::as_f64) {
            score = satisfaction;
        }
        if let Some(reported) = feedback.get("issues").and_then(Value::as_array) {
            issues.extend(reported.iter().filter_map(Value::as_str).map(String::from));
        }
        if let Some(reported) = feedback.get("suggestions").and_then(Value::as_array) {
            suggestions.extend(reported.iter().filter_map(Value::as_str).map(String::from));
        }
    }

    if let Some(acc_issues) = context.get("accessibility_issues").and_then(Value::as_array) {
        if !acc_issues.is_empty() {
            let penalty = (5.0 * acc_issues.len() as f64).min(25.0);
            score -= penalty;
            issues.push("Accessibility issues detected".to_string());
            suggestions.push(format!(
                "Resolve accessibility gaps: {}",
                join_values(acc_issues)
            ));
        }
    }

    let text_lower = artifact_text(artifact).to_lowercase();
    if text_lower.contains("poor ux") || text_lower.contains("hard to use") {
        score -= 10.0;
        issues.push("Negative usability feedback noted".to_string());
        suggestions.push("Iterate on UX with user testing".to_string());
    }

    let mut metric = QualityMetric::new(
        Dimension::Usability,
        score,
        "Usability and accessibility assessment",
    );
    metric.issues = issues;
    metric.suggestions = suggestions;
    metric
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
