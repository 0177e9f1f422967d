//! Quality Scorer - The evaluation facade
//!
//! Orchestrates the dimension evaluators (or a pluggable primary evaluator),
//! blends the component scores, classifies the band, derives a ranked
//! improvement list, and optionally grounds the result in deterministic
//! signals. Owns a bounded assessment history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::blend::{self, Blended};
use crate::config::{Band, QualityConfig, QualityThresholds};
use crate::dimensions::{evaluator_table, Dimension, EvaluatorFn, QualityMetric};
use crate::error::Result;
use crate::signals::DeterministicSignals;

/// Default capacity of the assessment history ring buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Complete quality assessment produced by one `evaluate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Assessment ID - `qa_<uuid>`
    pub id: String,
    /// Blended overall score (0-100)
    pub overall_score: f64,
    /// Per-dimension metrics
    pub metrics: Vec<QualityMetric>,
    /// When the assessment was produced
    pub timestamp: DateTime<Utc>,
    /// Iteration index this assessment belongs to
    pub iteration: u32,
    /// Whether the score meets the production-ready threshold
    pub passed: bool,
    /// Threshold the pass decision used
    pub threshold: f64,
    /// Band classification
    pub band: Band,
    /// Prioritized improvement list
    pub improvements_needed: Vec<String>,
    /// Component breakdown, applied weights, grounding detail
    pub metadata: Map<String, Value>,
}

/// Simplified scoring result for callers that already hold dimension scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Blended overall score, rounded to two decimals
    pub overall: f64,
    /// Grade vocabulary for the band
    pub grade: String,
    /// Recommended action for the band
    pub action: String,
    /// Band classification
    pub band: Band,
}

/// A detailed improvement suggestion ranked by impact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    /// Dimension the suggestion targets
    pub dimension: Dimension,
    /// The dimension's current score
    pub current_score: f64,
    /// The suggestion text
    pub suggestion: String,
    /// "high" below 50, "medium" otherwise
    pub priority: String,
    /// `weight * (100 - score)` - expected score headroom
    pub impact: f64,
}

/// Summary statistics over the assessment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of assessments recorded
    pub total_assessments: usize,
    /// Mean overall score
    pub average_score: f64,
    /// Lowest overall score
    pub min_score: f64,
    /// Highest overall score
    pub max_score: f64,
    /// Fraction of assessments that passed
    pub pass_rate: f64,
}

/// Comparison between two assessments, for progress tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentComparison {
    /// Score delta, rounded to one decimal
    pub score_delta: f64,
    /// Delta is positive
    pub improved: bool,
    /// Delta is negative
    pub regressed: bool,
    /// |delta| is below the stagnation threshold
    pub stagnant: bool,
    /// Band of the current assessment
    pub current_band: Band,
    /// Band of the previous assessment
    pub previous_band: Band,
    /// Bands differ
    pub band_changed: bool,
}

/// Result of a primary-evaluator pass.
///
/// When `metrics` is non-empty it fully replaces the built-in evaluator
/// table for that call, including the improvement list and metadata.
#[derive(Debug, Clone, Default)]
pub struct PrimaryEvaluation {
    /// Metrics produced by the primary evaluator
    pub metrics: Vec<QualityMetric>,
    /// Improvement list supplied by the primary evaluator
    pub improvements: Vec<String>,
    /// Metadata supplied by the primary evaluator
    pub metadata: Map<String, Value>,
}

/// Pluggable primary evaluator strategy.
///
/// Returning an empty metrics list falls back to the built-in evaluators.
pub trait PrimaryEvaluator: std::fmt::Debug {
    /// Evaluate an artifact, optionally replacing the built-in pass.
    fn evaluate(&self, artifact: &Value, context: &Value, iteration: u32) -> PrimaryEvaluation;
}

/// Additional evaluator registered alongside the built-in table.
///
/// Errors are caught and logged; only the failing evaluator is skipped.
pub trait CustomEvaluator: std::fmt::Debug {
    /// Produce an extra metric for this artifact, or `None` to abstain.
    fn evaluate(&self, artifact: &Value, context: &Value) -> Result<Option<QualityMetric>>;
}

/// Evaluates artifact quality and grounds scores in deterministic signals.
#[derive(Debug)]
pub struct QualityScorer {
    config: QualityConfig,
    evaluators: Vec<(Dimension, EvaluatorFn)>,
    primary_evaluator: Option<Box<dyn PrimaryEvaluator>>,
    custom_evaluators: Vec<Box<dyn CustomEvaluator>>,
    history: VecDeque<QualityAssessment>,
    history_capacity: usize,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityScorer {
    /// Create a scorer with default configuration.
    pub fn new() -> Self {
        Self::with_config(QualityConfig::default())
    }

    /// Create a scorer from a resolved configuration.
    pub fn with_config(config: QualityConfig) -> Self {
        Self {
            config,
            evaluators: evaluator_table(),
            primary_evaluator: None,
            custom_evaluators: Vec::new(),
            history: VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Create a scorer with an explicit pass-threshold override.
    pub fn with_threshold(threshold: f64) -> Self {
        let mut config = QualityConfig::default();
        config.thresholds = config.thresholds.with_override(threshold);
        Self::with_config(config)
    }

    /// Set the history ring-buffer capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Register a primary evaluator that can replace the built-in pass.
    pub fn set_primary_evaluator(&mut self, evaluator: Box<dyn PrimaryEvaluator>) {
        self.primary_evaluator = Some(evaluator);
    }

    /// Register an additional custom evaluator.
    pub fn add_custom_evaluator(&mut self, evaluator: Box<dyn CustomEvaluator>) {
        self.custom_evaluators.push(evaluator);
    }

    /// The thresholds in effect.
    pub fn thresholds(&self) -> QualityThresholds {
        self.config.thresholds
    }

    /// Recorded assessments, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &QualityAssessment> {
        self.history.iter()
    }

    /// Clear the assessment history.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    /// Evaluate an artifact over all built-in dimensions.
    pub fn evaluate(&mut self, artifact: &Value, context: &Value, iteration: u32) -> QualityAssessment {
        self.evaluate_selected(artifact, context, &Dimension::BUILT_IN, None, iteration)
    }

    /// Evaluate an artifact over selected dimensions with optional weight
    /// overrides for this call.
    pub fn evaluate_selected(
        &mut self,
        artifact: &Value,
        context: &Value,
        dimensions: &[Dimension],
        weights: Option<&HashMap<Dimension, f64>>,
        iteration: u32,
    ) -> QualityAssessment {
        let mut metrics = Vec::new();
        let mut improvements_override = None;
        let mut extra_metadata = Map::new();

        if let Some(primary) = &self.primary_evaluator {
            let evaluation = primary.evaluate(artifact, context, iteration);
            if !evaluation.metrics.is_empty() {
                metrics = evaluation.metrics;
                improvements_override = Some(evaluation.improvements);
                extra_metadata = evaluation.metadata;
            }
        }

        if metrics.is_empty() {
            for (dimension, evaluator) in &self.evaluators {
                if !dimensions.contains(dimension) {
                    continue;
                }
                let mut metric = evaluator(artifact, context);
                metric.weight = match weights {
                    Some(weights) => weights.get(dimension).copied().unwrap_or(0.1),
                    None => self.config.dimension_weight(*dimension),
                };
                metrics.push(metric);
            }

            if let Some(review) = review_metric_from_context(context) {
                let weight = self.config.dimension_weight(Dimension::Review);
                metrics.push(review.with_weight(weight));
            }

            for custom in &self.custom_evaluators {
                match custom.evaluate(artifact, context) {
                    Ok(Some(metric)) => metrics.push(metric),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!("Custom evaluator error: {e}");
                    }
                }
            }
        }

        let components = blend::components_from_metrics(&metrics, context);
        let blended = blend::blend(&components, self.config.component_weights);
        let overall_score = blended.overall;

        let thresholds = self.config.thresholds;
        let passed = overall_score >= thresholds.production_ready;
        let band = thresholds.classify(overall_score);

        let improvements_needed = improvements_override
            .unwrap_or_else(|| derive_improvements(&metrics, overall_score));

        let mut metadata = extra_metadata;
        record_blend_metadata(&mut metadata, &blended, &metrics);
        metadata.insert(
            "artifact_fingerprint".to_string(),
            Value::String(fingerprint(artifact)),
        );

        let assessment = QualityAssessment {
            id: format!("qa_{}", Uuid::new_v4()),
            overall_score,
            metrics,
            timestamp: Utc::now(),
            iteration,
            passed,
            threshold: thresholds.production_ready,
            band,
            improvements_needed,
            metadata,
        };

        self.push_history(assessment.clone());
        assessment
    }

    /// Evaluate, then ground the score in deterministic signals.
    ///
    /// The grounding step replaces `overall_score`/`passed`/`band`, records
    /// the adjustment detail in metadata, and prepends each hard-failure
    /// reason to the improvement list as a `FIX:` entry.
    pub fn evaluate_with_signals(
        &mut self,
        artifact: &Value,
        context: &Value,
        signals: &DeterministicSignals,
        iteration: u32,
    ) -> QualityAssessment {
        let mut assessment = self.evaluate(artifact, context, iteration);
        self.ground(&mut assessment, signals);
        assessment
    }

    /// Evaluate an execution record against its evidence snapshot.
    ///
    /// Evidence expectations are opt-in via `expects_file_changes` /
    /// `expects_tests` / `expects_execution_evidence` context flags;
    /// read-only or advisory work is never penalized for lacking them.
    pub fn evaluate_execution(
        &mut self,
        record: &Value,
        context: &Value,
        iteration: u32,
    ) -> QualityAssessment {
        let empty = Value::Object(Map::new());
        let evidence = record.get("evidence").unwrap_or(&empty);
        let signals = DeterministicSignals::from_evidence(evidence);

        let mut assessment = self.evaluate(record, context, iteration);
        let grounded = evidence.as_object().map(|m| !m.is_empty()).unwrap_or(false);
        if grounded {
            self.ground(&mut assessment, &signals);
        }

        let mut execution = Map::new();
        if let Some(agent) = record.get("agent_used") {
            execution.insert("agent_used".to_string(), agent.clone());
        }
        if let Some(confidence) = record.get("confidence") {
            execution.insert("confidence".to_string(), confidence.clone());
        }
        execution.insert(
            "evidence_summary".to_string(),
            serde_json::json!({
                "has_file_modifications": evidence_flag(evidence, "has_file_modifications"),
                "has_execution_evidence": evidence_flag(evidence, "has_execution_evidence"),
                "tests_run": evidence_flag(evidence, "tests_run"),
            }),
        );
        assessment
            .metadata
            .insert("execution".to_string(), Value::Object(execution));

        let failures = expectation_failures(evidence, context);
        if !failures.is_empty() {
            assessment.metadata.insert(
                "evidence_expectations_failed".to_string(),
                serde_json::to_value(&failures).unwrap_or(Value::Null),
            );
            for (i, failure) in failures.iter().enumerate() {
                assessment.improvements_needed.insert(i, failure.clone());
            }
        }

        // Keep the stored history copy consistent with the returned value.
        if let Some(last) = self.history.back_mut() {
            if last.id == assessment.id {
                *last = assessment.clone();
            }
        }

        assessment
    }

    /// Blend dimension scores that the caller already holds.
    ///
    /// Accepted keys: `review` (primary, with `correctness` as an alias),
    /// `completeness`, and `test_coverage`.
    pub fn calculate_score(&self, scores: &HashMap<String, f64>) -> ScoreSummary {
        let mut components = std::collections::BTreeMap::new();

        let primary = scores.get("review").or_else(|| scores.get("correctness"));
        if let Some(&score) = primary {
            components.insert(blend::COMPONENT_PRIMARY.to_string(), score);
        }
        if let Some(&score) = scores.get("completeness") {
            components.insert(blend::COMPONENT_COMPLETENESS.to_string(), score);
        }
        if let Some(&score) = scores.get("test_coverage") {
            components.insert(blend::COMPONENT_TEST_COVERAGE.to_string(), score);
        }

        let blended = blend::blend(&components, self.config.component_weights);
        let band = self.config.thresholds.classify(blended.overall);

        ScoreSummary {
            overall: (blended.overall * 100.0).round() / 100.0,
            grade: band.grade().to_string(),
            action: band.action().to_string(),
            band,
        }
    }

    /// Detailed improvement suggestions ranked by impact.
    pub fn improvement_suggestions(
        &self,
        assessment: &QualityAssessment,
    ) -> Vec<ImprovementSuggestion> {
        let mut suggestions = Vec::new();

        for metric in &assessment.metrics {
            if metric.score < 70.0 {
                for suggestion in &metric.suggestions {
                    suggestions.push(ImprovementSuggestion {
                        dimension: metric.dimension,
                        current_score: metric.score,
                        suggestion: suggestion.clone(),
                        priority: if metric.score < 50.0 {
                            "high".to_string()
                        } else {
                            "medium".to_string()
                        },
                        impact: metric.weight * (100.0 - metric.score),
                    });
                }
            }
        }

        suggestions.sort_by(|a, b| {
            b.impact
                .partial_cmp(&a.impact)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions
    }

    /// Summary statistics over the recorded history.
    pub fn metrics_summary(&self) -> Option<MetricsSummary> {
        if self.history.is_empty() {
            return None;
        }

        let scores: Vec<f64> = self.history.iter().map(|a| a.overall_score).collect();
        let passed = self.history.iter().filter(|a| a.passed).count();

        Some(MetricsSummary {
            total_assessments: scores.len(),
            average_score: scores.iter().sum::<f64>() / scores.len() as f64,
            min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            pass_rate: passed as f64 / scores.len() as f64,
        })
    }

    fn ground(&mut self, assessment: &mut QualityAssessment, signals: &DeterministicSignals) {
        let (adjusted, detail) = signals.apply(assessment.overall_score);

        assessment.overall_score = adjusted;
        assessment.passed = adjusted >= assessment.threshold;
        assessment.band = self.config.thresholds.classify(adjusted);

        for (i, reason) in detail.hard_failures.iter().enumerate() {
            assessment
                .improvements_needed
                .insert(i, format!("FIX: {reason}"));
        }

        assessment
            .metadata
            .insert("signals_grounded".to_string(), Value::Bool(true));
        assessment.metadata.insert(
            "deterministic_signals".to_string(),
            serde_json::to_value(signals).unwrap_or(Value::Null),
        );
        assessment.metadata.insert(
            "signal_adjustment".to_string(),
            serde_json::to_value(&detail).unwrap_or(Value::Null),
        );

        // Keep the stored history copy consistent with the returned value.
        if let Some(last) = self.history.back_mut() {
            if last.id == assessment.id {
                *last = assessment.clone();
            }
        }
    }

    fn push_history(&mut self, assessment: QualityAssessment) {
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(assessment);
    }
}

/// Compare two assessments to track iteration progress.
pub fn compare_assessments(
    current: &QualityAssessment,
    previous: &QualityAssessment,
) -> AssessmentComparison {
    let delta = current.overall_score - previous.overall_score;

    AssessmentComparison {
        score_delta: (delta * 10.0).round() / 10.0,
        improved: delta > 0.0,
        regressed: delta < 0.0,
        stagnant: delta.abs() < 2.0,
        current_band: current.band,
        previous_band: previous.band,
        band_changed: current.band != previous.band,
    }
}

/// Identify the key improvements: the top suggestions from the three worst
/// dimensions below 70, plus a generic hint when the overall score is low.
fn derive_improvements(metrics: &[QualityMetric], overall_score: f64) -> Vec<String> {
    let mut improvements = Vec::new();

    let mut sorted: Vec<&QualityMetric> = metrics.iter().collect();
    sorted.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for metric in sorted.iter().take(3) {
        if metric.score < 70.0 {
            for suggestion in metric.suggestions.iter().take(2) {
                improvements.push(format!("{}: {}", metric.dimension.as_str(), suggestion));
            }
        }
    }

    if overall_score < 50.0 {
        improvements.push("Major refactoring needed".to_string());
    } else if overall_score < 70.0 {
        improvements.push("Address critical issues first".to_string());
    }

    improvements
}

fn record_blend_metadata(metadata: &mut Map<String, Value>, blended: &Blended, metrics: &[QualityMetric]) {
    metadata.insert(
        "blend".to_string(),
        serde_json::to_value(blended).unwrap_or(Value::Null),
    );
    let applied: Map<String, Value> = metrics
        .iter()
        .map(|m| {
            (
                m.dimension.as_str().to_string(),
                serde_json::json!(m.weight),
            )
        })
        .collect();
    metadata.insert("applied_weights".to_string(), Value::Object(applied));
}

/// Read an external-review metric from the context, when present.
///
/// Accepts `review: { score, issues?, suggestions? }` or a bare
/// `review_score` number.
fn review_metric_from_context(context: &Value) -> Option<QualityMetric> {
    if let Some(review) = context.get("review").and_then(Value::as_object) {
        let score = review.get("score")?.as_f64()?;
        let mut metric = QualityMetric::new(Dimension::Review, score, "External review score");
        if let Some(issues) = review.get("issues").and_then(Value::as_array) {
            metric.issues = issues
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
        }
        if let Some(suggestions) = review.get("suggestions").and_then(Value::as_array) {
            metric.suggestions = suggestions
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
        }
        return Some(metric);
    }

    let score = context.get("review_score")?.as_f64()?;
    Some(QualityMetric::new(
        Dimension::Review,
        score,
        "External review score",
    ))
}

fn evidence_flag(evidence: &Value, key: &str) -> bool {
    evidence.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn expectation_failures(evidence: &Value, context: &Value) -> Vec<String> {
    let expects = |key: &str| context.get(key).and_then(Value::as_bool).unwrap_or(false);
    let mut failures = Vec::new();

    if expects("expects_file_changes") && !evidence_flag(evidence, "has_file_modifications") {
        failures.push(
            "MISSING_FILE_CHANGES: file modifications were expected but none were recorded"
                .to_string(),
        );
    }
    if expects("expects_tests") && !evidence_flag(evidence, "tests_run") {
        failures.push("NO_TESTS_RUN: test execution was expected but not observed".to_string());
    }
    if expects("expects_execution_evidence") && !evidence_flag(evidence, "has_execution_evidence") {
        failures.push(
            "NO_EXECUTION_EVIDENCE: execution evidence was expected but none was captured"
                .to_string(),
        );
    }

    failures
}

fn fingerprint(artifact: &Value) -> String {
    let rendered = artifact.to_string();
    blake3::hash(rendered.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evidenced_artifact() -> Value {
        json!({
            "success": true,
            "files_modified": ["src/lib.rs"],
        })
    }

    #[test]
    fn evaluate_produces_all_built_in_metrics() {
        let mut scorer = QualityScorer::new();

        let assessment = scorer.evaluate(&evidenced_artifact(), &json!({}), 0);

        assert_eq!(assessment.metrics.len(), 8);
        assert!(assessment.id.starts_with("qa_"));
        assert!((0.0..=100.0).contains(&assessment.overall_score));
        assert_eq!(scorer.history().count(), 1);
    }

    #[test]
    fn evaluate_is_idempotent_excluding_timestamp() {
        let mut scorer = QualityScorer::new();
        let artifact = evidenced_artifact();
        let context = json!({ "test_results": { "pass_rate": 0.8 } });

        let first = scorer.evaluate(&artifact, &context, 0);
        let second = scorer.evaluate(&artifact, &context, 0);

        assert_eq!(first.overall_score, second.overall_score);
        assert_eq!(first.band, second.band);
        assert_eq!(first.improvements_needed, second.improvements_needed);
    }

    #[test]
    fn declared_success_without_evidence_scores_low_on_correctness() {
        let mut scorer = QualityScorer::new();

        let assessment = scorer.evaluate(&json!({ "success": true }), &json!({}), 0);

        let correctness = assessment
            .metrics
            .iter()
            .find(|m| m.dimension == Dimension::Correctness)
            .expect("correctness metric");
        assert!(correctness.score <= 40.0);
        assert!(correctness
            .issues
            .iter()
            .any(|i| i.contains("execution evidence")));
    }

    #[test]
    fn review_score_in_context_becomes_the_primary_component() {
        let mut scorer = QualityScorer::new();
        let context = json!({ "review": { "score": 95.0 } });

        let assessment = scorer.evaluate(&evidenced_artifact(), &context, 0);

        let blend_meta = assessment.metadata.get("blend").expect("blend metadata");
        let primary = blend_meta
            .get("components")
            .and_then(|c| c.get("primary"))
            .and_then(Value::as_f64)
            .expect("primary component");
        assert_eq!(primary, 95.0);
    }

    #[derive(Debug)]
    struct FixedPrimary;

    impl PrimaryEvaluator for FixedPrimary {
        fn evaluate(&self, _artifact: &Value, _context: &Value, _iteration: u32) -> PrimaryEvaluation {
            let mut metadata = Map::new();
            metadata.insert("pipeline".to_string(), json!("domain-specific"));
            PrimaryEvaluation {
                metrics: vec![
                    QualityMetric::new(Dimension::Review, 96.0, "external judge"),
                    QualityMetric::new(Dimension::Completeness, 94.0, "external judge"),
                ],
                improvements: vec!["polish the docs".to_string()],
                metadata,
            }
        }
    }

    #[test]
    fn primary_evaluator_replaces_the_built_in_pass() {
        let mut scorer = QualityScorer::new();
        scorer.set_primary_evaluator(Box::new(FixedPrimary));

        let assessment = scorer.evaluate(&json!({ "success": true }), &json!({}), 0);

        assert_eq!(assessment.metrics.len(), 2);
        assert_eq!(assessment.improvements_needed, vec!["polish the docs"]);
        assert_eq!(
            assessment.metadata.get("pipeline"),
            Some(&json!("domain-specific"))
        );
    }

    #[derive(Debug)]
    struct EmptyPrimary;

    impl PrimaryEvaluator for EmptyPrimary {
        fn evaluate(&self, _artifact: &Value, _context: &Value, _iteration: u32) -> PrimaryEvaluation {
            PrimaryEvaluation::default()
        }
    }

    #[test]
    fn empty_primary_evaluation_falls_back_to_built_ins() {
        let mut scorer = QualityScorer::new();
        scorer.set_primary_evaluator(Box::new(EmptyPrimary));

        let assessment = scorer.evaluate(&evidenced_artifact(), &json!({}), 0);

        assert_eq!(assessment.metrics.len(), 8);
    }

    #[derive(Debug)]
    struct FailingCustom;

    impl CustomEvaluator for FailingCustom {
        fn evaluate(&self, _artifact: &Value, _context: &Value) -> Result<Option<QualityMetric>> {
            Err(crate::error::AssayError::Evaluator {
                dimension: "custom".to_string(),
                message: "intentional failure".to_string(),
            })
        }
    }

    #[test]
    fn failing_custom_evaluator_is_skipped() {
        let mut scorer = QualityScorer::new();
        scorer.add_custom_evaluator(Box::new(FailingCustom));

        let assessment = scorer.evaluate(&evidenced_artifact(), &json!({}), 0);

        assert_eq!(assessment.metrics.len(), 8);
    }

    #[test]
    fn calculate_score_exposes_band_grade_and_action() {
        let scorer = QualityScorer::new();
        let scores: HashMap<String, f64> = [
            ("review".to_string(), 95.0),
            ("completeness".to_string(), 93.0),
            ("test_coverage".to_string(), 97.0),
        ]
        .into();

        let summary = scorer.calculate_score(&scores);

        assert_eq!(summary.band, Band::ProductionReady);
        assert_eq!(summary.grade, "Excellent");
        assert_eq!(summary.action, "Auto-approve");
        let expected = 95.0 * 0.6 + 93.0 * 0.25 + 97.0 * 0.15;
        assert!((summary.overall - expected).abs() < 0.01);
    }

    #[test]
    fn calculate_score_accepts_correctness_as_primary_alias() {
        let scorer = QualityScorer::new();
        let scores: HashMap<String, f64> = [("correctness".to_string(), 60.0)].into();

        let summary = scorer.calculate_score(&scores);

        assert_eq!(summary.band, Band::Iterate);
        assert_eq!(summary.grade, "Rework");
        assert_eq!(
            summary.action,
            "Iterate with assigned specialist agent"
        );
    }

    #[test]
    fn calculate_score_with_no_known_keys_is_zero() {
        let scorer = QualityScorer::new();
        let scores: HashMap<String, f64> = [("charisma".to_string(), 99.0)].into();

        let summary = scorer.calculate_score(&scores);

        assert_eq!(summary.overall, 0.0);
        assert_eq!(summary.band, Band::Iterate);
    }

    #[test]
    fn grounding_records_metadata_and_fix_entries() {
        let mut scorer = QualityScorer::new();
        let signals = DeterministicSignals {
            tests_total: 10,
            tests_failed: 3,
            ..Default::default()
        };

        let assessment =
            scorer.evaluate_with_signals(&evidenced_artifact(), &json!({}), &signals, 0);

        assert!(assessment.overall_score <= 50.0);
        assert_eq!(
            assessment.metadata.get("signals_grounded"),
            Some(&Value::Bool(true))
        );
        assert!(assessment.metadata.contains_key("deterministic_signals"));
        assert!(assessment
            .improvements_needed
            .iter()
            .any(|i| i.starts_with("FIX:")));
        assert!(assessment.improvements_needed[0].starts_with("FIX:"));
    }

    #[test]
    fn grounding_updates_the_history_copy() {
        let mut scorer = QualityScorer::new();
        let signals = DeterministicSignals {
            security_critical: 1,
            ..Default::default()
        };

        let assessment =
            scorer.evaluate_with_signals(&evidenced_artifact(), &json!({}), &signals, 0);

        assert_eq!(assessment.overall_score, 30.0);
        let stored = scorer.history().last().expect("history entry");
        assert_eq!(stored.overall_score, 30.0);
    }

    #[test]
    fn execution_evaluation_records_agent_metadata() {
        let mut scorer = QualityScorer::new();
        let record = json!({
            "result": { "status": "completed" },
            "success": true,
            "evidence": {
                "has_file_modifications": true,
                "has_execution_evidence": true,
                "tests_run": true,
                "test_passed": 10,
                "test_failed": 0,
            },
            "agent_used": "code-agent",
            "confidence": 0.9,
        });

        let assessment = scorer.evaluate_execution(&record, &json!({}), 0);

        assert_eq!(
            assessment.metadata.get("signals_grounded"),
            Some(&Value::Bool(true))
        );
        let execution = assessment.metadata.get("execution").expect("execution");
        assert_eq!(execution.get("agent_used"), Some(&json!("code-agent")));
        let summary = execution.get("evidence_summary").expect("summary");
        assert_eq!(summary.get("tests_run"), Some(&json!(true)));
    }

    #[test]
    fn expectations_are_not_checked_without_opt_in() {
        let mut scorer = QualityScorer::new();
        let record = json!({
            "success": true,
            "evidence": {
                "has_file_modifications": false,
                "has_execution_evidence": false,
            },
        });

        let assessment = scorer.evaluate_execution(&record, &json!({}), 0);

        assert!(!assessment
            .metadata
            .contains_key("evidence_expectations_failed"));
        assert!(!assessment
            .improvements_needed
            .iter()
            .any(|i| i.contains("MISSING_FILE_CHANGES")));
    }

    #[test]
    fn expectations_are_checked_when_opted_in() {
        let mut scorer = QualityScorer::new();
        let record = json!({
            "success": true,
            "evidence": {
                "has_file_modifications": false,
                "has_execution_evidence": false,
                "tests_run": false,
            },
        });
        let context = json!({
            "expects_file_changes": true,
            "expects_tests": true,
        });

        let assessment = scorer.evaluate_execution(&record, &context, 0);

        let failures = assessment
            .metadata
            .get("evidence_expectations_failed")
            .and_then(Value::as_array)
            .expect("failures recorded");
        assert_eq!(failures.len(), 2);
        assert!(assessment.improvements_needed[0].contains("MISSING_FILE_CHANGES"));
        assert!(assessment.improvements_needed[1].contains("NO_TESTS_RUN"));
    }

    #[test]
    fn met_expectations_add_no_failures() {
        let mut scorer = QualityScorer::new();
        let record = json!({
            "success": true,
            "evidence": {
                "has_file_modifications": true,
                "has_execution_evidence": true,
                "tests_run": true,
            },
        });
        let context = json!({
            "expects_file_changes": true,
            "expects_tests": true,
            "expects_execution_evidence": true,
        });

        let assessment = scorer.evaluate_execution(&record, &context, 0);

        assert!(!assessment
            .metadata
            .contains_key("evidence_expectations_failed"));
    }

    #[test]
    fn execution_test_failures_cap_the_score() {
        let mut scorer = QualityScorer::new();
        let record = json!({
            "result": { "status": "completed" },
            "success": true,
            "evidence": {
                "tests_run": true,
                "test_passed": 5,
                "test_failed": 5,
            },
        });

        let assessment = scorer.evaluate_execution(&record, &json!({}), 0);

        assert!(assessment.overall_score <= 50.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut scorer = QualityScorer::new().with_history_capacity(3);

        for i in 0..10 {
            scorer.evaluate(&json!({ "run": i }), &json!({}), i);
        }

        assert_eq!(scorer.history().count(), 3);
    }

    #[test]
    fn metrics_summary_aggregates_history() {
        let mut scorer = QualityScorer::new();
        assert!(scorer.metrics_summary().is_none());

        scorer.evaluate(&evidenced_artifact(), &json!({}), 0);
        scorer.evaluate(&json!({ "success": true }), &json!({}), 1);

        let summary = scorer.metrics_summary().expect("summary");
        assert_eq!(summary.total_assessments, 2);
        assert!(summary.min_score <= summary.max_score);
        assert!(summary.average_score >= summary.min_score);
    }

    #[test]
    fn reset_history_clears_assessments() {
        let mut scorer = QualityScorer::new();
        scorer.evaluate(&evidenced_artifact(), &json!({}), 0);

        scorer.reset_history();

        assert_eq!(scorer.history().count(), 0);
        assert!(scorer.metrics_summary().is_none());
    }

    #[test]
    fn improvement_suggestions_rank_by_impact() {
        let mut scorer = QualityScorer::new();
        let artifact = json!({
            "success": true,
            "code": "result = eval(payload)",
        });

        let assessment = scorer.evaluate(&artifact, &json!({}), 0);
        let suggestions = scorer.improvement_suggestions(&assessment);

        assert!(!suggestions.is_empty());
        for pair in suggestions.windows(2) {
            assert!(pair[0].impact >= pair[1].impact);
        }
    }

    #[test]
    fn low_overall_scores_add_generic_improvements() {
        let mut scorer = QualityScorer::new();

        let assessment = scorer.evaluate(&json!({ "success": true }), &json!({}), 0);

        assert!(assessment.overall_score < 70.0);
        assert!(assessment
            .improvements_needed
            .iter()
            .any(|i| i == "Major refactoring needed" || i == "Address critical issues first"));
    }

    #[test]
    fn compare_assessments_tracks_progress() {
        let mut scorer = QualityScorer::with_threshold(70.0);
        let low = scorer.evaluate(&json!({ "success": true }), &json!({}), 0);
        let high = scorer.evaluate(
            &evidenced_artifact(),
            &json!({ "test_results": { "pass_rate": 1.0, "passed": true } }),
            1,
        );

        let comparison = compare_assessments(&high, &low);

        assert!(comparison.improved);
        assert!(!comparison.regressed);
        assert_eq!(comparison.previous_band, low.band);
        assert_eq!(comparison.current_band, high.band);
    }
}
