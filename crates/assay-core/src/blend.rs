//! Score Blender - Weighted combination of the named score components
//!
//! The overall score blends exactly three components: a primary
//! correctness-like score (external review when present, correctness
//! otherwise), a completeness score, and a test-coverage score. Weights
//! renormalize over whichever components are actually present, so a missing
//! component redistributes its weight instead of dragging the score to zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dimensions::{Dimension, QualityMetric};

/// Component name for the primary correctness-like score.
pub const COMPONENT_PRIMARY: &str = "primary";
/// Component name for the completeness score.
pub const COMPONENT_COMPLETENESS: &str = "completeness";
/// Component name for the test-coverage score.
pub const COMPONENT_TEST_COVERAGE: &str = "test_coverage";

/// Relative weights for the three blend components.
///
/// Values are clamped non-negative and renormalized over the components
/// present for a given call, so they only need to be relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWeights {
    /// Weight of the primary correctness-like component
    pub primary: f64,
    /// Weight of the completeness component
    pub completeness: f64,
    /// Weight of the test-coverage component
    pub test_coverage: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            primary: 0.6,
            completeness: 0.25,
            test_coverage: 0.15,
        }
    }
}

impl ComponentWeights {
    fn clamped(self) -> Self {
        Self {
            primary: self.primary.max(0.0),
            completeness: self.completeness.max(0.0),
            test_coverage: self.test_coverage.max(0.0),
        }
    }
}

/// The blended overall score with its applied (renormalized) weights.
///
/// An empty `weights` map means no component was available: the score is 0
/// and should be read as "cannot assess", not as a terrible artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blended {
    /// Overall score in 0-100
    pub overall: f64,
    /// Raw component scores that participated
    pub components: BTreeMap<String, f64>,
    /// Renormalized weights actually applied (sums to 1 when non-empty)
    pub weights: BTreeMap<String, f64>,
}

/// Blend the available components into one overall score.
pub fn blend(components: &BTreeMap<String, f64>, weights: ComponentWeights) -> Blended {
    let weights = weights.clamped();
    let configured = [
        (COMPONENT_PRIMARY, weights.primary),
        (COMPONENT_COMPLETENESS, weights.completeness),
        (COMPONENT_TEST_COVERAGE, weights.test_coverage),
    ];

    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    let mut present: Vec<(&str, f64, f64)> = Vec::new();

    for (name, weight) in configured {
        if let Some(&score) = components.get(name) {
            let score = score.clamp(0.0, 100.0);
            weighted_sum += score * weight;
            total_weight += weight;
            present.push((name, score, weight));
        }
    }

    if total_weight <= 0.0 {
        return Blended {
            overall: 0.0,
            components: components.clone(),
            weights: BTreeMap::new(),
        };
    }

    let overall = (weighted_sum / total_weight).clamp(0.0, 100.0);
    let normalized = present
        .iter()
        .map(|(name, _, weight)| ((*name).to_string(), weight / total_weight))
        .collect();

    Blended {
        overall,
        components: present
            .iter()
            .map(|(name, score, _)| ((*name).to_string(), *score))
            .collect(),
        weights: normalized,
    }
}

/// Extract the three blend components from evaluated metrics and context.
///
/// Fallback order for each component:
/// - primary: Review metric, else Correctness metric
/// - completeness: Completeness metric
/// - test_coverage: Testability metric, else raw context coverage
///   percentage, else pass rate scaled to 0-100
pub fn components_from_metrics(metrics: &[QualityMetric], context: &Value) -> BTreeMap<String, f64> {
    let mut components = BTreeMap::new();

    let metric_score = |dimension: Dimension| -> Option<f64> {
        metrics
            .iter()
            .find(|m| m.dimension == dimension)
            .map(|m| m.score)
    };

    if let Some(primary) = metric_score(Dimension::Review).or_else(|| metric_score(Dimension::Correctness)) {
        components.insert(COMPONENT_PRIMARY.to_string(), primary);
    }

    if let Some(completeness) = metric_score(Dimension::Completeness) {
        components.insert(COMPONENT_COMPLETENESS.to_string(), completeness);
    }

    let coverage = metric_score(Dimension::Testability)
        .or_else(|| coverage_percent_from_context(context))
        .or_else(|| pass_rate_percent_from_context(context));
    if let Some(coverage) = coverage {
        components.insert(COMPONENT_TEST_COVERAGE.to_string(), coverage);
    }

    components
}

fn coverage_percent_from_context(context: &Value) -> Option<f64> {
    let coverage = context.get("test_results")?.get("coverage")?.as_f64()?;
    if (0.0..=1.0).contains(&coverage) {
        Some(coverage * 100.0)
    } else {
        Some(coverage.clamp(0.0, 100.0))
    }
}

fn pass_rate_percent_from_context(context: &Value) -> Option<f64> {
    let pass_rate = context.get("test_results")?.get("pass_rate")?.as_f64()?;
    Some((pass_rate * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn component_map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(name, score)| ((*name).to_string(), *score))
            .collect()
    }

    #[test]
    fn blends_all_three_components_with_default_weights() {
        let components = component_map(&[
            (COMPONENT_PRIMARY, 95.0),
            (COMPONENT_COMPLETENESS, 93.0),
            (COMPONENT_TEST_COVERAGE, 97.0),
        ]);

        let blended = blend(&components, ComponentWeights::default());

        let expected = 95.0 * 0.6 + 93.0 * 0.25 + 97.0 * 0.15;
        assert!((blended.overall - expected).abs() < 1e-9);
        assert!((blended.weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn renormalizes_when_a_component_is_missing() {
        let components = component_map(&[
            (COMPONENT_PRIMARY, 80.0),
            (COMPONENT_TEST_COVERAGE, 60.0),
        ]);

        let blended = blend(&components, ComponentWeights::default());

        let expected = (80.0 * 0.6 + 60.0 * 0.15) / (0.6 + 0.15);
        assert!((blended.overall - expected).abs() < 1e-9);
        assert!(!blended.weights.contains_key(COMPONENT_COMPLETENESS));
        assert!((blended.weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_components_mean_cannot_assess() {
        let blended = blend(&BTreeMap::new(), ComponentWeights::default());

        assert_eq!(blended.overall, 0.0);
        assert!(blended.weights.is_empty());
    }

    #[test]
    fn negative_weights_are_clamped() {
        let components = component_map(&[
            (COMPONENT_PRIMARY, 90.0),
            (COMPONENT_COMPLETENESS, 10.0),
        ]);
        let weights = ComponentWeights {
            primary: 1.0,
            completeness: -5.0,
            test_coverage: 0.0,
        };

        let blended = blend(&components, weights);

        assert!((blended.overall - 90.0).abs() < 1e-9);
    }

    #[test]
    fn component_scores_are_clamped_into_range() {
        let components = component_map(&[(COMPONENT_PRIMARY, 250.0)]);

        let blended = blend(&components, ComponentWeights::default());

        assert_eq!(blended.overall, 100.0);
    }

    #[test]
    fn primary_prefers_review_over_correctness() {
        let metrics = vec![
            QualityMetric::new(Dimension::Correctness, 70.0, "correctness"),
            QualityMetric::new(Dimension::Review, 88.0, "review"),
        ];

        let components = components_from_metrics(&metrics, &json!({}));

        assert_eq!(components.get(COMPONENT_PRIMARY), Some(&88.0));
    }

    #[test]
    fn coverage_falls_back_to_context_percentages() {
        let metrics = vec![QualityMetric::new(Dimension::Correctness, 70.0, "c")];

        let from_coverage = components_from_metrics(
            &metrics,
            &json!({ "test_results": { "coverage": 0.85 } }),
        );
        assert_eq!(from_coverage.get(COMPONENT_TEST_COVERAGE), Some(&85.0));

        let from_pass_rate = components_from_metrics(
            &metrics,
            &json!({ "test_results": { "pass_rate": 0.9 } }),
        );
        assert_eq!(from_pass_rate.get(COMPONENT_TEST_COVERAGE), Some(&90.0));
    }

    #[test]
    fn testability_metric_wins_over_context_coverage() {
        let metrics = vec![QualityMetric::new(Dimension::Testability, 55.0, "t")];

        let components = components_from_metrics(
            &metrics,
            &json!({ "test_results": { "coverage": 0.99 } }),
        );

        assert_eq!(components.get(COMPONENT_TEST_COVERAGE), Some(&55.0));
    }
}
