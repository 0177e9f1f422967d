//! Improvement Loop - Bounded, safety-limited iterative refinement
//!
//! The loop repeatedly evaluates an artifact and asks an externally supplied
//! improver to revise it until the quality threshold is met or a stop
//! condition fires. Four independent stop conditions (threshold met, max
//! iterations, oscillation, stagnation) plus a best-effort wall-clock
//! timeout guarantee the loop always terminates with a specific, reported
//! reason. The timeout is polled between steps only; it never interrupts an
//! in-flight evaluation or improver call.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scorer::{QualityAssessment, QualityScorer};

/// Default number of improvement iterations.
pub const MAX_ITERATIONS: u32 = 3;
/// Absolute iteration ceiling; requests above it are capped, never honored.
pub const HARD_MAX_ITERATIONS: u32 = 5;
/// Minimum per-iteration score improvement to keep going.
pub const MIN_IMPROVEMENT: f64 = 5.0;
/// Scores within this distance count as "not moving".
pub const STAGNATION_THRESHOLD: f64 = 2.0;
/// Number of trailing scores examined for oscillation/stagnation.
pub const OSCILLATION_WINDOW: usize = 3;

/// Why the loop stopped.
///
/// Only `Error` is a failure. The convergence reasons (insufficient
/// improvement, stagnation, oscillation, max iterations, timeout) are
/// successful exits from a converged-but-below-threshold state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The assessment passed the quality threshold
    QualityMet,
    /// The iteration ceiling was reached
    MaxIterations,
    /// The score improved by less than the minimum
    InsufficientImprovement,
    /// Trailing scores stopped moving
    Stagnation,
    /// Trailing scores alternated up and down
    Oscillation,
    /// The wall-clock budget expired
    Timeout,
    /// The improver failed
    Error,
}

impl TerminationReason {
    /// Snake-case name of this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::QualityMet => "quality_met",
            TerminationReason::MaxIterations => "max_iterations",
            TerminationReason::InsufficientImprovement => "insufficient_improvement",
            TerminationReason::Stagnation => "stagnation",
            TerminationReason::Oscillation => "oscillation",
            TerminationReason::Timeout => "timeout",
            TerminationReason::Error => "error",
        }
    }

    /// True only for the `Error` reason.
    pub fn is_error(&self) -> bool {
        matches!(self, TerminationReason::Error)
    }
}

/// Record of one loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    /// Iteration index (0-based)
    pub iteration: u32,
    /// Score the iteration started from
    pub input_quality: f64,
    /// Score after this iteration (reconciled to the final evaluation for
    /// the last record)
    pub output_quality: f64,
    /// Improvements handed to the improver (top 5)
    pub improvements_applied: Vec<String>,
    /// Seconds spent in this iteration, per the loop clock
    pub time_taken: f64,
    /// Whether the iteration reached a passing score
    pub success: bool,
    /// Terminal reason, `None` while the loop continued past this iteration
    pub termination_reason: Option<TerminationReason>,
}

/// Externally supplied improver: produces a revised artifact.
///
/// Must be a pure transformation from the loop's point of view: same
/// artifact type in and out. Any error terminates the loop with
/// [`TerminationReason::Error`].
pub trait Improver {
    /// Produce an improved artifact from the current one.
    fn improve(&mut self, artifact: &Value, context: &Value) -> anyhow::Result<Value>;
}

impl<F> Improver for F
where
    F: FnMut(&Value, &Value) -> anyhow::Result<Value>,
{
    fn improve(&mut self, artifact: &Value, context: &Value) -> anyhow::Result<Value> {
        self(artifact, context)
    }
}

/// Monotonic clock returning seconds. Injectable for deterministic tests.
pub type Clock = Box<dyn FnMut() -> f64 + Send>;

/// Loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Requested iteration count (capped at [`HARD_MAX_ITERATIONS`])
    pub max_iterations: u32,
    /// Minimum score improvement to continue
    pub min_improvement: f64,
    /// Wall-clock budget in seconds; `None` disables the timeout
    pub timeout_seconds: Option<f64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            min_improvement: MIN_IMPROVEMENT,
            timeout_seconds: None,
        }
    }
}

impl LoopConfig {
    /// Set the requested iteration count.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the minimum improvement.
    pub fn with_min_improvement(mut self, min_improvement: f64) -> Self {
        self.min_improvement = min_improvement;
        self
    }

    /// Set the wall-clock budget.
    pub fn with_timeout(mut self, timeout_seconds: f64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }
}

/// Result of a loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOutcome {
    /// The final artifact (last safely adopted revision)
    pub artifact: Value,
    /// Final evaluation of that artifact
    pub assessment: QualityAssessment,
    /// Per-iteration records, at most `min(requested, HARD_MAX_ITERATIONS)`
    pub iterations: Vec<IterationResult>,
    /// Why the loop stopped
    pub termination_reason: TerminationReason,
}

/// The iteration controller.
///
/// Owns a [`QualityScorer`] and drives evaluate -> stop-check -> improve
/// cycles. Single-threaded and synchronous; each `run` call owns its own
/// score history and iteration state.
pub struct ImprovementLoop {
    scorer: QualityScorer,
    config: LoopConfig,
    clock: Clock,
}

impl std::fmt::Debug for ImprovementLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImprovementLoop")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImprovementLoop {
    /// Create a loop around a scorer with the default configuration and a
    /// real monotonic clock.
    pub fn new(scorer: QualityScorer) -> Self {
        let start = std::time::Instant::now();
        Self {
            scorer,
            config: LoopConfig::default(),
            clock: Box::new(move || start.elapsed().as_secs_f64()),
        }
    }

    /// Replace the loop configuration.
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a clock. Must be monotonic.
    ///
    /// The clock is sampled in a fixed order: once at loop start, then per
    /// iteration at the top, after the evaluation, and after the improver
    /// returns. Scripted clocks in tests rely on this order.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Access the owned scorer.
    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    /// Consume the loop, returning the owned scorer.
    pub fn into_scorer(self) -> QualityScorer {
        self.scorer
    }

    /// Run the improvement loop on an artifact.
    pub fn run<I: Improver>(
        &mut self,
        initial: Value,
        context: &Value,
        improver: &mut I,
    ) -> LoopOutcome {
        let effective_max = if self.config.max_iterations > HARD_MAX_ITERATIONS {
            tracing::warn!(
                "Requested {} iterations exceeds the hard ceiling of {}; capping",
                self.config.max_iterations,
                HARD_MAX_ITERATIONS
            );
            HARD_MAX_ITERATIONS
        } else {
            self.config.max_iterations
        };
        let min_improvement = self.config.min_improvement;

        let mut current = initial;
        let mut results: Vec<IterationResult> = Vec::new();
        let mut score_history: Vec<f64> = Vec::new();
        let mut previous_score = 0.0;
        let mut termination: Option<TerminationReason> = None;

        let loop_start = (self.clock)();

        for iteration in 0..effective_max {
            let iteration_start = (self.clock)();
            if self.deadline_exceeded(loop_start, iteration_start) {
                // Not yet scored; this iteration is discarded entirely.
                tracing::info!("Timeout before iteration {iteration} started");
                termination = Some(TerminationReason::Timeout);
                break;
            }

            let assessment = self.scorer.evaluate(&current, context, iteration);
            let current_score = assessment.overall_score;
            score_history.push(current_score);

            let after_evaluate = (self.clock)();
            if self.deadline_exceeded(loop_start, after_evaluate) {
                // Scored but out of budget: keep the evaluation, skip the rest.
                tracing::info!("Timeout after scoring iteration {iteration}");
                results.push(IterationResult {
                    iteration,
                    input_quality: previous_score,
                    output_quality: current_score,
                    improvements_applied: Vec::new(),
                    time_taken: after_evaluate - iteration_start,
                    success: false,
                    termination_reason: Some(TerminationReason::Timeout),
                });
                termination = Some(TerminationReason::Timeout);
                break;
            }

            if assessment.passed {
                tracing::info!(
                    "Quality threshold met at iteration {iteration}: {current_score:.1}"
                );
                results.push(IterationResult {
                    iteration,
                    input_quality: previous_score,
                    output_quality: current_score,
                    improvements_applied: Vec::new(),
                    time_taken: after_evaluate - iteration_start,
                    success: true,
                    termination_reason: Some(TerminationReason::QualityMet),
                });
                termination = Some(TerminationReason::QualityMet);
                break;
            }

            if detect_oscillation(&score_history) {
                tracing::info!("Oscillating scores detected at iteration {iteration}");
                results.push(IterationResult {
                    iteration,
                    input_quality: previous_score,
                    output_quality: current_score,
                    improvements_applied: Vec::new(),
                    time_taken: after_evaluate - iteration_start,
                    success: false,
                    termination_reason: Some(TerminationReason::Oscillation),
                });
                termination = Some(TerminationReason::Oscillation);
                break;
            }

            if detect_stagnation(&score_history) {
                tracing::info!("Stagnating scores detected at iteration {iteration}");
                results.push(IterationResult {
                    iteration,
                    input_quality: previous_score,
                    output_quality: current_score,
                    improvements_applied: Vec::new(),
                    time_taken: after_evaluate - iteration_start,
                    success: false,
                    termination_reason: Some(TerminationReason::Stagnation),
                });
                termination = Some(TerminationReason::Stagnation);
                break;
            }

            if iteration > 0 && (current_score - previous_score) < min_improvement {
                tracing::info!(
                    "Insufficient improvement ({:.1}) at iteration {iteration}",
                    current_score - previous_score
                );
                results.push(IterationResult {
                    iteration,
                    input_quality: previous_score,
                    output_quality: current_score,
                    improvements_applied: Vec::new(),
                    time_taken: after_evaluate - iteration_start,
                    success: false,
                    termination_reason: Some(TerminationReason::InsufficientImprovement),
                });
                termination = Some(TerminationReason::InsufficientImprovement);
                break;
            }

            let loop_context = improver_context(
                context,
                &assessment,
                current_score,
                self.scorer.thresholds().production_ready,
                iteration,
                effective_max,
            );
            let improvements_applied: Vec<String> = assessment
                .improvements_needed
                .iter()
                .take(5)
                .cloned()
                .collect();

            match improver.improve(&current, &loop_context) {
                Ok(improved) => {
                    let after_improve = (self.clock)();
                    if self.deadline_exceeded(loop_start, after_improve) {
                        // Never adopt an improvement produced after the time
                        // budget expired; keep the prior artifact.
                        tracing::info!(
                            "Timeout after improver at iteration {iteration}; discarding output"
                        );
                        results.push(IterationResult {
                            iteration,
                            input_quality: current_score,
                            output_quality: 0.0,
                            improvements_applied,
                            time_taken: after_improve - iteration_start,
                            success: false,
                            termination_reason: Some(TerminationReason::Timeout),
                        });
                        termination = Some(TerminationReason::Timeout);
                        break;
                    }

                    results.push(IterationResult {
                        iteration,
                        input_quality: current_score,
                        output_quality: 0.0,
                        improvements_applied,
                        time_taken: after_improve - iteration_start,
                        success: false,
                        termination_reason: None,
                    });
                    current = improved;
                    previous_score = current_score;
                }
                Err(e) => {
                    tracing::error!("Improver error at iteration {iteration}: {e}");
                    results.push(IterationResult {
                        iteration,
                        input_quality: current_score,
                        output_quality: 0.0,
                        improvements_applied,
                        time_taken: after_evaluate - iteration_start,
                        success: false,
                        termination_reason: Some(TerminationReason::Error),
                    });
                    termination = Some(TerminationReason::Error);
                    break;
                }
            }
        }

        let termination = termination.unwrap_or(TerminationReason::MaxIterations);

        // One final evaluation of whatever artifact is current, always.
        let final_assessment = self
            .scorer
            .evaluate(&current, context, results.len() as u32);

        if let Some(last) = results.last_mut() {
            last.output_quality = final_assessment.overall_score;
            last.success = final_assessment.passed;
            if last.termination_reason.is_none() {
                last.termination_reason = Some(termination);
            }
        }

        LoopOutcome {
            artifact: current,
            assessment: final_assessment,
            iterations: results,
            termination_reason: termination,
        }
    }

    fn deadline_exceeded(&self, loop_start: f64, now: f64) -> bool {
        match self.config.timeout_seconds {
            Some(timeout) => now - loop_start >= timeout,
            None => false,
        }
    }
}

/// Trailing scores alternate strictly up/down with each step larger than the
/// stagnation threshold.
pub fn detect_oscillation(score_history: &[f64]) -> bool {
    if score_history.len() < OSCILLATION_WINDOW {
        return false;
    }

    let window = &score_history[score_history.len() - OSCILLATION_WINDOW..];
    let deltas: Vec<f64> = window.iter().tuple_windows().map(|(a, b)| b - a).collect();

    deltas.iter().all(|d| d.abs() > STAGNATION_THRESHOLD)
        && deltas.windows(2).all(|pair| pair[0] * pair[1] < 0.0)
}

/// Trailing scores all lie within the stagnation threshold of each other.
pub fn detect_stagnation(score_history: &[f64]) -> bool {
    if score_history.len() < OSCILLATION_WINDOW {
        return false;
    }

    let window = &score_history[score_history.len() - OSCILLATION_WINDOW..];
    match window.iter().copied().minmax().into_option() {
        Some((min, max)) => max - min <= STAGNATION_THRESHOLD,
        None => false,
    }
}

/// Build the context handed to the improver: the caller's context merged
/// with the assessment and loop progress fields.
fn improver_context(
    context: &Value,
    assessment: &QualityAssessment,
    current_score: f64,
    target_score: f64,
    iteration: u32,
    max_iterations: u32,
) -> Value {
    let mut merged: Map<String, Value> = context
        .as_object()
        .cloned()
        .unwrap_or_default();

    merged.insert(
        "quality_assessment".to_string(),
        serde_json::to_value(assessment).unwrap_or(Value::Null),
    );
    merged.insert(
        "improvements_needed".to_string(),
        serde_json::to_value(&assessment.improvements_needed).unwrap_or(Value::Null),
    );
    merged.insert("current_score".to_string(), serde_json::json!(current_score));
    merged.insert("target_score".to_string(), serde_json::json!(target_score));
    merged.insert("iteration".to_string(), serde_json::json!(iteration));
    merged.insert(
        "max_iterations".to_string(),
        serde_json::json!(max_iterations),
    );
    merged.insert(
        "remaining_iterations".to_string(),
        serde_json::json!(max_iterations.saturating_sub(iteration + 1)),
    );

    Value::Object(merged)
}

/// Build an enhanced task prompt carrying repair hints for an improver.
///
/// With no improvements the original task is returned unchanged.
pub fn build_repair_prompt(
    original_task: &str,
    improvements: &[String],
    previous_score: f64,
    iteration: u32,
) -> String {
    if improvements.is_empty() {
        return original_task.to_string();
    }

    let mut prompt = String::from(original_task);
    prompt.push_str("\n\n---\n");
    prompt.push_str(&format!(
        "## Iteration {} Improvements Required\n",
        iteration + 1
    ));
    prompt.push_str(&format!(
        "Previous quality score: {previous_score:.1}/100\n"
    ));
    prompt.push_str("Please address the following issues:\n");

    for (i, improvement) in improvements.iter().take(5).enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, improvement));
    }

    prompt.push_str(
        "\nFocus on concrete changes that demonstrate progress. \
         Show file modifications, test results, or command outputs as evidence.",
    );

    prompt
}
