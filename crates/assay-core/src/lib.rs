//! Assay Core - Evidence-grounded quality scoring for AI-produced artifacts
//!
//! Assay Core evaluates an arbitrary work artifact against a multi-dimensional
//! quality rubric, grounds the score in deterministic facts from real tool
//! runs, and drives a bounded improvement loop that asks an external improver
//! to revise the artifact until it clears a quality threshold or a stop
//! condition fires.
//!
//! # Architecture
//!
//! The engine is built leaf-first:
//!
//! 1. **Deterministic Signals** (`signals`): tool-verified facts with a hard-failure cap and a capped bonus
//! 2. **Dimension Evaluators** (`dimensions`): fixed rubric of nine dimensions with explainable deductions
//! 3. **Score Blender** (`blend`): weighted three-component blend with renormalization over missing inputs
//! 4. **Quality Scorer** (`scorer`): the evaluation facade with grounding and bounded history
//! 5. **Improvement Loop** (`looper`): the convergence controller with hard ceilings and timeout
//!
//! # Quick Start
//!
//! ```
//! use assay_core::{ImprovementLoop, LoopConfig, QualityScorer};
//! use serde_json::{json, Value};
//!
//! let scorer = QualityScorer::with_threshold(70.0);
//! let mut looper = ImprovementLoop::new(scorer)
//!     .with_config(LoopConfig::default().with_max_iterations(2));
//!
//! // The improver is supplied externally; here it attaches real evidence.
//! let mut improver = |artifact: &Value, _context: &Value| -> anyhow::Result<Value> {
//!     let mut improved = artifact.clone();
//!     improved["files_modified"] = json!(["src/auth.rs"]);
//!     improved["commands_run"] = json!(["cargo test"]);
//!     Ok(improved)
//! };
//!
//! let outcome = looper.run(json!({ "success": true }), &json!({}), &mut improver);
//!
//! println!(
//!     "score {:.1}, stopped because {}",
//!     outcome.assessment.overall_score,
//!     outcome.termination_reason.as_str()
//! );
//! assert!(outcome.iterations.len() <= 2);
//! ```
//!
//! # Design Principles
//!
//! 1. **Evidence over assertion**: declared success without execution evidence is capped hard
//! 2. **Hard failures are absolute**: no bonus can buy back points while anything is broken
//! 3. **Graceful degradation**: missing components renormalize, malformed context never panics
//! 4. **Bounded everything**: iteration ceilings, history ring buffer, best-effort timeout
//! 5. **Distinct exits**: every non-happy-path stop reports its own termination reason

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

/// Weighted blending of the named score components.
pub mod blend;
/// Thresholds, bands, and weight configuration.
pub mod config;
/// The quality rubric and its built-in dimension evaluators.
pub mod dimensions;
/// Error types.
pub mod error;
/// Execution-evidence extraction.
pub mod evidence;
/// The bounded improvement loop.
pub mod looper;
/// The quality scorer facade.
pub mod scorer;
/// Deterministic tool-verified signals.
pub mod signals;

// Re-export commonly used types for convenience
pub use blend::{Blended, ComponentWeights};
pub use config::{Band, QualityConfig, QualityThresholds};
pub use dimensions::{Dimension, QualityMetric};
pub use error::{AssayError, Result};
pub use looper::{
    build_repair_prompt, Improver, ImprovementLoop, IterationResult, LoopConfig, LoopOutcome,
    TerminationReason, HARD_MAX_ITERATIONS, MAX_ITERATIONS, MIN_IMPROVEMENT, OSCILLATION_WINDOW,
    STAGNATION_THRESHOLD,
};
pub use scorer::{
    compare_assessments, AssessmentComparison, CustomEvaluator, ImprovementSuggestion,
    MetricsSummary, PrimaryEvaluation, PrimaryEvaluator, QualityAssessment, QualityScorer,
    ScoreSummary,
};
pub use signals::{DeterministicSignals, SignalAdjustment};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
