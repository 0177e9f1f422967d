//! Deterministic Signals - Tool-verified facts that ground quality scores
//!
//! Scores derived from textual judgment alone are easy to game. This module
//! holds the deterministic facts produced by real tool runs (tests, lint,
//! type-check, build, security scans) and the two pure rules that consume
//! them: a hard-failure cap and a positive-signal bonus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deterministic facts from actual tool execution.
///
/// Defaults are safe: nothing is assumed to have passed. A zero-count field
/// means "no signal", not "clean".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeterministicSignals {
    /// Whether the full test suite passed
    pub tests_passed: bool,
    /// Total tests discovered
    pub tests_total: u32,
    /// Tests that failed
    pub tests_failed: u32,
    /// Tests that passed
    pub tests_passed_count: u32,
    /// Whether lint ran clean
    pub lint_passed: bool,
    /// Lint errors reported
    pub lint_errors: u32,
    /// Lint warnings reported
    pub lint_warnings: u32,
    /// Whether the type checker ran clean
    pub type_check_passed: bool,
    /// Type errors reported
    pub type_errors: u32,
    /// Whether the build succeeded
    pub build_passed: bool,
    /// Build errors reported
    pub build_errors: u32,
    /// Whether the security scan ran clean
    pub security_passed: bool,
    /// Critical security findings
    pub security_critical: u32,
    /// High-severity security findings
    pub security_high: u32,
    /// Test coverage percentage (0-100)
    pub test_coverage: f64,
}

/// Detail record produced when signals are applied to a base score.
///
/// Carries the human-readable reasons alongside the numbers so callers can
/// trace *why* a score moved, not just by how much.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAdjustment {
    /// Score before grounding
    pub base_score: f64,
    /// Score after grounding
    pub final_score: f64,
    /// `final_score - base_score`
    pub delta: f64,
    /// Hard-failure reasons that fired (empty when none)
    pub hard_failures: Vec<String>,
    /// Bonus reasons that fired (empty when suppressed or none)
    pub bonuses: Vec<String>,
    /// Always true when produced by [`DeterministicSignals::apply`]
    pub signals_applied: bool,
}

impl DeterministicSignals {
    /// True iff the signals contain a hard failure: any failing test, any
    /// critical security finding, or a failed build with errors.
    pub fn has_hard_failures(&self) -> bool {
        self.tests_failed > 0
            || self.security_critical > 0
            || (!self.build_passed && self.build_errors > 0)
    }

    /// Maximum achievable score given the hard failures present.
    ///
    /// Priority-ordered decision table, most severe first; only the first
    /// matching rule applies. Returns 100.0 when nothing caps the score.
    pub fn hard_failure_cap(&self) -> f64 {
        if self.security_critical > 0 {
            return 30.0;
        }

        if self.tests_failed > 0 {
            if self.tests_total == 0 {
                // Failures reported without a total: treat as a mid-tier failure.
                return 50.0;
            }
            let failure_ratio = f64::from(self.tests_failed) / f64::from(self.tests_total);
            return if failure_ratio > 0.5 {
                40.0
            } else if failure_ratio > 0.2 {
                50.0
            } else {
                60.0
            };
        }

        if !self.build_passed && self.build_errors > 0 {
            return 45.0;
        }

        if self.security_high > 0 {
            return 65.0;
        }

        100.0
    }

    /// Bonus points earned by positive signals, capped at 25.
    ///
    /// Coverage tiers are mutually exclusive (highest applicable only);
    /// the remaining bonuses are independently additive.
    pub fn bonus(&self) -> f64 {
        let mut bonus: f64 = 0.0;

        if self.test_coverage >= 80.0 {
            bonus += 10.0;
        } else if self.test_coverage >= 60.0 {
            bonus += 5.0;
        } else if self.test_coverage >= 40.0 {
            bonus += 2.0;
        }

        if self.lint_passed && self.lint_errors == 0 {
            bonus += 5.0;
        }

        if self.type_check_passed && self.type_errors == 0 {
            bonus += 5.0;
        }

        if self.tests_passed && self.tests_total > 0 && self.tests_failed == 0 {
            bonus += 5.0;
        }

        if self.security_passed {
            bonus += 5.0;
        }

        bonus.min(25.0)
    }

    /// Ground a base score in these signals.
    ///
    /// Hard failures cap the score and suppress every bonus: a project cannot
    /// buy back quality points while anything is broken. Without hard
    /// failures the bonus is added, clamped to 100.
    pub fn apply(&self, base_score: f64) -> (f64, SignalAdjustment) {
        let hard_failures = self.hard_failure_reasons();
        let adjusted;
        let bonuses;

        if !hard_failures.is_empty() {
            adjusted = base_score.min(self.hard_failure_cap());
            bonuses = Vec::new();
        } else {
            let reasons = self.bonus_reasons();
            adjusted = (base_score + self.bonus()).min(100.0);
            bonuses = reasons;
        }

        let adjustment = SignalAdjustment {
            base_score,
            final_score: adjusted,
            delta: adjusted - base_score,
            hard_failures,
            bonuses,
            signals_applied: true,
        };

        (adjusted, adjustment)
    }

    /// Extract signals from a generic evaluation context.
    ///
    /// Reads the `test_results`, `lint_results`, `type_check_results`,
    /// `build_results`, and `security_scan`/`security_results` sub-objects.
    /// Absent sub-objects and malformed fields degrade silently to defaults.
    pub fn from_context(context: &Value) -> Self {
        let mut signals = Self::default();

        if let Some(tests) = context.get("test_results") {
            signals.tests_total = read_u32(tests, "total");
            signals.tests_failed = read_u32(tests, "failed");
            signals.tests_passed_count = read_u32(tests, "passed_count");
            signals.tests_passed = read_bool(tests, "passed");
            if let Some(coverage) = read_f64(tests, "coverage") {
                signals.test_coverage = normalize_coverage(coverage);
            }
        }

        if let Some(lint) = context.get("lint_results") {
            signals.lint_passed = read_bool(lint, "passed");
            signals.lint_errors = read_u32(lint, "errors");
            signals.lint_warnings = read_u32(lint, "warnings");
        }

        if let Some(types) = context.get("type_check_results") {
            signals.type_check_passed = read_bool(types, "passed");
            signals.type_errors = read_u32(types, "errors");
        }

        if let Some(build) = context.get("build_results") {
            signals.build_passed = read_bool(build, "passed");
            signals.build_errors = read_u32(build, "errors");
        }

        let security = context
            .get("security_scan")
            .or_else(|| context.get("security_results"));
        if let Some(security) = security {
            signals.security_passed = read_bool(security, "passed");
            signals.security_critical = read_u32(security, "critical");
            signals.security_high = read_u32(security, "high");
        }

        signals
    }

    /// Extract signals from an execution-evidence snapshot
    /// (`tests_run`, `test_passed`, `test_failed`, `test_coverage`).
    pub fn from_evidence(evidence: &Value) -> Self {
        let mut signals = Self::default();

        let tests_run = read_bool(evidence, "tests_run");
        let passed = read_u32(evidence, "test_passed");
        let failed = read_u32(evidence, "test_failed");

        signals.tests_total = passed + failed;
        signals.tests_failed = failed;
        signals.tests_passed_count = passed;
        signals.tests_passed = tests_run && failed == 0 && passed > 0;

        if let Some(coverage) = read_f64(evidence, "test_coverage") {
            signals.test_coverage = normalize_coverage(coverage);
        }

        signals
    }

    fn hard_failure_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        if self.security_critical > 0 {
            reasons.push(format!(
                "Critical security findings: {}",
                self.security_critical
            ));
        }
        if self.tests_failed > 0 {
            reasons.push(format!(
                "Failing tests: {}/{}",
                self.tests_failed, self.tests_total
            ));
        }
        if !self.build_passed && self.build_errors > 0 {
            reasons.push(format!("Build failed with {} error(s)", self.build_errors));
        }

        reasons
    }

    fn bonus_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        if self.test_coverage >= 80.0 {
            reasons.push(format!("High test coverage ({:.0}%)", self.test_coverage));
        } else if self.test_coverage >= 60.0 {
            reasons.push(format!("Good test coverage ({:.0}%)", self.test_coverage));
        } else if self.test_coverage >= 40.0 {
            reasons.push(format!("Partial test coverage ({:.0}%)", self.test_coverage));
        }

        if self.lint_passed && self.lint_errors == 0 {
            reasons.push("Clean lint".to_string());
        }
        if self.type_check_passed && self.type_errors == 0 {
            reasons.push("Clean type check".to_string());
        }
        if self.tests_passed && self.tests_total > 0 && self.tests_failed == 0 {
            reasons.push(format!("All {} tests passing", self.tests_total));
        }
        if self.security_passed {
            reasons.push("Clean security scan".to_string());
        }

        reasons
    }
}

/// Coverage reported as a fraction (0..=1) is scaled to a percentage.
fn normalize_coverage(coverage: f64) -> f64 {
    if (0.0..=1.0).contains(&coverage) {
        coverage * 100.0
    } else {
        coverage.clamp(0.0, 100.0)
    }
}

fn read_u32(value: &Value, key: &str) -> u32 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

fn read_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn read_bool(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_assume_nothing_passed() {
        let signals = DeterministicSignals::default();

        assert!(!signals.tests_passed);
        assert_eq!(signals.tests_total, 0);
        assert!(!signals.lint_passed);
        assert!(!signals.build_passed);
        assert!(!signals.security_passed);
        assert!(!signals.has_hard_failures());
    }

    #[test]
    fn failing_tests_are_a_hard_failure() {
        let signals = DeterministicSignals {
            tests_total: 10,
            tests_failed: 3,
            ..Default::default()
        };
        assert!(signals.has_hard_failures());
    }

    #[test]
    fn critical_security_is_a_hard_failure() {
        let signals = DeterministicSignals {
            security_critical: 1,
            ..Default::default()
        };
        assert!(signals.has_hard_failures());
    }

    #[test]
    fn build_failure_is_a_hard_failure() {
        let signals = DeterministicSignals {
            build_passed: false,
            build_errors: 5,
            ..Default::default()
        };
        assert!(signals.has_hard_failures());
    }

    #[test]
    fn all_green_has_no_hard_failures() {
        let signals = DeterministicSignals {
            tests_passed: true,
            tests_total: 50,
            build_passed: true,
            security_passed: true,
            ..Default::default()
        };
        assert!(!signals.has_hard_failures());
    }

    #[test]
    fn cap_tiers_follow_the_priority_table() {
        let critical = DeterministicSignals {
            security_critical: 2,
            ..Default::default()
        };
        assert_eq!(critical.hard_failure_cap(), 30.0);

        let high_failure_rate = DeterministicSignals {
            tests_total: 10,
            tests_failed: 6,
            ..Default::default()
        };
        assert_eq!(high_failure_rate.hard_failure_cap(), 40.0);

        let medium_failure_rate = DeterministicSignals {
            tests_total: 10,
            tests_failed: 3,
            ..Default::default()
        };
        assert_eq!(medium_failure_rate.hard_failure_cap(), 50.0);

        let low_failure_rate = DeterministicSignals {
            tests_total: 10,
            tests_failed: 1,
            ..Default::default()
        };
        assert_eq!(low_failure_rate.hard_failure_cap(), 60.0);

        let build_failure = DeterministicSignals {
            build_passed: false,
            build_errors: 3,
            ..Default::default()
        };
        assert_eq!(build_failure.hard_failure_cap(), 45.0);

        let high_security = DeterministicSignals {
            security_high: 2,
            ..Default::default()
        };
        assert_eq!(high_security.hard_failure_cap(), 65.0);
    }

    #[test]
    fn clean_signals_have_no_cap() {
        let signals = DeterministicSignals {
            tests_passed: true,
            tests_total: 10,
            build_passed: true,
            security_passed: true,
            ..Default::default()
        };
        assert_eq!(signals.hard_failure_cap(), 100.0);
    }

    #[test]
    fn failed_tests_without_total_cap_at_mid_tier() {
        let signals = DeterministicSignals {
            tests_failed: 2,
            ..Default::default()
        };
        assert_eq!(signals.hard_failure_cap(), 50.0);
    }

    #[test]
    fn critical_takes_priority_over_test_failures() {
        let signals = DeterministicSignals {
            security_critical: 1,
            tests_total: 10,
            tests_failed: 9,
            ..Default::default()
        };
        assert_eq!(signals.hard_failure_cap(), 30.0);
    }

    #[test]
    fn coverage_bonus_tiers() {
        let high = DeterministicSignals {
            test_coverage: 85.0,
            ..Default::default()
        };
        assert!(high.bonus() >= 10.0);

        let medium = DeterministicSignals {
            test_coverage: 70.0,
            ..Default::default()
        };
        assert!((5.0..10.0).contains(&medium.bonus()));

        let partial = DeterministicSignals {
            test_coverage: 45.0,
            ..Default::default()
        };
        assert_eq!(partial.bonus(), 2.0);
    }

    #[test]
    fn independent_bonuses_stack() {
        let signals = DeterministicSignals {
            lint_passed: true,
            type_check_passed: true,
            security_passed: true,
            ..Default::default()
        };
        assert_eq!(signals.bonus(), 15.0);
    }

    #[test]
    fn bonus_is_capped_at_25() {
        let signals = DeterministicSignals {
            test_coverage: 95.0,
            lint_passed: true,
            type_check_passed: true,
            tests_passed: true,
            tests_total: 100,
            security_passed: true,
            ..Default::default()
        };
        assert_eq!(signals.bonus(), 25.0);
    }

    #[test]
    fn zero_tests_earn_no_pass_bonus() {
        // Zero total tests with zero failures is "no signal": no cap, no bonus.
        let signals = DeterministicSignals {
            tests_passed: true,
            tests_total: 0,
            ..Default::default()
        };
        assert_eq!(signals.bonus(), 0.0);
        assert_eq!(signals.hard_failure_cap(), 100.0);
    }

    #[test]
    fn apply_caps_and_suppresses_bonus_on_failure() {
        let signals = DeterministicSignals {
            tests_total: 10,
            tests_failed: 2,
            test_coverage: 85.0, // good coverage, but tests failing
            lint_passed: true,
            ..Default::default()
        };

        let (adjusted, detail) = signals.apply(80.0);

        assert_eq!(adjusted, 60.0);
        assert!(detail.bonuses.is_empty());
        assert!(!detail.hard_failures.is_empty());
        assert!(detail.signals_applied);
    }

    #[test]
    fn apply_critical_security_is_exactly_30() {
        let signals = DeterministicSignals {
            security_critical: 1,
            test_coverage: 95.0,
            lint_passed: true,
            ..Default::default()
        };

        let (adjusted, detail) = signals.apply(90.0);

        assert_eq!(adjusted, 30.0);
        assert!(detail.hard_failures[0].contains("Critical security"));
        assert!(detail.bonuses.is_empty());
    }

    #[test]
    fn apply_adds_bonus_without_failures() {
        let signals = DeterministicSignals {
            tests_passed: true,
            tests_total: 50,
            test_coverage: 85.0,
            lint_passed: true,
            ..Default::default()
        };

        let (adjusted, detail) = signals.apply(70.0);

        assert!(adjusted > 70.0);
        assert!(!detail.bonuses.is_empty());
        assert!(detail.delta > 0.0);
    }

    #[test]
    fn apply_clamps_to_100() {
        let signals = DeterministicSignals {
            tests_passed: true,
            tests_total: 50,
            test_coverage: 95.0,
            lint_passed: true,
            type_check_passed: true,
            security_passed: true,
            ..Default::default()
        };

        let (adjusted, _) = signals.apply(95.0);
        assert_eq!(adjusted, 100.0);
    }

    #[test]
    fn from_context_reads_test_results() {
        let context = json!({
            "test_results": {
                "total": 100,
                "failed": 5,
                "passed": true,
                "coverage": 0.85,
            }
        });

        let signals = DeterministicSignals::from_context(&context);

        assert_eq!(signals.tests_total, 100);
        assert_eq!(signals.tests_failed, 5);
        assert_eq!(signals.test_coverage, 85.0);
    }

    #[test]
    fn from_context_reads_lint_and_security() {
        let context = json!({
            "lint_results": { "passed": true, "errors": 0, "warnings": 3 },
            "security_scan": { "passed": false, "critical": 2, "high": 5 },
        });

        let signals = DeterministicSignals::from_context(&context);

        assert!(signals.lint_passed);
        assert_eq!(signals.lint_warnings, 3);
        assert!(!signals.security_passed);
        assert_eq!(signals.security_critical, 2);
        assert_eq!(signals.security_high, 5);
    }

    #[test]
    fn from_context_tolerates_missing_and_malformed_fields() {
        let empty = DeterministicSignals::from_context(&json!({}));
        assert!(!empty.tests_passed);
        assert!(!empty.lint_passed);

        let malformed = DeterministicSignals::from_context(&json!({
            "test_results": { "total": "lots", "failed": null, "coverage": "high" }
        }));
        assert_eq!(malformed.tests_total, 0);
        assert_eq!(malformed.tests_failed, 0);
        assert!(!malformed.has_hard_failures());
        assert_eq!(malformed.bonus(), 0.0);
    }

    #[test]
    fn from_context_accepts_percentage_coverage() {
        let context = json!({ "test_results": { "coverage": 75 } });
        let signals = DeterministicSignals::from_context(&context);
        assert_eq!(signals.test_coverage, 75.0);
    }

    #[test]
    fn cap_is_monotonically_non_increasing_in_failure_ratio() {
        // ratio 0.6 => 40, ratio 0.3 => 50, ratio 0.1 => 60
        let cap_for = |failed: u32| {
            DeterministicSignals {
                tests_total: 10,
                tests_failed: failed,
                ..Default::default()
            }
            .hard_failure_cap()
        };

        assert_eq!(cap_for(6), 40.0);
        assert_eq!(cap_for(3), 50.0);
        assert_eq!(cap_for(1), 60.0);
    }

    #[test]
    fn from_evidence_derives_totals() {
        let signals = DeterministicSignals::from_evidence(&json!({
            "tests_run": true,
            "test_passed": 10,
            "test_failed": 0,
            "test_coverage": 85.0,
        }));

        assert!(signals.tests_passed);
        assert_eq!(signals.tests_total, 10);
        assert_eq!(signals.test_coverage, 85.0);

        let failing = DeterministicSignals::from_evidence(&json!({
            "tests_run": true,
            "test_passed": 8,
            "test_failed": 2,
        }));

        assert!(!failing.tests_passed);
        assert_eq!(failing.tests_total, 10);
        assert_eq!(failing.tests_failed, 2);
    }
}
