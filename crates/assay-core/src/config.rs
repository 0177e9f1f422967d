//! Configuration - Thresholds, bands, and weight overrides
//!
//! Configuration is handed in as plain data (TOML text or a JSON value) by
//! the caller; this module owns the defaults and the fallback behavior.
//! Malformed configuration is never fatal: bad entries are logged and the
//! built-in defaults are used.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blend::ComponentWeights;
use crate::dimensions::Dimension;
use crate::error::Result;

/// Three-way classification of an overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    /// Meets the production-ready cut
    ProductionReady,
    /// Acceptable but needs attention before shipping
    NeedsAttention,
    /// Below the acceptable floor; iterate
    Iterate,
}

impl Band {
    /// Snake-case name of this band.
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::ProductionReady => "production_ready",
            Band::NeedsAttention => "needs_attention",
            Band::Iterate => "iterate",
        }
    }

    /// Letter-grade vocabulary for this band.
    pub fn grade(&self) -> &'static str {
        match self {
            Band::ProductionReady => "Excellent",
            Band::NeedsAttention => "Needs Attention",
            Band::Iterate => "Rework",
        }
    }

    /// Recommended next action for this band.
    pub fn action(&self) -> &'static str {
        match self {
            Band::ProductionReady => "Auto-approve",
            Band::NeedsAttention => "Address feedback and re-run validation",
            Band::Iterate => "Iterate with assigned specialist agent",
        }
    }
}

/// Ordered score cut points: `production_ready > needs_attention > iterate`.
///
/// Immutable once constructed. `iterate` is the floor of the bottom band and
/// is carried for configuration round-trips and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Cut for the production-ready band (also the pass threshold)
    pub production_ready: f64,
    /// Cut for the needs-attention band
    pub needs_attention: f64,
    /// Floor of the iterate band
    pub iterate: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            production_ready: 90.0,
            needs_attention: 70.0,
            iterate: 50.0,
        }
    }
}

impl QualityThresholds {
    /// Classify a score into its band.
    pub fn classify(&self, score: f64) -> Band {
        if score >= self.production_ready {
            Band::ProductionReady
        } else if score >= self.needs_attention {
            Band::NeedsAttention
        } else {
            Band::Iterate
        }
    }

    /// Apply an explicit pass-threshold override.
    ///
    /// The override becomes the new production-ready cut, and the
    /// needs-attention cut tightens so it is never looser than the override.
    pub fn with_override(mut self, threshold: f64) -> Self {
        self.production_ready = threshold;
        self.needs_attention = self.needs_attention.min(threshold);
        self
    }
}

/// Raw threshold section accepting the legacy alias names.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawThresholds {
    #[serde(alias = "excellent")]
    production_ready: Option<f64>,
    #[serde(alias = "good")]
    needs_attention: Option<f64>,
    #[serde(alias = "failing")]
    iterate: Option<f64>,
}

/// Raw deserialized configuration.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dimensions: HashMap<String, f64>,
    #[serde(default)]
    components: Option<ComponentWeights>,
    #[serde(default)]
    thresholds: Option<RawThresholds>,
}

/// Resolved scorer configuration: dimension weight overrides, blend
/// component weights, and classification thresholds.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Per-dimension weight overrides
    pub dimension_weights: HashMap<Dimension, f64>,
    /// Blend component weights
    pub component_weights: ComponentWeights,
    /// Classification thresholds
    pub thresholds: QualityThresholds,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            dimension_weights: HashMap::new(),
            component_weights: ComponentWeights::default(),
            thresholds: QualityThresholds::default(),
        }
    }
}

impl QualityConfig {
    /// Parse configuration from TOML text.
    ///
    /// Unknown dimension names are logged and ignored; missing sections keep
    /// their defaults. Returns an error only for syntactically invalid TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(input)?;
        Ok(Self::from_raw(raw))
    }

    /// Parse configuration from an in-memory JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(value.clone())?;
        Ok(Self::from_raw(raw))
    }

    /// Parse TOML configuration, falling back to defaults on any error.
    pub fn from_toml_str_or_default(input: &str) -> Self {
        match Self::from_toml_str(input) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to read quality configuration, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Weight for a dimension: configured override or the built-in default.
    pub fn dimension_weight(&self, dimension: Dimension) -> f64 {
        self.dimension_weights
            .get(&dimension)
            .copied()
            .unwrap_or_else(|| dimension.default_weight())
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut dimension_weights = HashMap::new();
        for (name, weight) in raw.dimensions {
            match Dimension::parse(&name) {
                Some(dimension) => {
                    dimension_weights.insert(dimension, weight.max(0.0));
                }
                None => {
                    tracing::debug!("Ignoring unknown quality dimension '{name}' from config");
                }
            }
        }

        let thresholds = raw
            .thresholds
            .map(|t| {
                let defaults = QualityThresholds::default();
                QualityThresholds {
                    production_ready: t.production_ready.unwrap_or(defaults.production_ready),
                    needs_attention: t.needs_attention.unwrap_or(defaults.needs_attention),
                    iterate: t.iterate.unwrap_or(defaults.iterate),
                }
            })
            .unwrap_or_default();

        Self {
            dimension_weights,
            component_weights: raw.components.unwrap_or_default(),
            thresholds,
        }
    }
}
