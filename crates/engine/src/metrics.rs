//! Per-turn pipeline metrics.
//!
//! Every manifest layer gets exactly one [`LayerMetric`] per turn, whether
//! it loaded, came back empty, was skipped or errored. The summary counts
//! are derived from those records, never tracked separately.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tessera_core::bracket::Bracket;
use tessera_core::layer::ManifestLayer;

/// Outcome of one layer in one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LayerStatus {
    Loaded { tokens: usize },
    /// Eligible and rendered, but the provider had nothing to say.
    Empty,
    Skipped { reason: String },
    Errored { message: String },
}

impl LayerStatus {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMetric {
    pub layer: ManifestLayer,
    #[serde(flatten)]
    pub status: LayerStatus,
    pub duration_us: u64,
}

/// Metrics for one processed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub bracket: Bracket,
    pub context_percent: f64,
    /// Prompt count the turn was classified at (before the increment).
    pub prompt_count: u64,
    pub token_budget: usize,
    pub tokens_injected: usize,
    pub layers: Vec<LayerMetric>,
    pub layers_loaded: usize,
    pub layers_skipped: usize,
    pub layers_errored: usize,
    pub memory_hints: usize,
    pub memory_tokens: usize,
    pub total_ms: f64,
}

impl TurnMetrics {
    pub fn layer(&self, layer: ManifestLayer) -> Option<&LayerMetric> {
        self.layers.iter().find(|m| m.layer == layer)
    }
}

/// Accumulates layer outcomes while a turn runs.
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    layers: Vec<LayerMetric>,
    memory_hints: usize,
    memory_tokens: usize,
}

impl MetricsCollector {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            layers: Vec::with_capacity(ManifestLayer::ALL.len()),
            memory_hints: 0,
            memory_tokens: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record(&mut self, layer: ManifestLayer, status: LayerStatus, duration: Duration) {
        self.layers.push(LayerMetric {
            layer,
            status,
            duration_us: u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
        });
    }

    pub fn record_memory(&mut self, hints: usize, tokens: usize) {
        self.memory_hints = hints;
        self.memory_tokens = tokens;
    }

    pub fn finish(
        mut self,
        bracket: Bracket,
        context_percent: f64,
        prompt_count: u64,
        token_budget: usize,
        tokens_injected: usize,
    ) -> TurnMetrics {
        self.layers.sort_by_key(|m| m.layer);

        let count = |pred: fn(&LayerStatus) -> bool| {
            self.layers.iter().filter(|m| pred(&m.status)).count()
        };
        let layers_loaded = count(|s| matches!(s, LayerStatus::Loaded { .. }));
        let layers_skipped = count(|s| matches!(s, LayerStatus::Skipped { .. }));
        let layers_errored = count(|s| matches!(s, LayerStatus::Errored { .. }));

        TurnMetrics {
            bracket,
            context_percent,
            prompt_count,
            token_budget,
            tokens_injected,
            layers_loaded,
            layers_skipped,
            layers_errored,
            memory_hints: self.memory_hints,
            memory_tokens: self.memory_tokens,
            total_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            layers: self.layers,
        }
    }
}
