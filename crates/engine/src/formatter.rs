//! Payload formatter.
//!
//! Sections are emitted in a fixed order:
//!
//! 1. bracket indicator
//! 2. each loaded layer, by layer index
//! 3. memory hints (if any)
//! 4. handoff warning (CRITICAL only)
//! 5. pipeline metrics (devmode only)
//!
//! The whole payload is wrapped in a single `<tessera-rules>` element.

use crate::metrics::{LayerStatus, TurnMetrics};
use std::fmt::Write;
use tessera_core::bracket::Classification;
use tessera_core::layer::ManifestLayer;
use tessera_core::memory::MemoryHint;

pub const OPEN_TAG: &str = "<tessera-rules>";
pub const CLOSE_TAG: &str = "</tessera-rules>";
pub const HANDOFF_HEADER: &str = "[HANDOFF WARNING]";
pub const MEMORY_HEADER: &str = "[MEMORY HINTS]";

const HANDOFF_TEXT: &str = "Context window is nearly exhausted. Summarise the current state \
and start a new session to keep full rule coverage.";

/// Inputs for one payload.
pub struct PayloadParts<'a> {
    pub classification: &'a Classification,
    /// Loaded layer content, already in index order.
    pub layers: &'a [(ManifestLayer, String)],
    pub hints: &'a [MemoryHint],
}

/// Render the bracket indicator line.
pub fn bracket_line(classification: &Classification) -> String {
    format!(
        "CONTEXT BRACKET: [{}] ({:.1}% remaining, budget {} tokens)",
        classification.bracket, classification.context_percent, classification.token_budget
    )
}

pub fn memory_section(hints: &[MemoryHint]) -> String {
    let mut out = String::from(MEMORY_HEADER);
    for hint in hints {
        let _ = write!(out, "\n- ({}, {:.2}) {}", hint.source, hint.relevance, hint.content);
    }
    out
}

pub fn handoff_section() -> String {
    format!("{HANDOFF_HEADER}\n{HANDOFF_TEXT}")
}

/// Assemble the payload sections (without metrics).
pub fn sections(parts: &PayloadParts<'_>) -> Vec<String> {
    let mut sections = Vec::with_capacity(parts.layers.len() + 3);
    sections.push(format!("[CONTEXT BRACKET]\n{}", bracket_line(parts.classification)));

    for (layer, content) in parts.layers {
        sections.push(format!("[{}]\n{content}", layer.to_string().to_uppercase()));
    }

    if !parts.hints.is_empty() {
        sections.push(memory_section(parts.hints));
    }

    if parts.classification.handoff_warning {
        sections.push(handoff_section());
    }

    sections
}

/// Devmode section listing each layer's outcome.
pub fn metrics_section(metrics: &TurnMetrics) -> String {
    let mut out = String::from("[DEVMODE STATUS]");
    let _ = write!(
        out,
        "\nloaded={} skipped={} errored={} hints={} tokens={}/{} total_ms={:.2}",
        metrics.layers_loaded,
        metrics.layers_skipped,
        metrics.layers_errored,
        metrics.memory_hints,
        metrics.tokens_injected,
        metrics.token_budget,
        metrics.total_ms,
    );
    for m in &metrics.layers {
        let status = match &m.status {
            LayerStatus::Loaded { tokens } => format!("loaded ({tokens} tokens)"),
            LayerStatus::Empty => "empty".to_string(),
            LayerStatus::Skipped { reason } => format!("skipped: {reason}"),
            LayerStatus::Errored { message } => format!("errored: {message}"),
        };
        let _ = write!(out, "\n  {}: {status}", m.layer);
    }
    out
}

/// Join sections into the final wrapped payload.
pub fn wrap(sections: &[String]) -> String {
    format!("{OPEN_TAG}\n{}\n{CLOSE_TAG}", sections.join("\n\n"))
}
