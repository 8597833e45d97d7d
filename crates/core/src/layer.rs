//! Manifest layers: the fixed, ordered slices of context eligible for injection.
//!
//! The manifest is eight layers (indices 0–7). Each layer carries a pure
//! eligibility policy ([`ManifestLayer::is_eligible`]); the text itself comes
//! from a [`LayerProvider`] owned outside the engine.

use crate::bracket::Bracket;
use crate::error::LayerError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the eight manifest layers, in injection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestLayer {
    /// L0: non-negotiable foundational rules.
    Constitution,
    /// L1: project-wide rules.
    Global,
    /// L2: persona of the active agent.
    Agent,
    /// L3: the active workflow.
    Workflow,
    /// L4: the active task.
    Task,
    /// L5: the active squad.
    Squad,
    /// L6: keyword-triggered domains.
    Keyword,
    /// L7: star-command expansions. Always on.
    StarCommand,
}

impl ManifestLayer {
    /// All layers in index order.
    pub const ALL: [ManifestLayer; 8] = [
        Self::Constitution,
        Self::Global,
        Self::Agent,
        Self::Workflow,
        Self::Task,
        Self::Squad,
        Self::Keyword,
        Self::StarCommand,
    ];

    /// Stable layer index (0–7).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look a layer up by index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Stable name used in metrics and payload headers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Constitution => "constitution",
            Self::Global => "global",
            Self::Agent => "agent",
            Self::Workflow => "workflow",
            Self::Task => "task",
            Self::Squad => "squad",
            Self::Keyword => "keyword",
            Self::StarCommand => "star-command",
        }
    }

    /// Whether this layer is injected at the given bracket.
    ///
    /// A fresh window only gets the foundational layers plus the
    /// always-on star-command layer. Every other bracket gets all eight.
    pub fn is_eligible(self, bracket: Bracket) -> bool {
        match bracket {
            Bracket::Fresh => matches!(
                self,
                Self::Constitution | Self::Global | Self::Agent | Self::StarCommand
            ),
            Bracket::Moderate | Bracket::Depleted | Bracket::Critical => true,
        }
    }
}

impl fmt::Display for ManifestLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} {}", self.index(), self.name())
    }
}

/// Everything a layer provider may look at when rendering.
#[derive(Debug, Clone, Copy)]
pub struct LayerContext<'a> {
    pub session: &'a Session,
    pub turn_input: &'a str,
    pub bracket: Bracket,
}

/// Produces the text for one manifest layer.
///
/// Providers return `Ok(String::new())` when their backing data is absent.
/// Errors are caught by the engine's layer registry and surface as empty
/// content; they never fail a turn.
pub trait LayerProvider: Send + Sync {
    /// The layer this provider renders.
    fn layer(&self) -> ManifestLayer;

    /// Render this layer's content for the current turn.
    fn render(&self, ctx: &LayerContext<'_>) -> std::result::Result<String, LayerError>;
}
