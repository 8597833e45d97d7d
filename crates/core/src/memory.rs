//! Memory store trait: long-term memory the engine can draw hints from.
//!
//! The store ranks records by relevance; how it does that is its own
//! business. The engine only ever sees [`MemoryHint`]s, produced by the
//! memory provider from the raw [`MemoryRecord`]s a store returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::error::MemoryError;

/// Cognitive sector a memory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    /// How-to knowledge: commands, build steps, recipes.
    Procedural,
    /// Facts and concepts.
    Semantic,
    /// Things that happened in past sessions.
    Episodic,
    /// Lessons learned, retrospectives.
    Reflective,
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Procedural => "procedural",
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Reflective => "reflective",
        };
        f.write_str(s)
    }
}

/// A retrieval request sent to a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Sectors to draw from, most preferred first.
    pub sectors: Vec<Sector>,

    /// Progressive-disclosure depth (1 = metadata, 2 = chunks, 3 = full).
    pub layer: u8,

    /// Maximum number of records.
    pub limit: usize,

    /// Minimum relevance score threshold.
    pub min_relevance: f32,

    /// Token budget the caller will enforce on the results.
    pub token_budget: usize,
}

/// A raw record as returned by a store.
///
/// Stores differ in which fields they fill; the provider falls back
/// `content → summary → title` for text and `relevance → attention` for score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<Sector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention: Option<f32>,

    /// Precomputed token cost. Estimated from the text when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<usize>,
}

/// A bounded snippet ready for injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHint {
    pub content: String,
    pub source: String,
    pub relevance: f32,
    pub tokens: usize,
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (for testing), JSONL file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The store name (e.g., "in_memory", "jsonl").
    fn name(&self) -> &str;

    /// Return records for `agent_id`, ranked most relevant first.
    async fn query(
        &self,
        agent_id: &str,
        query: &MemoryQuery,
    ) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors_serialize_lowercase() {
        let json = serde_json::to_string(&vec![Sector::Procedural, Sector::Reflective]).unwrap();
        assert_eq!(json, r#"["procedural","reflective"]"#);
    }

    #[test]
    fn record_tolerates_sparse_fields() {
        let record: MemoryRecord =
            serde_json::from_str(r#"{"summary":"Use cargo nextest","attention":0.4}"#).unwrap();
        assert!(record.content.is_none());
        assert_eq!(record.summary.as_deref(), Some("Use cargo nextest"));
        assert_eq!(record.attention, Some(0.4));
        assert!(record.tokens.is_none());
    }
}
