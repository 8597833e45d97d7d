//! Stored memory entries and the ranking both bundled stores share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tessera_core::memory::{MemoryQuery, MemoryRecord};

/// A memory as kept by the bundled stores.
///
/// One JSON object per line in the JSONL file:
///
/// ```json
/// {"id":"…","agent":"dev","sector":"procedural","summary":"Run cargo nextest","relevance":0.8}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(default)]
    pub id: String,

    /// Owning agent. `None` means visible to every agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub record: MemoryRecord,
}

impl MemoryEntry {
    pub fn new(record: MemoryRecord) -> Self {
        Self {
            record,
            ..Self::default()
        }
    }

    pub fn for_agent(agent: impl Into<String>, record: MemoryRecord) -> Self {
        Self {
            agent: Some(agent.into()),
            record,
            ..Self::default()
        }
    }

    /// Relevance score, falling back to attention.
    pub fn score(&self) -> f32 {
        self.record
            .relevance
            .or(self.record.attention)
            .unwrap_or(0.0)
    }

    fn visible_to(&self, agent_id: &str) -> bool {
        self.agent.as_deref().is_none_or(|a| a == agent_id)
    }

    /// Position of this entry's sector in the query's preference list.
    /// Entries without a sector rank after every listed one. An empty
    /// preference list accepts every sector.
    fn sector_rank(&self, query: &MemoryQuery) -> Option<usize> {
        if query.sectors.is_empty() {
            return Some(0);
        }
        match self.record.sector {
            Some(sector) => query.sectors.iter().position(|s| *s == sector),
            None => Some(query.sectors.len()),
        }
    }
}

/// Select and order the records matching `query` for `agent_id`.
///
/// Keeps entries visible to the agent, in one of the requested sectors (or
/// unsectored), scoring at least `min_relevance`. Orders by score, then by
/// sector preference, then by insertion order. Layer 1 returns metadata
/// only: full `content` is stripped so hints fall back to summary or title.
pub(crate) fn rank(entries: &[MemoryEntry], agent_id: &str, query: &MemoryQuery) -> Vec<MemoryRecord> {
    let mut matches: Vec<(usize, usize, &MemoryEntry)> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.visible_to(agent_id))
        .filter(|(_, e)| e.score() >= query.min_relevance)
        .filter_map(|(i, e)| e.sector_rank(query).map(|rank| (rank, i, e)))
        .collect();

    matches.sort_by(|(rank_a, i_a, a), (rank_b, i_b, b)| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
            .then(rank_a.cmp(rank_b))
            .then(i_a.cmp(i_b))
    });

    matches
        .into_iter()
        .take(query.limit)
        .map(|(_, _, e)| {
            let mut record = e.record.clone();
            if query.layer <= 1 && (record.summary.is_some() || record.title.is_some()) {
                record.content = None;
                record.tokens = None;
            }
            record
        })
        .collect()
}
