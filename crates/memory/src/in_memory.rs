//! In-memory store: useful for testing and ephemeral sessions.

use crate::entry::{rank, MemoryEntry};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tessera_core::error::MemoryError;
use tessera_core::memory::{MemoryQuery, MemoryRecord, MemoryStore};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A store that keeps memories in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed a store with entries.
    pub fn with_entries(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Add an entry, assigning an id and timestamp if missing.
    pub async fn insert(&self, mut entry: MemoryEntry) -> String {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        entry.created_at.get_or_insert_with(Utc::now);
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        id
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn query(&self, agent_id: &str, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(rank(&entries, agent_id, query))
    }
}
