//! File-based memory store: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded [`MemoryEntry`]. Corrupted lines are skipped
//! with a warning, so a hand-edited file never takes the store down.
//!
//! Storage location: configured by `memory.store_path`, usually
//! `<project>/.tessera/memories.jsonl`.

use crate::entry::{rank, MemoryEntry};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::error::MemoryError;
use tessera_core::memory::{MemoryQuery, MemoryRecord, MemoryStore};
use tessera_session::write_atomic;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A file-backed memory store using JSONL (one JSON object per line).
///
/// Entries are loaded into memory on open and flushed to disk atomically on
/// every insert. Reads never touch the file.
pub struct JsonlStore {
    path: PathBuf,
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl JsonlStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (created on first insert). Any other
    /// read failure is [`MemoryError::Unavailable`], so the caller can run
    /// without a store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let entries = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), count = entries.len(), "JSONL memory store loaded");
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<Vec<MemoryEntry>, MemoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::Unavailable(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(line = n + 1, error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect())
    }

    /// Append an entry and persist. Returns its id.
    pub async fn insert(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        entry.created_at.get_or_insert_with(Utc::now);
        let id = entry.id.clone();

        let mut entries = self.entries.write().await;
        entries.push(entry);
        if let Err(e) = self.flush(&entries) {
            entries.pop();
            return Err(e);
        }
        Ok(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn flush(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        let mut content = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory entry: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        write_atomic(&self.path, content.as_bytes())
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

#[async_trait]
impl MemoryStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn query(&self, agent_id: &str, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(rank(&entries, agent_id, query))
    }
}
