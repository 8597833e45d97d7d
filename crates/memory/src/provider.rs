//! Memory provider: agent-scoped, bracket-scoped, budget-bounded hints.
//!
//! ```text
//! get_memories(agent, bracket, budget)
//!   ├─ cache hit ──────────────────────────────► cached hints
//!   ├─ bracket without retrieval config ───────► []
//!   ├─ no store configured ────────────────────► []
//!   └─ store.query(agent, sectors + bracket cfg)
//!        ├─ Err ───────────────────────────────► [] (warn, not cached)
//!        └─ Ok(records) ─► greedy fill ─► cache ► hints
//! ```
//!
//! The provider never fails. Memory is an enhancement; a turn must not
//! break because the store is missing or misbehaving.

use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::bracket::Bracket;
use tessera_core::memory::{MemoryHint, MemoryQuery, MemoryRecord, MemoryStore, Sector};
use tessera_core::token::estimate_tokens;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Sectors used for agents without an entry in the preference table.
pub const DEFAULT_SECTORS: &[Sector] = &[Sector::Semantic];

/// Preferred sectors for an agent, most preferred first.
pub fn sectors_for(agent_id: &str) -> &'static [Sector] {
    use Sector::*;
    match agent_id {
        "dev" | "data-engineer" => &[Procedural, Semantic],
        "qa" => &[Reflective, Episodic],
        "architect" | "analyst" => &[Semantic, Reflective],
        "pm" | "po" => &[Episodic, Semantic],
        "sm" | "devops" => &[Procedural, Episodic],
        "ux-design-expert" => &[Reflective, Procedural],
        _ => DEFAULT_SECTORS,
    }
}

/// Retrieval parameters for one bracket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketQuery {
    /// Progressive-disclosure depth: 1 = metadata, 2 = chunks, 3 = full.
    pub layer: u8,
    pub limit: usize,
    pub min_relevance: f32,
}

impl BracketQuery {
    /// `None` for brackets that never retrieve (FRESH).
    pub fn for_bracket(bracket: Bracket) -> Option<Self> {
        let (layer, limit, min_relevance) = match bracket {
            Bracket::Moderate => (1, 3, 0.7),
            Bracket::Depleted => (2, 5, 0.5),
            Bracket::Critical => (3, 10, 0.3),
            Bracket::Fresh => return None,
        };
        Some(Self {
            layer,
            limit,
            min_relevance,
        })
    }
}

/// Cached hint list. Shared so repeat lookups return the same allocation.
pub type Hints = Arc<Vec<MemoryHint>>;

/// Retrieves memory hints for the engine.
///
/// Constructed with an optional store: `None` is a supported configuration
/// in which every request yields no hints.
pub struct MemoryProvider {
    store: Option<Arc<dyn MemoryStore>>,
    cache: RwLock<HashMap<String, Hints>>,
}

impl MemoryProvider {
    pub fn new(store: Option<Arc<dyn MemoryStore>>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A provider with no backing store.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn cache_key(agent_id: &str, bracket: Bracket) -> String {
        format!("{agent_id}-{bracket}")
    }

    /// Hints for `agent_id` at `bracket`, never exceeding `token_budget` in total.
    ///
    /// Results are cached for the provider's lifetime under
    /// `"{agent}-{BRACKET}"`; a hit does not consult the store, and the
    /// budget of the first request wins.
    pub async fn get_memories(&self, agent_id: &str, bracket: Bracket, token_budget: usize) -> Hints {
        let key = Self::cache_key(agent_id, bracket);
        if let Some(hit) = self.cache.read().await.get(&key) {
            debug!(key = %key, "Memory cache hit");
            return Arc::clone(hit);
        }

        let Some(config) = BracketQuery::for_bracket(bracket) else {
            return Hints::default();
        };

        let Some(store) = &self.store else {
            return Hints::default();
        };

        let query = MemoryQuery {
            sectors: sectors_for(agent_id).to_vec(),
            layer: config.layer,
            limit: config.limit,
            min_relevance: config.min_relevance,
            token_budget,
        };

        let records = match store.query(agent_id, &query).await {
            Ok(records) => records,
            Err(e) => {
                warn!(store = store.name(), agent = agent_id, error = %e, "Memory query failed");
                return Hints::default();
            }
        };

        let hints = Arc::new(to_hints(records, config.limit, token_budget));
        debug!(
            key = %key,
            hints = hints.len(),
            tokens = hints.iter().map(|h| h.tokens).sum::<usize>(),
            "Memory hints retrieved"
        );

        // A concurrent miss may have filled the slot; keep the first answer.
        let mut cache = self.cache.write().await;
        Arc::clone(cache.entry(key).or_insert(hints))
    }

    /// Evict every cached entry.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Greedy fill: take records in order until the next one would overflow
/// the budget, then stop. Records with no text are skipped.
fn to_hints(records: Vec<MemoryRecord>, limit: usize, token_budget: usize) -> Vec<MemoryHint> {
    let mut hints = Vec::new();
    let mut used = 0;

    for record in records {
        if hints.len() >= limit {
            break;
        }

        let content = record
            .content
            .filter(|s| !s.is_empty())
            .or(record.summary.filter(|s| !s.is_empty()))
            .or(record.title.filter(|s| !s.is_empty()));
        let Some(content) = content else {
            continue;
        };

        let tokens = record.tokens.unwrap_or_else(|| estimate_tokens(&content));
        // `used` never exceeds the budget, so this cannot underflow.
        if tokens > token_budget - used {
            break;
        }

        let source = record
            .source
            .or_else(|| record.sector.map(|s| s.to_string()))
            .unwrap_or_else(|| "memory".to_string());

        hints.push(MemoryHint {
            content,
            source,
            relevance: record.relevance.or(record.attention).unwrap_or(0.0),
            tokens,
        });
        used += tokens;
    }

    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tessera_core::error::MemoryError;

    /// Returns fixed records and counts queries.
    struct CountingStore {
        records: Vec<MemoryRecord>,
        calls: AtomicUsize,
        last_query: Mutex<Option<(String, MemoryQuery)>>,
    }

    impl CountingStore {
        fn new(records: Vec<MemoryRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: AtomicUsize::new(0),
                last_query: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MemoryStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn query(&self, agent_id: &str, query: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some((agent_id.to_string(), query.clone()));
            Ok(self.records.clone())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl MemoryStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn query(&self, _: &str, _: &MemoryQuery) -> Result<Vec<MemoryRecord>, MemoryError> {
            Err(MemoryError::QueryFailed("index offline".into()))
        }
    }

    fn text(content: &str, relevance: f32) -> MemoryRecord {
        MemoryRecord {
            content: Some(content.into()),
            relevance: Some(relevance),
            ..MemoryRecord::default()
        }
    }

    fn sized(tokens: usize) -> MemoryRecord {
        MemoryRecord {
            content: Some(format!("memory worth {tokens} tokens")),
            tokens: Some(tokens),
            relevance: Some(0.9),
            ..MemoryRecord::default()
        }
    }

    fn provider(store: Arc<dyn MemoryStore>) -> MemoryProvider {
        MemoryProvider::new(Some(store))
    }

    #[tokio::test]
    async fn fresh_bracket_yields_nothing_without_query() {
        let store = CountingStore::new(vec![text("anything", 0.9)]);
        let p = provider(store.clone());
        assert!(p.get_memories("dev", Bracket::Fresh, 1000).await.is_empty());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn no_store_degrades_to_empty() {
        let p = MemoryProvider::disabled();
        assert!(!p.has_store());
        for bracket in Bracket::ALL {
            assert!(p.get_memories("dev", bracket, 1000).await.is_empty());
        }
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty_and_is_not_cached() {
        let p = provider(Arc::new(FailingStore));
        assert!(p.get_memories("dev", Bracket::Critical, 1000).await.is_empty());
        assert_eq!(p.cached_entries().await, 0);
    }

    #[tokio::test]
    async fn query_uses_bracket_config_and_agent_sectors() {
        let store = CountingStore::new(vec![]);
        let p = provider(store.clone());

        p.get_memories("qa", Bracket::Depleted, 200).await;
        let (agent, q) = store.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(agent, "qa");
        assert_eq!(q.sectors, vec![Sector::Reflective, Sector::Episodic]);
        assert_eq!((q.layer, q.limit), (2, 5));
        assert!((q.min_relevance - 0.5).abs() < f32::EPSILON);
        assert_eq!(q.token_budget, 200);

        p.get_memories("unknown-agent", Bracket::Moderate, 50).await;
        let (_, q) = store.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(q.sectors, vec![Sector::Semantic]);
        assert_eq!((q.layer, q.limit), (1, 3));

        p.get_memories("dev", Bracket::Critical, 1000).await;
        let (_, q) = store.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(q.sectors, vec![Sector::Procedural, Sector::Semantic]);
        assert_eq!((q.layer, q.limit), (3, 10));
    }

    #[tokio::test]
    async fn greedy_fill_stops_at_first_overflow() {
        let store = CountingStore::new(vec![sized(40), sized(40), sized(30), sized(5)]);
        let p = provider(store);
        let hints = p.get_memories("dev", Bracket::Critical, 100).await;
        // 40 + 40 fits, 30 would overflow: stop, even though 5 would fit.
        assert_eq!(hints.len(), 2);
        assert_eq!(hints.iter().map(|h| h.tokens).sum::<usize>(), 80);
    }

    #[tokio::test]
    async fn budget_is_never_exceeded() {
        let records: Vec<_> = (1..=10).map(|i| sized(i * 7)).collect();
        for budget in [0, 1, 7, 20, 50, 99, 200, 1000] {
            let p = provider(CountingStore::new(records.clone()));
            let hints = p.get_memories("dev", Bracket::Critical, budget).await;
            let total: usize = hints.iter().map(|h| h.tokens).sum();
            assert!(total <= budget, "budget {budget} exceeded: {total}");
        }
    }

    #[tokio::test]
    async fn oversized_token_count_is_rejected() {
        let p = provider(CountingStore::new(vec![sized(1), sized(usize::MAX), sized(1)]));
        let hints = p.get_memories("dev", Bracket::Critical, 100).await;
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].tokens, 1);
    }

    #[tokio::test]
    async fn second_request_hits_cache() {
        let store = CountingStore::new(vec![text("Prefer small commits", 0.8)]);
        let p = provider(store.clone());

        let first = p.get_memories("dev", Bracket::Depleted, 200).await;
        let second = p.get_memories("dev", Bracket::Depleted, 200).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.calls(), 1);

        // Different bracket is a different key.
        p.get_memories("dev", Bracket::Critical, 200).await;
        assert_eq!(store.calls(), 2);
        assert_eq!(p.cached_entries().await, 2);
    }

    #[tokio::test]
    async fn clear_cache_forces_requery() {
        let store = CountingStore::new(vec![text("Prefer small commits", 0.8)]);
        let p = provider(store.clone());
        p.get_memories("dev", Bracket::Depleted, 200).await;
        p.clear_cache().await;
        assert_eq!(p.cached_entries().await, 0);
        p.get_memories("dev", Bracket::Depleted, 200).await;
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn field_fallbacks() {
        let records = vec![
            MemoryRecord {
                summary: Some("from summary".into()),
                sector: Some(Sector::Episodic),
                attention: Some(0.4),
                ..MemoryRecord::default()
            },
            MemoryRecord {
                title: Some("from title".into()),
                ..MemoryRecord::default()
            },
            MemoryRecord::default(),
            MemoryRecord {
                content: Some("explicit".into()),
                source: Some("retro-2026-09".into()),
                relevance: Some(0.9),
                ..MemoryRecord::default()
            },
        ];
        let hints = provider(CountingStore::new(records))
            .get_memories("dev", Bracket::Critical, 1000)
            .await;

        assert_eq!(hints.len(), 3);
        assert_eq!(hints[0].content, "from summary");
        assert_eq!(hints[0].source, "episodic");
        assert!((hints[0].relevance - 0.4).abs() < f32::EPSILON);
        assert_eq!(hints[0].tokens, estimate_tokens("from summary"));
        assert_eq!(hints[1].content, "from title");
        assert_eq!(hints[1].source, "memory");
        assert_eq!(hints[1].relevance, 0.0);
        assert_eq!(hints[2].source, "retro-2026-09");
    }

    #[tokio::test]
    async fn limit_caps_hint_count() {
        let records: Vec<_> = (0..8).map(|i| text(&format!("m{i}"), 0.9)).collect();
        let hints = provider(CountingStore::new(records))
            .get_memories("dev", Bracket::Moderate, 1000)
            .await;
        assert_eq!(hints.len(), 3);
    }

    #[test]
    fn sector_table() {
        assert_eq!(sectors_for("dev"), &[Sector::Procedural, Sector::Semantic]);
        assert_eq!(sectors_for("qa"), &[Sector::Reflective, Sector::Episodic]);
        assert_eq!(sectors_for("ux-design-expert"), &[Sector::Reflective, Sector::Procedural]);
        assert_eq!(sectors_for("nobody"), DEFAULT_SECTORS);
    }

    #[test]
    fn bracket_table() {
        assert!(BracketQuery::for_bracket(Bracket::Fresh).is_none());
        let critical = BracketQuery::for_bracket(Bracket::Critical).unwrap();
        assert_eq!((critical.layer, critical.limit), (3, 10));
    }
}
