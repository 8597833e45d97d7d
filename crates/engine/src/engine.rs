//! The context engine: one call per turn.
//!
//! ```text
//! classify ─► render active layers ─► memory hints? ─► format ─► persist
//! ```
//!
//! Only persistence can fail a turn. Layer and memory failures degrade to
//! empty content and show up in the metrics.

use crate::formatter::{self, PayloadParts};
use crate::layers::{star_commands, LayerRegistry, Rendered};
use crate::metrics::{LayerStatus, MetricsCollector, TurnMetrics};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_config::TesseraConfig;
use tessera_core::bracket::{BracketClassifier, Classification, ContextLimits};
use tessera_core::error::SessionError;
use tessera_core::layer::{LayerContext, ManifestLayer};
use tessera_core::memory::{MemoryHint, MemoryStore};
use tessera_core::session::{ContextSnapshot, HistoryPatch, Session, SessionPatch};
use tessera_core::token::estimate_tokens;
use tessera_memory::MemoryProvider;
use tessera_session::{generate_title, SessionStore};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Agent id used for memory lookups when the session has none.
pub const DEFAULT_AGENT: &str = "default";

/// The one failure a caller sees: the turn could not be recorded.
/// Retry the same turn; the on-disk session is unchanged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to persist session: {0}")]
    Persistence(#[from] SessionError),
}

/// Tunables, usually taken from [`TesseraConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub limits: ContextLimits,
    /// Layers still pending once this elapses are skipped.
    pub pipeline_timeout: Duration,
    /// Requested memory-hint budget, further capped per bracket.
    pub hint_token_budget: usize,
    pub memory_timeout: Duration,
    pub devmode: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&TesseraConfig::default())
    }
}

impl From<&TesseraConfig> for EngineSettings {
    fn from(config: &TesseraConfig) -> Self {
        Self {
            limits: config.context.limits(),
            pipeline_timeout: config.engine.pipeline_timeout(),
            hint_token_budget: config.memory.hint_token_budget,
            memory_timeout: config.memory.timeout(),
            devmode: config.engine.devmode,
        }
    }
}

/// What a processed turn hands back.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub payload: String,
    /// The session as persisted after this turn.
    pub session: Session,
    pub metrics: TurnMetrics,
}

pub struct ContextEngine {
    classifier: BracketClassifier,
    layers: LayerRegistry,
    memory: MemoryProvider,
    store: SessionStore,
    settings: EngineSettings,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContextEngine {
    pub fn new(
        store: SessionStore,
        layers: LayerRegistry,
        memory_store: Option<Arc<dyn MemoryStore>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            classifier: BracketClassifier::new(settings.limits),
            layers,
            memory: MemoryProvider::new(memory_store),
            store,
            settings,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn memory(&self) -> &MemoryProvider {
        &self.memory
    }

    pub fn classifier(&self) -> &BracketClassifier {
        &self.classifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Load (or create) `session_id`, then process one turn on it.
    ///
    /// The per-session lock is held from the load through the save, so
    /// concurrent turns on one id each see the previous turn's record.
    pub async fn process_turn(&self, session_id: &str, cwd: &Path, turn_input: &str) -> Result<TurnOutput, EngineError> {
        let lock = self.turn_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.store.load_or_create(session_id, cwd)?;
        self.run(turn_input, session).await
    }

    /// Process one turn on a session the caller already holds and persist it.
    ///
    /// The turn runs under the session's lock but on the caller's snapshot,
    /// which may already be stale. Use [`ContextEngine::process_turn`] when
    /// several tasks may drive the same session id.
    pub async fn process(&self, turn_input: &str, session: Session) -> Result<TurnOutput, EngineError> {
        let lock = self.turn_lock(&session.uuid).await;
        let _guard = lock.lock().await;
        self.run(turn_input, session).await
    }

    async fn run(&self, turn_input: &str, mut session: Session) -> Result<TurnOutput, EngineError> {
        let mut collector = MetricsCollector::start();
        let classification = self.classifier.classify(session.prompt_count);
        debug!(
            session = %session.uuid,
            prompt_count = session.prompt_count,
            bracket = %classification.bracket,
            context_percent = classification.context_percent,
            "Turn classified"
        );

        let loaded = self.render_layers(&session, turn_input, &classification, &mut collector);

        let hints = self.memory_hints(&session, &classification).await;
        collector.record_memory(hints.len(), hints.iter().map(|h| h.tokens).sum());

        let mut sections = formatter::sections(&PayloadParts {
            classification: &classification,
            layers: &loaded,
            hints: &hints,
        });
        let tokens_injected = sections.iter().map(|s| estimate_tokens(s)).sum();

        let metrics = collector.finish(
            classification.bracket,
            classification.context_percent,
            session.prompt_count,
            classification.token_budget,
            tokens_injected,
        );
        if self.settings.devmode {
            sections.push(formatter::metrics_section(&metrics));
        }
        let payload = formatter::wrap(&sections);

        session.apply(self.turn_patch(&session, turn_input, &classification, &loaded));
        self.store.save_session(&session)?;

        info!(
            session = %session.uuid,
            bracket = %metrics.bracket,
            loaded = metrics.layers_loaded,
            skipped = metrics.layers_skipped,
            errored = metrics.layers_errored,
            hints = metrics.memory_hints,
            total_ms = metrics.total_ms,
            "Turn processed"
        );

        Ok(TurnOutput {
            payload,
            session,
            metrics,
        })
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Render every eligible layer in index order, recording one metric per
    /// layer. The bracket's token budget is advisory: going over it is logged
    /// and shows in the metrics, but no active layer is dropped for it.
    fn render_layers(
        &self,
        session: &Session,
        turn_input: &str,
        classification: &Classification,
        collector: &mut MetricsCollector,
    ) -> Vec<(ManifestLayer, String)> {
        let ctx = LayerContext {
            session,
            turn_input,
            bracket: classification.bracket,
        };
        let mut used = 0usize;
        let mut loaded = Vec::new();

        for layer in ManifestLayer::ALL {
            if !classification.active_layers.contains(&layer) {
                let reason = format!("Not active at {}", classification.bracket);
                collector.record(layer, LayerStatus::skipped(reason), Duration::ZERO);
                continue;
            }
            if collector.elapsed() >= self.settings.pipeline_timeout {
                collector.record(layer, LayerStatus::skipped("Pipeline timeout"), Duration::ZERO);
                continue;
            }

            let started = Instant::now();
            let rendered = self.layers.render(layer, &ctx);
            let elapsed = started.elapsed();

            let status = match rendered {
                Rendered::Content(text) => {
                    let tokens = estimate_tokens(&text);
                    used = used.saturating_add(tokens);
                    loaded.push((layer, text));
                    LayerStatus::Loaded { tokens }
                }
                Rendered::Empty => LayerStatus::Empty,
                Rendered::Missing => LayerStatus::skipped("No provider registered"),
                Rendered::Failed(message) => LayerStatus::Errored { message },
            };
            collector.record(layer, status, elapsed);
        }

        if used > classification.token_budget {
            debug!(
                bracket = %classification.bracket,
                used,
                budget = classification.token_budget,
                "Layers exceed the bracket token budget"
            );
        }
        loaded
    }

    async fn memory_hints(&self, session: &Session, classification: &Classification) -> Arc<Vec<MemoryHint>> {
        if !classification.memory_hints_enabled || !self.memory.has_store() {
            return Arc::default();
        }

        let budget = self
            .settings
            .hint_token_budget
            .min(classification.bracket.memory_hint_cap());
        let agent = session.agent_id().unwrap_or(DEFAULT_AGENT);

        match tokio::time::timeout(
            self.settings.memory_timeout,
            self.memory.get_memories(agent, classification.bracket, budget),
        )
        .await
        {
            Ok(hints) => hints,
            Err(_) => {
                warn!(
                    agent,
                    timeout_ms = self.settings.memory_timeout.as_millis() as u64,
                    "Memory retrieval timed out"
                );
                Arc::default()
            }
        }
    }

    fn turn_patch(
        &self,
        session: &Session,
        turn_input: &str,
        classification: &Classification,
        loaded: &[(ManifestLayer, String)],
    ) -> SessionPatch {
        let title = if session.title.is_none() {
            generate_title(turn_input)
        } else {
            None
        };

        SessionPatch {
            title,
            prompt_count: Some(session.prompt_count + 1),
            context: Some(ContextSnapshot {
                last_bracket: classification.bracket,
                last_tokens_used: classification.tokens_used,
                last_context_percent: classification.context_percent,
            }),
            history: HistoryPatch {
                star_commands_used: star_commands(turn_input)
                    .into_iter()
                    .map(|c| format!("*{c}"))
                    .collect(),
                domains_loaded_last: Some(loaded.iter().map(|(l, _)| l.name().to_string()).collect()),
                agents_activated: session.agent_id().map(String::from).into_iter().collect(),
            },
            ..SessionPatch::default()
        }
    }
}
