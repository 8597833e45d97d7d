//! Hook runtime: wires config, session store, layers and memory for one
//! prompt-submit hook invocation.
//!
//! The hook must never break the host: when the project has no
//! `.tessera/` directory, or the input lacks a working directory or session
//! id, there is simply no runtime and the hook prints an empty context.

use crate::engine::{ContextEngine, EngineError, EngineSettings, TurnOutput};
use crate::layers::LayerRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_config::TesseraConfig;
use tessera_core::memory::MemoryStore;
use tessera_core::session::Session;
use tessera_memory::JsonlStore;
use tessera_session::SessionStore;
use tracing::{debug, info, warn};

/// JSON read from the hook's stdin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub cwd: Option<String>,

    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub prompt: Option<String>,
}

/// JSON written to the hook's stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub additional_context: String,
}

impl HookOutput {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput {
                additional_context: context.into(),
            },
        }
    }

    pub fn empty() -> Self {
        Self::new(String::new())
    }
}

/// Everything one hook invocation needs.
pub struct HookRuntime {
    pub engine: ContextEngine,
    pub session: Session,
    pub session_id: String,
    pub cwd: PathBuf,
    pub config: TesseraConfig,
}

impl HookRuntime {
    /// Build the runtime for `input`, or `None` when the hook should stay silent.
    ///
    /// On the first prompt of a session, stale sessions are swept. Sweep
    /// failures are logged and otherwise ignored.
    pub fn resolve(input: &HookInput) -> Option<Self> {
        let cwd = PathBuf::from(input.cwd.as_deref().filter(|c| !c.is_empty())?);
        let session_id = input.session_id.as_deref().filter(|s| !s.is_empty())?;

        let project_dir = TesseraConfig::project_dir(&cwd);
        if !project_dir.is_dir() {
            debug!(path = %project_dir.display(), "No project runtime directory");
            return None;
        }

        let config = match TesseraConfig::load(&cwd) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Invalid configuration, using defaults");
                TesseraConfig::default()
            }
        };

        let store = SessionStore::new(config.sessions_dir(&cwd));
        let session = match store.load_or_create(session_id, &cwd) {
            Ok(session) => session,
            Err(e) => {
                warn!(session = session_id, error = %e, "Cannot open session");
                return None;
            }
        };

        if session.prompt_count == 0 {
            match store.clean_stale_sessions(config.session.stale_ttl()) {
                Ok(removed) if removed > 0 => info!(
                    removed,
                    ttl_hours = config.session.stale_ttl_hours,
                    "Cleaned stale sessions"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Stale session sweep failed"),
            }
        }

        let engine = ContextEngine::new(
            store,
            LayerRegistry::from_dir(&project_dir),
            open_memory_store(&config, &cwd),
            EngineSettings::from(&config),
        );

        Some(Self {
            engine,
            session,
            session_id: session_id.to_string(),
            cwd,
            config,
        })
    }

    /// Process `prompt` on the resolved session.
    pub async fn run(self, prompt: &str) -> Result<TurnOutput, EngineError> {
        self.engine.process_turn(&self.session_id, &self.cwd, prompt).await
    }
}

/// The configured memory store, or `None` when disabled, unset or unreadable.
pub fn open_memory_store(config: &TesseraConfig, cwd: &Path) -> Option<Arc<dyn MemoryStore>> {
    if !config.memory.enabled {
        return None;
    }
    let path = config.memory_store_path(cwd)?;
    match JsonlStore::open(&path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Memory store unavailable");
            None
        }
    }
}

/// Full hook round: resolve, process, shape the output. Never fails.
pub async fn handle_hook(input: &HookInput) -> HookOutput {
    let Some(runtime) = HookRuntime::resolve(input) else {
        return HookOutput::empty();
    };
    let prompt = input.prompt.clone().unwrap_or_default();

    match runtime.run(&prompt).await {
        Ok(out) => HookOutput::new(out.payload),
        Err(e) => {
            warn!(error = %e, "Turn failed");
            HookOutput::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".tessera")).unwrap();
        dir
    }

    fn input(cwd: &Path, session_id: &str, prompt: &str) -> HookInput {
        HookInput {
            cwd: Some(cwd.to_string_lossy().into_owned()),
            session_id: Some(session_id.into()),
            prompt: Some(prompt.into()),
        }
    }

    #[test]
    fn input_accepts_both_session_id_spellings() {
        let a: HookInput = serde_json::from_str(r#"{"cwd":"/x","session_id":"s1"}"#).unwrap();
        let b: HookInput = serde_json::from_str(r#"{"cwd":"/x","sessionId":"s1"}"#).unwrap();
        assert_eq!(a.session_id.as_deref(), Some("s1"));
        assert_eq!(b.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn output_shape() {
        let json = serde_json::to_value(HookOutput::new("<x/>")).unwrap();
        assert_eq!(json["hookSpecificOutput"]["additionalContext"], "<x/>");
    }

    #[test]
    fn no_runtime_without_cwd_session_or_project_dir() {
        let bare = tempfile::tempdir().unwrap();
        assert!(HookRuntime::resolve(&HookInput::default()).is_none());
        assert!(HookRuntime::resolve(&input(bare.path(), "s1", "hi")).is_none());

        let dir = project();
        let mut no_session = input(dir.path(), "s1", "hi");
        no_session.session_id = None;
        assert!(HookRuntime::resolve(&no_session).is_none());
    }

    #[test]
    fn invalid_session_id_is_silent() {
        let dir = project();
        assert!(HookRuntime::resolve(&input(dir.path(), "../escape", "hi")).is_none());
    }

    #[tokio::test]
    async fn hook_round_persists_session() {
        let dir = project();
        fs::write(dir.path().join(".tessera/constitution.md"), "Be precise.").unwrap();

        let out = handle_hook(&input(dir.path(), "hook-1", "Explain the build pipeline")).await;
        let ctx = out.hook_specific_output.additional_context;
        assert!(ctx.contains("CONTEXT BRACKET: [FRESH]"));
        assert!(ctx.contains("Be precise."));

        let store = SessionStore::new(dir.path().join(".tessera/sessions"));
        let session = store.load_session("hook-1").unwrap().unwrap();
        assert_eq!(session.prompt_count, 1);
    }

    #[tokio::test]
    async fn silent_when_project_missing() {
        let bare = tempfile::tempdir().unwrap();
        let out = handle_hook(&input(bare.path(), "hook-2", "hi")).await;
        assert_eq!(out, HookOutput::empty());
        assert!(!bare.path().join(".tessera").exists());
    }

    #[test]
    fn memory_store_only_when_configured() {
        let dir = project();
        let mut config = TesseraConfig::default();
        assert!(open_memory_store(&config, dir.path()).is_none());

        config.memory.store_path = Some("memories.jsonl".into());
        assert!(open_memory_store(&config, dir.path()).is_some());

        config.memory.enabled = false;
        assert!(open_memory_store(&config, dir.path()).is_none());
    }
}
