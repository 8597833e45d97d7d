//! Configuration loading, validation, and management for Tessera.
//!
//! Loads configuration from `<project>/.tessera/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every field has a
//! default, so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_core::bracket::{self, ContextLimits};

/// Name of the per-project runtime directory.
pub const PROJECT_DIR_NAME: &str = ".tessera";

/// The root configuration structure.
///
/// Maps directly to `<project>/.tessera/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesseraConfig {
    /// Context-window estimate constants
    #[serde(default)]
    pub context: ContextConfig,

    /// Session storage and housekeeping
    #[serde(default)]
    pub session: SessionConfig,

    /// Memory hint retrieval
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Per-turn pipeline settings
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_avg_turn_tokens")]
    pub avg_turn_tokens: u32,

    #[serde(default = "default_safety_multiplier")]
    pub safety_multiplier: f64,

    #[serde(default = "default_window_size")]
    pub window_size: u64,
}

fn default_avg_turn_tokens() -> u32 {
    bracket::AVG_TURN_TOKENS
}
fn default_safety_multiplier() -> f64 {
    bracket::SAFETY_MULTIPLIER
}
fn default_window_size() -> u64 {
    bracket::WINDOW_SIZE
}

impl ContextConfig {
    pub fn limits(&self) -> ContextLimits {
        ContextLimits {
            avg_turn_tokens: self.avg_turn_tokens,
            safety_multiplier: self.safety_multiplier,
            window_size: self.window_size,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            avg_turn_tokens: default_avg_turn_tokens(),
            safety_multiplier: default_safety_multiplier(),
            window_size: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions untouched for longer than this are reaped.
    #[serde(default = "default_stale_ttl_hours")]
    pub stale_ttl_hours: u64,

    /// Session directory, relative to the project runtime directory.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
}

fn default_stale_ttl_hours() -> u64 {
    168 // 7 days
}
fn default_sessions_dir() -> String {
    "sessions".into()
}

impl SessionConfig {
    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_ttl_hours.saturating_mul(3600))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_ttl_hours: default_stale_ttl_hours(),
            sessions_dir: default_sessions_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSONL memory store. Relative paths resolve against the project
    /// runtime directory. No path means no store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Token budget requested for memory hints on each turn.
    #[serde(default = "default_hint_token_budget")]
    pub hint_token_budget: usize,

    /// Upper bound on one memory-store query.
    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_hint_token_budget() -> usize {
    500
}
fn default_memory_timeout_ms() -> u64 {
    50
}

impl MemoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_path: None,
            hint_token_budget: default_hint_token_budget(),
            timeout_ms: default_memory_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Layers still pending when this elapses are skipped.
    #[serde(default = "default_pipeline_timeout_ms")]
    pub pipeline_timeout_ms: u64,

    /// Append per-layer metrics to the payload.
    #[serde(default)]
    pub devmode: bool,
}

fn default_pipeline_timeout_ms() -> u64 {
    100
}

impl EngineConfig {
    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipeline_timeout_ms: default_pipeline_timeout_ms(),
            devmode: false,
        }
    }
}

impl TesseraConfig {
    /// Load configuration for the project rooted at `cwd`.
    ///
    /// Also checks environment variables:
    /// - `TESSERA_STALE_TTL_HOURS`
    /// - `TESSERA_MEMORY_STORE`
    /// - `TESSERA_DEVMODE`
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let path = Self::project_dir(cwd).join("config.toml");
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TESSERA_STALE_TTL_HOURS") {
            self.session.stale_ttl_hours = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TESSERA_STALE_TTL_HOURS must be a positive integer, got {raw:?}"
                ))
            })?;
        }

        if let Some(path) = lookup("TESSERA_MEMORY_STORE") {
            self.memory.store_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Some(raw) = lookup("TESSERA_DEVMODE") {
            self.engine.devmode = matches!(raw.trim(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// The per-project runtime directory (`<cwd>/.tessera`).
    pub fn project_dir(cwd: &Path) -> PathBuf {
        cwd.join(PROJECT_DIR_NAME)
    }

    /// Absolute session directory for the project rooted at `cwd`.
    pub fn sessions_dir(&self, cwd: &Path) -> PathBuf {
        Self::project_dir(cwd).join(&self.session.sessions_dir)
    }

    /// Absolute memory store path, if one is configured.
    pub fn memory_store_path(&self, cwd: &Path) -> Option<PathBuf> {
        self.memory.store_path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                Self::project_dir(cwd).join(p)
            }
        })
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.avg_turn_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.avg_turn_tokens must be > 0".into(),
            ));
        }

        if !(self.context.safety_multiplier.is_finite() && self.context.safety_multiplier > 0.0) {
            return Err(ConfigError::ValidationError(
                "context.safety_multiplier must be a positive number".into(),
            ));
        }

        if self.context.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "context.window_size must be > 0".into(),
            ));
        }

        if self.session.stale_ttl_hours == 0 {
            return Err(ConfigError::ValidationError(
                "session.stale_ttl_hours must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
