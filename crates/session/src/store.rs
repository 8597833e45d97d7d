//! Session store: one JSON file per session, written atomically.
//!
//! Storage location: `<project>/.tessera/sessions/<uuid>.json`
//!
//! The store is the only writer of session files. Every write goes through
//! [`write_atomic`], so a reader never sees a half-written record and a
//! crash leaves the last committed turn on disk.

use crate::atomic::write_atomic;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tessera_core::error::SessionError;
use tessera_core::session::{Session, SessionPatch, SCHEMA_VERSION};
use tracing::{debug, info, warn};

/// Rule written to the session directory's `.gitignore`.
const IGNORE_ALL: &str = "*";

/// Longest auto-generated title.
const MAX_TITLE_CHARS: usize = 50;

type Result<T> = std::result::Result<T, SessionError>;

/// File-backed session CRUD.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// A store rooted at `sessions_dir`. Nothing is touched until first use.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: sessions_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `session_id`, after validating the id.
    pub fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    /// Create and persist a new session with zero turns.
    pub fn create_session(&self, session_id: &str, cwd: &Path) -> Result<Session> {
        let path = self.session_path(session_id)?;
        ensure_gitignore(&self.dir)?;

        let session = Session::new(session_id, cwd);
        self.write(&path, &session)?;
        info!(session = session_id, "Session created");
        Ok(session)
    }

    /// Load a session. A missing file is `Ok(None)`, not an error.
    ///
    /// Corrupted files and files with a foreign `schema_version` are also
    /// reported as absent (with a warning), so the caller recreates them.
    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_path(session_id)?;

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::io(&path, e)),
        };

        let raw: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupted JSON in session file");
                return Ok(None);
            }
        };

        let version = raw.get("schema_version").and_then(|v| v.as_u64());
        if version != Some(u64::from(SCHEMA_VERSION)) {
            warn!(
                path = %path.display(),
                found = %raw.get("schema_version").unwrap_or(&serde_json::Value::Null),
                expected = SCHEMA_VERSION,
                "Session has incompatible schema_version"
            );
            return Ok(None);
        }

        match serde_json::from_value::<Session>(raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed session record");
                Ok(None)
            }
        }
    }

    /// Load, creating the session if it does not exist yet.
    pub fn load_or_create(&self, session_id: &str, cwd: &Path) -> Result<Session> {
        match self.load_session(session_id)? {
            Some(session) => Ok(session),
            None => self.create_session(session_id, cwd),
        }
    }

    /// Merge `patch` onto the stored record and persist it.
    ///
    /// Returns `Ok(None)` when the session does not exist.
    pub fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let Some(mut session) = self.load_session(session_id)? else {
            return Ok(None);
        };
        session.apply(patch);
        self.save_session(&session)?;
        Ok(Some(session))
    }

    /// Persist a full record, replacing what is on disk.
    pub fn save_session(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.uuid)?;
        self.write(&path, session)
    }

    /// Remove a session file. Returns whether anything was removed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(session = session_id, "Session deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::io(&path, e)),
        }
    }

    /// Ids of all sessions on disk, sorted.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::io(&self.dir, e)),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| session_id_of(&entry.path()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Remove every session file not modified within `max_age`.
    ///
    /// Creates the directory if it is missing. Files that cannot be
    /// inspected or removed are skipped with a warning. Returns the number
    /// of sessions removed.
    pub fn clean_stale_sessions(&self, max_age: Duration) -> Result<usize> {
        fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;
        let entries = fs::read_dir(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if session_id_of(&path).is_none() {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read session mtime");
                    continue;
                }
            };

            // A clock that went backwards reports zero age.
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale session");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale session"),
            }
        }

        if removed > 0 {
            info!(removed, "Stale sessions cleaned");
        }
        Ok(removed)
    }

    fn write(&self, path: &Path, session: &Session) -> Result<()> {
        let data = serde_json::to_vec_pretty(session)?;
        write_atomic(path, &data).map_err(|e| SessionError::io(path, e))
    }
}

/// Reject ids that could escape the session directory.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty()
        || session_id.contains("..")
        || session_id.contains('/')
        || session_id.contains('\\')
        || session_id.contains('\0')
    {
        return Err(SessionError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

fn session_id_of(path: &Path) -> Option<String> {
    if path.extension()? != "json" || !path.is_file() {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}

/// Make sure `dir` is ignored by git: write `dir/.gitignore` with a
/// catch-all rule if it is missing. An existing file is left untouched.
/// Safe to call on every startup.
pub fn ensure_gitignore(dir: &Path) -> Result<()> {
    let path = dir.join(".gitignore");

    match fs::symlink_metadata(&path) {
        Ok(_) => {
            debug!(path = %path.display(), "Keeping existing .gitignore");
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SessionError::io(&path, e)),
    }

    let content = format!("# Session state is local to this machine\n{IGNORE_ALL}\n");
    write_atomic(&path, content.as_bytes()).map_err(|e| SessionError::io(&path, e))
}

/// Derive a short session title from a prompt.
///
/// `None` for empty prompts, `*command` prompts and single words. Otherwise
/// the whitespace-normalised prompt, cut at a word boundary to at most 50
/// characters.
pub fn generate_title(prompt: &str) -> Option<String> {
    let prompt = prompt.trim();
    if prompt.is_empty() || prompt.starts_with('*') {
        return None;
    }

    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }

    let mut title = String::new();
    for word in words {
        let extra = if title.is_empty() { 0 } else { 1 };
        if title.chars().count() + extra + word.chars().count() > MAX_TITLE_CHARS {
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }

    if title.is_empty() {
        // First word alone is longer than the limit.
        return Some(prompt.chars().take(MAX_TITLE_CHARS).collect());
    }
    Some(title)
}
