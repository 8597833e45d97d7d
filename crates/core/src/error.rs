//! Error types for the Tessera domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; crates that combine them
//! (the engine) define their own wrapper.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid sessionId: {0:?}")]
    InvalidSessionId(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Failed to read layer source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layer {layer} failed to render: {reason}")]
    Render { layer: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_displays_path() {
        let err = SessionError::io(
            "/tmp/sessions/abc.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("abc.json"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn invalid_session_id_mentions_id() {
        let err = SessionError::InvalidSessionId("../etc/passwd".into());
        assert!(err.to_string().contains("Invalid sessionId"));
        assert!(err.to_string().contains("../etc/passwd"));
    }

    #[test]
    fn layer_error_displays_layer_name() {
        let err = LayerError::Render {
            layer: "keyword".into(),
            reason: "bad trigger table".into(),
        };
        assert!(err.to_string().contains("keyword"));
    }
}
