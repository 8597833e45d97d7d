//! # Tessera Session
//!
//! Durable per-interaction session state.
//!
//! - [`atomic`]: crash-safe single-file writes (temp file + fsync + rename)
//! - [`store`]: session CRUD, stale sweep, title generation, git-ignore marker

pub mod atomic;
pub mod store;

pub use atomic::{replace_file, write_atomic};
pub use store::{ensure_gitignore, generate_title, validate_session_id, SessionStore};
