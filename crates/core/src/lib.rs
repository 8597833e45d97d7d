//! # Tessera Core
//!
//! Domain types, traits, and error definitions for the Tessera
//! context-injection runtime. This crate does no I/O; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here (layer content, memory
//! store). Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod bracket;
pub mod error;
pub mod layer;
pub mod memory;
pub mod session;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use bracket::{Bracket, BracketClassifier, Classification, ContextLimits};
pub use error::{LayerError, MemoryError, SessionError};
pub use layer::{LayerContext, LayerProvider, ManifestLayer};
pub use memory::{MemoryHint, MemoryQuery, MemoryRecord, MemoryStore, Sector};
pub use session::{
    Activity, ActiveAgent, ContextSnapshot, HistoryPatch, Session, SessionHistory, SessionPatch,
    SCHEMA_VERSION,
};
pub use token::estimate_tokens;
