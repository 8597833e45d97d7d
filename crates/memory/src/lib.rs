//! Memory hint retrieval for Tessera.
//!
//! [`MemoryProvider`] turns ranked records from a [`MemoryStore`] into
//! budget-bounded hints, caching per agent and bracket. Two stores ship
//! here: [`InMemoryStore`] for tests and ephemeral use, and [`JsonlStore`]
//! backed by a JSON-lines file.
//!
//! [`MemoryStore`]: tessera_core::memory::MemoryStore

pub mod entry;
pub mod file_backend;
pub mod in_memory;
pub mod provider;

pub use entry::MemoryEntry;
pub use file_backend::JsonlStore;
pub use in_memory::InMemoryStore;
pub use provider::{sectors_for, BracketQuery, MemoryProvider, DEFAULT_SECTORS};
