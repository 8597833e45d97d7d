//! The Tessera context engine.
//!
//! On every turn the engine:
//!
//! 1. **Classifies** the session into a context bracket
//! 2. **Renders** the manifest layers active at that bracket
//! 3. **Retrieves** memory hints when the window is depleted
//! 4. **Formats** one structured payload in fixed section order
//! 5. **Persists** the updated session
//!
//! [`runtime`] wraps all of this for the prompt-submit hook.

pub mod engine;
pub mod formatter;
pub mod layers;
pub mod metrics;
pub mod runtime;

pub use engine::{ContextEngine, EngineError, EngineSettings, TurnOutput, DEFAULT_AGENT};
pub use layers::{LayerRegistry, Rendered};
pub use metrics::{LayerMetric, LayerStatus, TurnMetrics};
pub use runtime::{handle_hook, HookInput, HookOutput, HookRuntime};
