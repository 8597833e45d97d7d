//! `tessera hook`: prompt-submit hook.
//!
//! Reads one JSON object from stdin and always writes one JSON object to
//! stdout, even when the input is unusable.

use std::io::Read;
use tessera_engine::{handle_hook, HookInput, HookOutput};
use tracing::warn;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let output = respond(&raw).await;
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Hook output for raw stdin content.
pub async fn respond(raw: &str) -> HookOutput {
    match parse_input(raw) {
        Some(input) => handle_hook(&input).await,
        None => HookOutput::empty(),
    }
}

fn parse_input(raw: &str) -> Option<HookInput> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(input) => Some(input),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed hook input");
            None
        }
    }
}
