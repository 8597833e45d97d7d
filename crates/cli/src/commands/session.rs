//! `tessera session`: session housekeeping.

use std::path::Path;
use std::time::Duration;
use tessera_config::TesseraConfig;
use tessera_session::SessionStore;

fn open(cwd: &Path) -> Result<(TesseraConfig, SessionStore), Box<dyn std::error::Error>> {
    let config = TesseraConfig::load(cwd).map_err(|e| format!("Failed to load config: {e}"))?;
    let store = SessionStore::new(config.sessions_dir(cwd));
    Ok((config, store))
}

pub fn list(cwd: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_, store) = open(cwd)?;
    let ids = store.list_sessions()?;
    if ids.is_empty() {
        println!("No sessions in {}", store.dir().display());
    }
    for id in ids {
        match store.load_session(&id)? {
            Some(s) => println!(
                "{id}  prompts={:<4} bracket={:<8} {}",
                s.prompt_count,
                s.context.last_bracket,
                s.title.as_deref().unwrap_or("-")
            ),
            None => println!("{id}  (unreadable)"),
        }
    }
    Ok(())
}

pub fn show(cwd: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_, store) = open(cwd)?;
    match store.load_session(id)? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => return Err(format!("Session {id:?} not found").into()),
    }
    Ok(())
}

pub fn delete(cwd: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_, store) = open(cwd)?;
    if store.delete_session(id)? {
        println!("Deleted session {id}");
    } else {
        println!("Session {id} not found");
    }
    Ok(())
}

pub fn clean(cwd: &Path, max_age_hours: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, store) = open(cwd)?;
    let removed = store.clean_stale_sessions(max_age(&config, max_age_hours))?;
    println!("Removed {removed} stale session(s)");
    Ok(())
}

fn max_age(config: &TesseraConfig, override_hours: Option<u64>) -> Duration {
    match override_hours {
        Some(hours) => Duration::from_secs(hours.saturating_mul(3600)),
        None => config.session.stale_ttl(),
    }
}
