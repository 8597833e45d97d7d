//! `tessera init`: set up the project runtime directory.
//!
//! Idempotent: existing files are left alone.

use std::fs;
use std::path::Path;
use tessera_config::TesseraConfig;
use tessera_session::ensure_gitignore;

const LAYER_DIRS: &[&str] = &["agents", "workflows", "tasks", "squads", "keywords", "commands"];

const CONSTITUTION: &str = "\
# Constitution

<!-- Non-negotiable rules injected on every turn. -->
";

pub fn run(cwd: &Path) -> Result<(), Box<dyn std::error::Error>> {
    for line in init(cwd)? {
        println!("{line}");
    }
    Ok(())
}

/// Create whatever is missing and report what was done.
pub fn init(cwd: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let project_dir = TesseraConfig::project_dir(cwd);
    let mut report = Vec::new();

    if !project_dir.exists() {
        fs::create_dir_all(&project_dir)?;
        report.push(format!("Created {}", project_dir.display()));
    }

    let config_path = project_dir.join("config.toml");
    if config_path.exists() {
        report.push(format!("Config already exists at {}", config_path.display()));
    } else {
        fs::write(&config_path, TesseraConfig::default_toml())?;
        report.push(format!("Created {}", config_path.display()));
    }

    let constitution = project_dir.join("constitution.md");
    if !constitution.exists() {
        fs::write(&constitution, CONSTITUTION)?;
        report.push("Created constitution.md".to_string());
    }

    for dir in LAYER_DIRS {
        fs::create_dir_all(project_dir.join(dir))?;
    }

    let config = TesseraConfig::load(cwd)?;
    let sessions_dir = config.sessions_dir(cwd);
    fs::create_dir_all(&sessions_dir)?;
    ensure_gitignore(&sessions_dir)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = init(dir.path()).unwrap();
        assert!(first.iter().any(|l| l.contains("config.toml")));

        let root = dir.path().join(".tessera");
        assert!(root.join("config.toml").is_file());
        assert!(root.join("constitution.md").is_file());
        assert!(root.join("keywords").is_dir());
        assert!(root.join("sessions/.gitignore").is_file());

        fs::write(root.join("constitution.md"), "custom").unwrap();
        let second = init(dir.path()).unwrap();
        assert!(second.iter().any(|l| l.contains("already exists")));
        assert_eq!(fs::read_to_string(root.join("constitution.md")).unwrap(), "custom");
    }
}
