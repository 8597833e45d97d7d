//! Tessera CLI: the main entry point.
//!
//! Commands:
//! - `init`     Create the project runtime directory and default config
//! - `hook`     Prompt-submit hook: JSON on stdin, context JSON on stdout
//! - `classify` Show the bracket for a prompt count
//! - `session`  Inspect, delete and reap stored sessions
//!
//! Logs go to stderr; stdout is reserved for command output.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tessera: per-session context injection for LLM agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create `.tessera/` with a default config and layer directories
    Init {
        /// Project root (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Run the prompt-submit hook (reads JSON from stdin)
    Hook,

    /// Classify a prompt count into a context bracket
    Classify {
        /// Number of turns already processed
        #[arg(allow_negative_numbers = true)]
        prompt_count: f64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage stored sessions
    Session {
        /// Project root (defaults to the current directory)
        #[arg(long, global = true)]
        cwd: Option<PathBuf>,

        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List session ids
    List,

    /// Print a session record as JSON
    Show { id: String },

    /// Delete a session
    Delete { id: String },

    /// Remove sessions older than the configured TTL
    Clean {
        /// Override the TTL, in hours
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The hook must keep quiet unless asked otherwise.
    let default_filter = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Hook, false) => "warn",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { cwd } => commands::init::run(&commands::resolve_cwd(cwd)?)?,
        Commands::Hook => commands::hook::run().await?,
        Commands::Classify { prompt_count, json } => commands::classify::run(prompt_count, json)?,
        Commands::Session { cwd, action } => {
            let cwd = commands::resolve_cwd(cwd)?;
            match action {
                SessionAction::List => commands::session::list(&cwd)?,
                SessionAction::Show { id } => commands::session::show(&cwd, &id)?,
                SessionAction::Delete { id } => commands::session::delete(&cwd, &id)?,
                SessionAction::Clean { max_age_hours } => commands::session::clean(&cwd, max_age_hours)?,
            }
        }
    }

    Ok(())
}
