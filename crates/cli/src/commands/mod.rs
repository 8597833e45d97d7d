pub mod classify;
pub mod hook;
pub mod init;
pub mod session;

use std::path::PathBuf;

/// The explicit `--cwd`, or the process working directory.
pub fn resolve_cwd(cwd: Option<PathBuf>) -> std::io::Result<PathBuf> {
    match cwd {
        Some(path) => Ok(path),
        None => std::env::current_dir(),
    }
}
