//! Atomic single-file writes.
//!
//! Pattern:
//!   1. Write data to `{file}.tmp.{pid}` next to the target and fsync it
//!   2. [`replace_file`] the temporary onto the target
//!   3. On any failure, remove the temporary and return the original error
//!
//! A process killed at any point leaves the target either fully old or
//! fully new. An orphaned temporary is harmless.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::error;

/// Write `data` to `path` atomically, creating parent directories on demand.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp_path = temp_path(path);

    let result = (|| {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        drop(tmp);

        replace_file(&tmp_path, path)
    })();

    if let Err(e) = result {
        // The target was never opened for writing, only the temporary.
        let _ = fs::remove_file(&tmp_path);
        error!(path = %path.display(), error = %e, "Atomic write failed");
        return Err(e);
    }

    Ok(())
}

/// Move `tmp` onto `target`, replacing whatever is there.
///
/// Atomic on POSIX. On Windows `rename` refuses to overwrite, so the target
/// is unlinked first; a missing target is fine, any other removal error is
/// returned.
pub fn replace_file(tmp: &Path, target: &Path) -> io::Result<()> {
    if cfg!(windows) {
        match fs::remove_file(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    fs::rename(tmp, target)
}

/// Sibling temporary path, scoped by process id so concurrent processes
/// never share one.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}
