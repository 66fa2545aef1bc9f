//! Staging file management module
//!
//! This module provides RAII-based staging files for atomic writes: data is
//! written next to its destination and renamed over it once complete.

use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Guard for a staging file that is removed on drop unless it was persisted
#[derive(Debug)]
pub(crate) struct TempGuard {
    path: PathBuf,
    persisted: bool,
}

impl TempGuard {
    /// Get the path to the staging file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the staging file over `target`, replacing it atomically.
    pub(crate) fn persist(mut self, target: &Path) -> io::Result<()> {
        fs::rename(&self.path, target)?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.persisted {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Writes `content` to a fresh staging file in the same directory as `target`
///
/// The staging file name combines the target's file name with a ULID
/// (monotonic, sortable unique identifier), so it lives on the same file
/// system as the target and a later rename is atomic. The content is flushed
/// to disk before the guard is returned.
///
/// # Examples
///
/// ```ignore
/// let staged = stage_file(Path::new("snapshot.json"), b"{}")?;
/// staged.persist(Path::new("snapshot.json"))?;
/// ```
pub(crate) fn stage_file(target: &Path, content: &[u8]) -> io::Result<TempGuard> {
    let directory = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "staging".to_string());

    let ulid = ulid::Ulid::new();
    let path = directory.join(format!(".{}.{}.tmp", file_name, ulid));

    let guard = TempGuard {
        path,
        persisted: false,
    };

    let mut file = File::create(guard.path())?;
    file.write_all(content)?;
    file.sync_all()?;

    Ok(guard)
}
