//! Log file handling
//!
//! The log file is rotated at startup: once it has grown past the size limit
//! it is moved to `<name>.1` (replacing an older backup) and a fresh file is
//! started. A single run writes far less than the limit, so checking once per
//! invocation keeps the file bounded for scheduled use.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Size after which the log file is rotated
pub const LOG_ROTATE_BYTES: u64 = 5 * 1024 * 1024;

fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".1");
    PathBuf::from(name)
}

/// Opens `path` for appending, rotating it first if it exceeds `max_bytes`
///
/// Only one backup is kept.
pub fn open_log_file(path: &Path, max_bytes: u64) -> io::Result<File> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.len() > max_bytes => {
            fs::rename(path, backup_path(path))?;
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_small_log_is_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.log");
        fs::write(&path, "first\n").unwrap();

        let mut file = open_log_file(&path, 1024).unwrap();
        writeln!(file, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_oversized_log_is_rotated_keeping_one_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.log");
        let backup = dir.path().join("sentinel.log.1");
        fs::write(&backup, "ancient").unwrap();
        fs::write(&path, "x".repeat(64)).unwrap();

        let mut file = open_log_file(&path, 32).unwrap();
        writeln!(file, "fresh").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "x".repeat(64));
    }

    #[test]
    fn test_missing_log_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.log");

        open_log_file(&path, LOG_ROTATE_BYTES).unwrap();
        assert!(path.exists());
    }
}
