//! Append-only JSON array files
//!
//! Each append reads the whole array, pushes one entry and rewrites the
//! file. A file that holds text but does not parse as an array is moved
//! aside to `<name>.bak` and started over; any other read failure is an
//! error and leaves the file untouched.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Contents of a journal file on disk
enum Journal<T> {
    Entries(Vec<T>),
    /// Readable text that is not a JSON array of entries
    Corrupt(serde_json::Error),
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Journal<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Journal::Entries(Vec::new()));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(match serde_json::from_str(&content) {
        Ok(entries) => Journal::Entries(entries),
        Err(e) => Journal::Corrupt(e),
    })
}

/// Where a corrupt journal is moved before starting over
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Read every entry; a missing or unparseable file yields no entries
///
/// # Errors
///
/// Returns error if the file exists but cannot be read as UTF-8 text
pub fn read_entries<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match load(path)? {
        Journal::Entries(entries) => Ok(entries),
        Journal::Corrupt(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt journal");
            Ok(Vec::new())
        }
    }
}

/// Append `entry` and rewrite the file, returning the new entry count
///
/// # Errors
///
/// Returns error if the existing file cannot be read or the new one written
pub fn append_entry<T: Serialize + DeserializeOwned>(path: &Path, entry: T) -> Result<usize> {
    let mut entries: Vec<T> = match load(path)? {
        Journal::Entries(entries) => entries,
        Journal::Corrupt(e) => {
            let backup = backup_path(path);
            std::fs::rename(path, &backup)?;
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                error = %e,
                "corrupt journal moved aside, starting over"
            );
            Vec::new()
        }
    };
    entries.push(entry);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&entries)?)?;

    tracing::debug!(path = %path.display(), entries = entries.len(), "journal updated");
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/log.json");

        assert_eq!(append_entry(&path, 1u32).unwrap(), 1);
        assert_eq!(append_entry(&path, 2u32).unwrap(), 2);
        assert_eq!(read_entries::<u32>(&path).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_corrupt_file_moves_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(read_entries::<u32>(&path).unwrap().is_empty());
        assert_eq!(append_entry(&path, 7u32).unwrap(), 1);
        assert_eq!(read_entries::<u32>(&path).unwrap(), vec![7]);

        let backup = dir.path().join("log.json.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "[1, 2");
    }

    #[test]
    fn test_unreadable_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut bytes = b"[1, 2] ".to_vec();
        bytes.push(0xE9);
        std::fs::write(&path, &bytes).unwrap();

        assert!(read_entries::<u32>(&path).is_err());
        assert!(append_entry(&path, 3u32).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(!backup_path(&path).exists());
    }
}
