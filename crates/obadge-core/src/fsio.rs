//! # Atomic File I/O
//!
//! Helpers for the file-backed stores: the wallet directory, the status
//! registry, the rendered status list, the request ledger and every published
//! credential artifact.
//!
//! ## Security Invariant
//!
//! A reader never observes a half-written file. [`write_atomic`] writes to a
//! sibling temp file created with `create_new` (so two writers cannot share
//! it), syncs it and then renames it over the target. On POSIX filesystems
//! the rename is atomic within a directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", std::process::id()))
}

/// Replace `path` with `bytes` in one rename, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let tmp = temp_sibling(path);
    // A stale temp file from a crashed run of this same pid is safe to drop.
    let _ = fs::remove_file(&tmp);

    let result = (|| {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StorageError::io(path, e)
    })
}

/// Serialize `value` as pretty JSON with a trailing newline and write it
/// atomically.
pub fn write_json_atomic(path: &Path, value: &impl Serialize) -> Result<(), StorageError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::json(path, e))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read a file, returning `None` if it does not exist.
pub fn read_bytes_opt(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Read and parse a JSON file, returning `None` if it does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match read_bytes_opt(path)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::json(path, e)),
        None => Ok(None),
    }
}

/// Delete a file or directory tree. Missing paths are not an error.
pub fn remove_path_if_exists(path: &Path) -> Result<(), StorageError> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| StorageError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs/profile/jane/index.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status-registry.json");
        write_json_atomic(&path, &json!({"next_index": 0})).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["status-registry.json".to_string()]);
    }

    #[test]
    fn json_is_pretty_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        write_json_atomic(&path, &json!({"a": 1})).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\n  \"a\": 1"));
    }

    #[test]
    fn read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(read_bytes_opt(&missing).unwrap().is_none());
        assert!(read_json_opt::<serde_json::Value>(&missing).unwrap().is_none());
    }

    #[test]
    fn read_malformed_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let err = read_json_opt::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, StorageError::Json { .. }));
    }

    #[test]
    fn remove_handles_files_dirs_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("profile/jane");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("a.json"), b"{}").unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"x").unwrap();

        remove_path_if_exists(&file).unwrap();
        remove_path_if_exists(&dir.path().join("profile")).unwrap();
        remove_path_if_exists(&dir.path().join("never-existed")).unwrap();
        assert!(!file.exists());
        assert!(!sub.exists());
    }
}
