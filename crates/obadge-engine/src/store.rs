//! # Change Sets
//!
//! A request never edits files in place. Its handler collects every write
//! and delete into a [`ChangeSet`]; the dispatcher commits the set only once
//! every sub-step (directory, signing, status list, baking) has succeeded.
//!
//! ## Commit protocol
//!
//! 1. Operations run in insertion order. Artifacts are queued first, the
//!    status list next, and the registries and ledger last, so the
//!    registries only ever point at artifacts that already exist.
//! 2. Before each file is replaced or deleted, its previous bytes (or its
//!    absence) are captured.
//! 3. Each write is temp-file, `fsync`, rename.
//! 4. If any operation fails, every file already touched is restored from
//!    the captured bytes, newest first, and the error is returned.

use std::path::{Path, PathBuf};

use obadge_core::fsio::{read_bytes_opt, remove_path_if_exists, write_atomic};
use obadge_core::StorageError;

/// One queued file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    /// Replace the file with these bytes.
    Write(Vec<u8>),
    /// Delete the file.
    Delete,
}

/// Ordered file operations of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    ops: Vec<(PathBuf, FileOp)>,
}

impl ChangeSet {
    /// Queue a write. A later operation on the same path replaces an
    /// earlier one but keeps its position.
    pub fn write(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.push(path.into(), FileOp::Write(bytes));
    }

    /// Queue a delete.
    pub fn delete(&mut self, path: impl Into<PathBuf>) {
        self.push(path.into(), FileOp::Delete);
    }

    fn push(&mut self, path: PathBuf, op: FileOp) {
        match self.ops.iter_mut().find(|(p, _)| *p == path) {
            Some(slot) => slot.1 = op,
            None => self.ops.push((path, op)),
        }
    }

    /// Queued operations in commit order.
    pub fn ops(&self) -> &[(PathBuf, FileOp)] {
        &self.ops
    }

    /// The pending operation on `path`.
    pub fn get(&self, path: &Path) -> Option<&FileOp> {
        self.ops.iter().find(|(p, _)| p == path).map(|(_, op)| op)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation, restoring all touched files on failure.
    pub fn commit(self) -> Result<(), StorageError> {
        let mut undo: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(self.ops.len());
        for (path, op) in &self.ops {
            let step = read_bytes_opt(path).and_then(|before| {
                let result = match op {
                    FileOp::Write(bytes) => write_atomic(path, bytes),
                    FileOp::Delete => remove_path_if_exists(path),
                };
                undo.push((path.clone(), before));
                result
            });
            if let Err(e) = step {
                tracing::error!(path = %path.display(), error = %e, "commit failed, rolling back");
                rollback(undo);
                return Err(e);
            }
        }
        for (path, op) in &self.ops {
            if matches!(op, FileOp::Delete) {
                prune_empty_parents(path);
            }
        }
        tracing::debug!(ops = self.ops.len(), "change set committed");
        Ok(())
    }
}

fn rollback(undo: Vec<(PathBuf, Option<Vec<u8>>)>) {
    for (path, before) in undo.into_iter().rev() {
        let restored = match &before {
            Some(bytes) => write_atomic(&path, bytes),
            None => remove_path_if_exists(&path),
        };
        if let Err(e) = restored {
            tracing::error!(path = %path.display(), error = %e, "rollback could not restore file");
        }
    }
}

/// Remove now-empty credential and wallet directories left by deletes.
fn prune_empty_parents(path: &Path) {
    let mut dir = path.parent();
    for _ in 0..2 {
        match dir {
            Some(d) if std::fs::remove_dir(d).is_ok() => dir = d.parent(),
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_writes_and_deletes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("w/x/b.json");
        std::fs::write(&a, b"old").unwrap();

        let mut cs = ChangeSet::default();
        cs.write(&b, b"new-b".to_vec());
        cs.delete(&a);
        cs.commit().unwrap();

        assert!(!a.exists());
        assert_eq!(std::fs::read(&b).unwrap(), b"new-b");
    }

    #[test]
    fn later_op_on_same_path_wins_in_place() {
        let mut cs = ChangeSet::default();
        cs.write("x", b"1".to_vec());
        cs.write("y", b"2".to_vec());
        cs.delete("x");
        assert_eq!(cs.len(), 2);
        assert_eq!(cs.ops()[0], (PathBuf::from("x"), FileOp::Delete));
    }

    #[test]
    fn failure_restores_every_touched_file() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.json");
        let created = dir.path().join("created.json");
        std::fs::write(&kept, b"original").unwrap();
        // A regular file where a directory is needed makes the last write fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let mut cs = ChangeSet::default();
        cs.write(&kept, b"replaced".to_vec());
        cs.write(&created, b"fresh".to_vec());
        cs.write(blocker.join("child.json"), b"never".to_vec());
        assert!(cs.commit().is_err());

        assert_eq!(std::fs::read(&kept).unwrap(), b"original");
        assert!(!created.exists());
    }

    #[test]
    fn deletes_prune_empty_artifact_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("profile/jane/tsc/credential.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"{}").unwrap();

        let mut cs = ChangeSet::default();
        cs.delete(&file);
        cs.commit().unwrap();
        assert!(!dir.path().join("profile/jane").exists());
        assert!(dir.path().join("profile").exists());
    }
}
