//! IV-013: On-disk artifact store.
//!
//! Content-addressed layout: `<root>/<sanitized_op>/<digest[..2]>/<digest[2..]>`,
//! splitting the first two hex characters off as a directory prefix to
//! avoid flat directories of millions of files. Writes are atomic
//! (serialize to a `.tmp` sibling, then rename); a crash leaves either
//! the full artifact or nothing. A file that exists but fails to read
//! or decode is fatal, never a cache miss.

use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::store::codec::{decode, encode, DomainTypeRegistry};
use crate::store::{ArtifactStore, StoreStats};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_ROOT: &str = ".invariant/cache";

/// Replace filesystem-unsafe characters in an op name. Fixed rule so
/// different processes agree on the layout.
pub fn sanitize_op_name(op_name: &str) -> String {
    op_name.replace([':', '/'], "_")
}

pub struct DiskStore {
    root: PathBuf,
    types: DomainTypeRegistry,
    stats: Mutex<StoreStats>,
}

impl DiskStore {
    /// Store rooted at `.invariant/cache/` in the working directory.
    pub fn new() -> DiskStore {
        DiskStore::with_root(DEFAULT_ROOT)
    }

    pub fn with_root(root: impl AsRef<Path>) -> DiskStore {
        DiskStore::with_types(root, DomainTypeRegistry::new())
    }

    /// Store with a domain-type registry for decoding domain artifacts.
    pub fn with_types(root: impl AsRef<Path>, types: DomainTypeRegistry) -> DiskStore {
        DiskStore {
            root: root.as_ref().to_path_buf(),
            types,
            stats: Mutex::new(StoreStats::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the artifact path for a key.
    pub fn artifact_path(&self, op_name: &str, digest: &str) -> Result<PathBuf, InvariantError> {
        if digest.len() != 64 {
            return Err(InvariantError::StoreIo(format!(
                "invalid digest length {} (expected 64): '{}'",
                digest.len(),
                digest
            )));
        }
        Ok(self
            .root
            .join(sanitize_op_name(op_name))
            .join(&digest[..2])
            .join(&digest[2..]))
    }

    fn lock(&self) -> MutexGuard<'_, StoreStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DiskStore {
    fn default() -> Self {
        DiskStore::new()
    }
}

impl ArtifactStore for DiskStore {
    fn exists(&self, op_name: &str, digest: &str) -> Result<bool, InvariantError> {
        let present = self.artifact_path(op_name, digest)?.exists();
        if !present {
            self.lock().misses += 1;
        }
        Ok(present)
    }

    fn get(&self, op_name: &str, digest: &str) -> Result<Value, InvariantError> {
        let path = self.artifact_path(op_name, digest)?;
        if !path.exists() {
            self.lock().misses += 1;
            return Err(InvariantError::StoreIo(format!(
                "artifact ('{}', '{}') not found",
                op_name, digest
            )));
        }

        let data = std::fs::read(&path).map_err(|e| {
            InvariantError::StoreIo(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value = decode(&data, &self.types).map_err(|e| {
            InvariantError::StoreIo(format!("corrupt artifact {}: {}", path.display(), e))
        })?;
        self.lock().hits += 1;
        Ok(value)
    }

    fn put(&self, op_name: &str, digest: &str, artifact: &Value) -> Result<(), InvariantError> {
        let path = self.artifact_path(op_name, digest)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                InvariantError::StoreIo(format!("cannot create dir {}: {}", parent.display(), e))
            })?;
        }

        let data = encode(artifact)?;

        // Atomic write: temp file + rename.
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &data).map_err(|e| {
            InvariantError::StoreIo(format!("cannot write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            InvariantError::StoreIo(format!(
                "cannot rename {} -> {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        self.lock().puts += 1;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        *self.lock()
    }

    fn reset_stats(&self) {
        *self.lock() = StoreStats::default();
    }
}
