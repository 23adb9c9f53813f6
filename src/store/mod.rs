//! Artifact stores — content-addressed caches keyed by `(op_name, digest)`.
//!
//! The composite key matters: two different operations can receive
//! identical manifests and produce different outputs, so the digest
//! alone is not a cache key.

pub mod chain;
pub mod codec;
pub mod disk;
pub mod memory;
pub mod null;

pub use chain::ChainStore;
pub use codec::{ByteReader, DomainTypeRegistry};
pub use disk::DiskStore;
pub use memory::{CachePolicy, LfuPolicy, LruPolicy, MemoryStore, UnboundedPolicy};
pub use null::NullStore;

use crate::core::value::Value;
use crate::errors::InvariantError;

/// Hit/miss/put counters. A hit is an artifact served by `get`; a miss
/// is a lookup that found nothing (`exists` returning false, or `get`
/// on an absent key).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
}

/// Content-addressed artifact storage.
///
/// `put` is idempotent: writing twice under the same key leaves the
/// store with the same visible content. Implementations take `&self`
/// and guard their interior state, so a store may be shared across
/// threads by an embedding even though the engine itself is serial.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, op_name: &str, digest: &str) -> Result<bool, InvariantError>;

    /// Retrieve an artifact; absence is an error (callers check
    /// `exists` or use [`ArtifactStore::get_or_compute`]).
    fn get(&self, op_name: &str, digest: &str) -> Result<Value, InvariantError>;

    fn put(&self, op_name: &str, digest: &str, artifact: &Value) -> Result<(), InvariantError>;

    fn stats(&self) -> StoreStats;

    fn reset_stats(&self);

    /// Cache-or-dispatch in one step: return the cached artifact, or
    /// run `compute`, persist its result, and return it.
    fn get_or_compute(
        &self,
        op_name: &str,
        digest: &str,
        compute: &mut dyn FnMut() -> Result<Value, InvariantError>,
    ) -> Result<Value, InvariantError> {
        if self.exists(op_name, digest)? {
            return self.get(op_name, digest);
        }
        let artifact = compute()?;
        self.put(op_name, digest, &artifact)?;
        Ok(artifact)
    }
}
