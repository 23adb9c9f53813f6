//! Invariant — deterministic execution of DAGs of pure operations.
//!
//! Identical inputs always produce identical outputs, and work done
//! before (in this run, or a previous one against a persistent store)
//! is never repeated. Content-addressed caching keyed by
//! `(operation, manifest digest)`, SHA-256 throughout, no floats
//! anywhere.

pub mod core;
pub mod errors;
pub mod expr;
pub mod ops;
pub mod store;

pub use crate::core::executor::{CancelFlag, Executor};
pub use crate::core::hashing::{hash_manifest, hash_value, manifest_digest};
pub use crate::core::params::Param;
pub use crate::core::registry::{OpFn, OpRegistry};
pub use crate::core::types::{Context, Graph, Manifest, Vertex};
pub use crate::core::value::{DomainArtifact, Value};
pub use crate::errors::InvariantError;
pub use crate::store::{
    ArtifactStore, ChainStore, DiskStore, DomainTypeRegistry, MemoryStore, NullStore, StoreStats,
};
