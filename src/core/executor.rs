//! IV-016: Executor — the two-phase orchestration loop.
//!
//! Vertices run serially in topological order. Phase 1 binds the
//! dependency environment and resolves the parameter tree into a
//! manifest; phase 2 looks the manifest's digest up in the store and
//! dispatches the operation on a miss. Sub-graph vertices recurse with
//! the same store and registry, their resolved manifest becoming the
//! inner context. Deduplication is not a separate mechanism: it is the
//! store being queried in phase 2.

use crate::core::hashing::manifest_digest;
use crate::core::params::resolve_params;
use crate::core::registry::OpRegistry;
use crate::core::resolver;
use crate::core::types::{Context, Graph, Manifest, Vertex};
use crate::core::value::Value;
use crate::errors::InvariantError;
use crate::expr::VariableEnv;
use crate::store::ArtifactStore;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation signal, checked between vertices and between
/// phases. Partial progress already written to a persistent store
/// survives cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runtime engine for executing graphs against a store and registry.
///
/// Context values are `Value`s by construction, so the "no float, no
/// byte string, no arbitrary object" contract is enforced by the type
/// system rather than a runtime walk; the same holds for operation
/// return values.
pub struct Executor<'a> {
    registry: &'a OpRegistry,
    store: &'a dyn ArtifactStore,
    cancel: CancelFlag,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a OpRegistry, store: &'a dyn ArtifactStore) -> Executor<'a> {
        Executor {
            registry,
            store,
            cancel: CancelFlag::new(),
        }
    }

    /// Executor observing an external cancellation flag.
    pub fn with_cancel(
        registry: &'a OpRegistry,
        store: &'a dyn ArtifactStore,
        cancel: CancelFlag,
    ) -> Executor<'a> {
        Executor {
            registry,
            store,
            cancel,
        }
    }

    /// Execute a graph and return one artifact per top-level vertex.
    /// Context keys are addressable as dependencies but never appear
    /// in the result map.
    pub fn execute(
        &self,
        graph: &Graph,
        context: &Context,
    ) -> Result<IndexMap<String, Value>, InvariantError> {
        let context_keys: Vec<String> = context.keys().cloned().collect();
        let order = resolver::resolve(graph, &context_keys, Some(self.registry))?;

        let mut artifacts: IndexMap<String, Value> = context.clone();

        for name in &order {
            if self.cancel.is_cancelled() {
                return Err(InvariantError::Cancelled(name.clone()));
            }

            let vertex = &graph[name.as_str()];

            // Phase 1: bind the environment and build the manifest.
            let mut env = VariableEnv::new();
            for dep in vertex.deps() {
                let artifact = artifacts.get(dep).cloned().ok_or_else(|| {
                    InvariantError::Validation(format!(
                        "vertex '{}' depends on '{}' but no artifact is bound; \
                         the execution order should have produced it",
                        name, dep
                    ))
                })?;
                env.insert(dep.clone(), artifact);
            }
            let manifest =
                resolve_params(vertex.params(), &env).map_err(|e| e.at_vertex(name))?;

            if self.cancel.is_cancelled() {
                return Err(InvariantError::Cancelled(name.clone()));
            }

            // Phase 2: cache lookup and dispatch.
            let artifact = match vertex {
                Vertex::Op { op_name, cache, .. } => {
                    if *cache {
                        let digest = manifest_digest(&manifest);
                        self.store
                            .get_or_compute(op_name, &digest, &mut || {
                                self.dispatch(op_name, &manifest)
                            })
                            .map_err(|e| e.at_vertex(name))?
                    } else {
                        // Ephemeral vertex: never consult or fill the store.
                        self.dispatch(op_name, &manifest)
                            .map_err(|e| e.at_vertex(name))?
                    }
                }
                Vertex::SubGraph { graph: inner, output, .. } => {
                    let inner_results = self.execute(inner, &manifest)?;
                    inner_results
                        .get(output)
                        .cloned()
                        .ok_or_else(|| {
                            InvariantError::Contract(format!(
                                "subgraph '{}' produced no artifact for output '{}'",
                                name, output
                            ))
                        })?
                }
            };

            artifacts.insert(name.clone(), artifact);
        }

        // One entry per top-level vertex; context bindings drop out.
        let mut results = IndexMap::new();
        for name in graph.keys() {
            if let Some(artifact) = artifacts.get(name) {
                results.insert(name.clone(), artifact.clone());
            }
        }
        Ok(results)
    }

    fn dispatch(&self, op_name: &str, manifest: &Manifest) -> Result<Value, InvariantError> {
        let op = self.registry.get(op_name)?;
        op(manifest)
    }
}
