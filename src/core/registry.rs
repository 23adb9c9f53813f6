//! IV-009: Operation registry.
//!
//! An explicit value constructed per embedding (or per test) and held
//! by the executor — no process-wide singleton. Operations are pure
//! callables over a manifest; the registry is read-only during
//! execution.

use crate::core::types::Manifest;
use crate::core::value::Value;
use crate::errors::InvariantError;
use indexmap::IndexMap;
use std::sync::Arc;

/// A registered operation: pure, manifest in, value out.
pub type OpFn = Arc<dyn Fn(&Manifest) -> Result<Value, InvariantError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct OpRegistry {
    ops: IndexMap<String, OpFn>,
}

impl OpRegistry {
    pub fn new() -> OpRegistry {
        OpRegistry::default()
    }

    /// Register a single operation. Names must be non-empty and unique.
    pub fn register(&mut self, name: &str, op: OpFn) -> Result<(), InvariantError> {
        if name.trim().is_empty() {
            return Err(InvariantError::Validation(
                "operation name cannot be empty".to_string(),
            ));
        }
        if self.ops.contains_key(name) {
            return Err(InvariantError::Validation(format!(
                "operation '{}' is already registered",
                name
            )));
        }
        self.ops.insert(name.to_string(), op);
        Ok(())
    }

    /// Register a plain function or closure without wrapping it first.
    pub fn register_fn<F>(&mut self, name: &str, op: F) -> Result<(), InvariantError>
    where
        F: Fn(&Manifest) -> Result<Value, InvariantError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(op))
    }

    /// Register a package of operations under a shared prefix, e.g.
    /// `register_package("poly", ...)` yields `poly:add`, `poly:multiply`.
    pub fn register_package(
        &mut self,
        prefix: &str,
        ops: Vec<(&str, OpFn)>,
    ) -> Result<(), InvariantError> {
        if prefix.trim().is_empty() {
            return Err(InvariantError::Validation(
                "package prefix cannot be empty".to_string(),
            ));
        }
        for (short_name, op) in ops {
            self.register(&format!("{}:{}", prefix, short_name), op)?;
        }
        Ok(())
    }

    /// Look up an operation. Missing operations are a dispatch error.
    pub fn get(&self, name: &str) -> Result<&OpFn, InvariantError> {
        self.ops
            .get(name)
            .ok_or_else(|| InvariantError::Dispatch(format!("op '{}' is not registered", name)))
    }

    pub fn has(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRegistry")
            .field("ops", &self.ops.keys().collect::<Vec<_>>())
            .finish()
    }
}
