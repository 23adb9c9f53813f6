//! IV-007: Graph vertices and the aliases that tie the engine together.
//!
//! Vertices are frozen at construction; the constructors enforce the
//! structural invariants so the executor never revalidates them.

use crate::core::params::{collect_refs, Param};
use crate::core::value::Value;
use crate::errors::InvariantError;
use indexmap::IndexMap;

/// A graph: vertex name -> vertex, in declaration order. Declaration
/// order is the deterministic tie-break for the execution order.
pub type Graph = IndexMap<String, Vertex>;

/// External bindings available as dependencies but excluded from results.
pub type Context = IndexMap<String, Value>;

/// A fully-resolved parameter map; its hash is the vertex's digest.
pub type Manifest = IndexMap<String, Value>;

/// A vertex in the DAG.
#[derive(Debug, Clone)]
pub enum Vertex {
    /// Executes a named operation against its resolved manifest.
    Op {
        op_name: String,
        params: IndexMap<String, Param>,
        deps: Vec<String>,
        /// When false the vertex is ephemeral: always dispatched,
        /// never read from or written to the store.
        cache: bool,
    },
    /// Expands to an internal graph at execution time. The resolved
    /// params become the inner graph's context; only the designated
    /// output vertex's artifact is visible to the parent.
    SubGraph {
        params: IndexMap<String, Param>,
        deps: Vec<String>,
        graph: Graph,
        output: String,
    },
}

impl Vertex {
    /// Build a cached op vertex.
    pub fn op(
        op_name: &str,
        params: IndexMap<String, Param>,
        deps: Vec<String>,
    ) -> Result<Vertex, InvariantError> {
        Vertex::op_with_cache(op_name, params, deps, true)
    }

    /// Build an ephemeral op vertex (never stored, always dispatched).
    pub fn op_uncached(
        op_name: &str,
        params: IndexMap<String, Param>,
        deps: Vec<String>,
    ) -> Result<Vertex, InvariantError> {
        Vertex::op_with_cache(op_name, params, deps, false)
    }

    pub fn op_with_cache(
        op_name: &str,
        params: IndexMap<String, Param>,
        deps: Vec<String>,
        cache: bool,
    ) -> Result<Vertex, InvariantError> {
        let trimmed = op_name.trim();
        if trimmed.is_empty() {
            return Err(InvariantError::Validation(
                "op_name cannot be empty".to_string(),
            ));
        }
        validate_refs(&params, &deps)?;
        Ok(Vertex::Op {
            op_name: trimmed.to_string(),
            params,
            deps,
            cache,
        })
    }

    /// Build a sub-graph vertex.
    pub fn subgraph(
        params: IndexMap<String, Param>,
        deps: Vec<String>,
        graph: Graph,
        output: &str,
    ) -> Result<Vertex, InvariantError> {
        if !graph.contains_key(output) {
            let keys: Vec<&str> = graph.keys().map(String::as_str).collect();
            return Err(InvariantError::Validation(format!(
                "subgraph output '{}' is not a vertex of the internal graph (vertices: {})",
                output,
                keys.join(", ")
            )));
        }
        validate_refs(&params, &deps)?;
        Ok(Vertex::SubGraph {
            params,
            deps,
            graph,
            output: output.to_string(),
        })
    }

    pub fn params(&self) -> &IndexMap<String, Param> {
        match self {
            Vertex::Op { params, .. } => params,
            Vertex::SubGraph { params, .. } => params,
        }
    }

    pub fn deps(&self) -> &[String] {
        match self {
            Vertex::Op { deps, .. } => deps,
            Vertex::SubGraph { deps, .. } => deps,
        }
    }
}

/// Every reference marker in the parameter tree must name a declared
/// dependency.
fn validate_refs(
    params: &IndexMap<String, Param>,
    deps: &[String],
) -> Result<(), InvariantError> {
    let mut refs = Vec::new();
    for param in params.values() {
        collect_refs(param, &mut refs);
    }
    for referenced in refs {
        if !deps.iter().any(|d| d == &referenced) {
            return Err(InvariantError::Validation(format!(
                "ref('{}') in params references undeclared dependency (declared deps: {})",
                referenced,
                deps.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: Vec<(&str, Param)>) -> IndexMap<String, Param> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_iv007_op_vertex_ok() {
        let v = Vertex::op(
            "add",
            params(vec![("a", Param::refer("x"))]),
            vec!["x".to_string()],
        )
        .unwrap();
        assert_eq!(v.deps(), &["x".to_string()]);
        assert!(matches!(v, Vertex::Op { cache: true, .. }));
    }

    #[test]
    fn test_iv007_empty_op_name_rejected() {
        let e = Vertex::op("   ", params(vec![]), vec![]).unwrap_err();
        assert!(matches!(e, InvariantError::Validation(_)));
    }

    #[test]
    fn test_iv007_op_name_is_trimmed() {
        let v = Vertex::op(" add ", params(vec![]), vec![]).unwrap();
        match v {
            Vertex::Op { op_name, .. } => assert_eq!(op_name, "add"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_iv007_undeclared_ref_rejected() {
        let e = Vertex::op("add", params(vec![("a", Param::refer("x"))]), vec![]).unwrap_err();
        assert!(e.to_string().contains("ref('x')"));
    }

    #[test]
    fn test_iv007_nested_ref_validated() {
        let tree = params(vec![(
            "wrapper",
            Param::List(vec![Param::Map(params(vec![("deep", Param::refer("y"))]))]),
        )]);
        let e = Vertex::op("add", tree, vec!["x".to_string()]).unwrap_err();
        assert!(e.to_string().contains("ref('y')"));
    }

    #[test]
    fn test_iv007_uncached_constructor() {
        let v = Vertex::op_uncached("add", params(vec![]), vec![]).unwrap();
        assert!(matches!(v, Vertex::Op { cache: false, .. }));
    }

    #[test]
    fn test_iv007_subgraph_output_must_exist() {
        let mut inner = Graph::new();
        inner.insert(
            "only".to_string(),
            Vertex::op("identity", params(vec![]), vec![]).unwrap(),
        );
        let ok = Vertex::subgraph(params(vec![]), vec![], inner.clone(), "only");
        assert!(ok.is_ok());
        let e = Vertex::subgraph(params(vec![]), vec![], inner, "missing").unwrap_err();
        assert!(e.to_string().contains("output 'missing'"));
    }

    #[test]
    fn test_iv007_subgraph_refs_validated() {
        let mut inner = Graph::new();
        inner.insert(
            "only".to_string(),
            Vertex::op("identity", params(vec![]), vec![]).unwrap(),
        );
        let e = Vertex::subgraph(
            params(vec![("left", Param::refer("x"))]),
            vec![],
            inner,
            "only",
        )
        .unwrap_err();
        assert!(e.to_string().contains("ref('x')"));
    }
}
