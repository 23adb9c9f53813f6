//! IV-008: Graph validation and dependency ordering.
//!
//! Validates dependency references against the graph and context,
//! checks op registration when a registry is supplied, detects cycles
//! with three-colour DFS, and computes the execution order with Kahn's
//! algorithm. Context dependencies are pre-bound and contribute no
//! in-edges. Ties are broken by original vertex order so the output is
//! stable under unchanged graphs.

use crate::core::registry::OpRegistry;
use crate::core::types::{Graph, Vertex};
use crate::errors::InvariantError;
use std::collections::{HashMap, VecDeque};

/// Validate and topologically sort a graph.
pub fn resolve(
    graph: &Graph,
    context_keys: &[String],
    registry: Option<&OpRegistry>,
) -> Result<Vec<String>, InvariantError> {
    validate(graph, context_keys, registry)?;
    Ok(topological_sort(graph))
}

/// Validate a graph: every dependency exists in the graph or context,
/// every op vertex names a registered operation (when a registry is
/// given), and no cycle exists.
pub fn validate(
    graph: &Graph,
    context_keys: &[String],
    registry: Option<&OpRegistry>,
) -> Result<(), InvariantError> {
    for (name, vertex) in graph {
        for dep in vertex.deps() {
            if !graph.contains_key(dep) && !context_keys.iter().any(|k| k == dep) {
                return Err(InvariantError::Validation(format!(
                    "vertex '{}' depends on '{}', which is neither a vertex nor a context key",
                    name, dep
                )));
            }
        }
    }

    if let Some(registry) = registry {
        for (name, vertex) in graph {
            if let Vertex::Op { op_name, .. } = vertex {
                if !registry.has(op_name) {
                    return Err(InvariantError::Validation(format!(
                        "vertex '{}' references unregistered op '{}'",
                        name, op_name
                    )));
                }
            }
        }
    }

    if let Some(on_cycle) = find_cycle_vertex(graph) {
        return Err(InvariantError::Validation(format!(
            "graph contains a cycle through vertex '{}'",
            on_cycle
        )));
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Three-colour DFS cycle detection. Returns a vertex on a cycle, or
/// None when the graph is acyclic. Dependencies outside the graph
/// (context keys) cannot participate in cycles.
fn find_cycle_vertex(graph: &Graph) -> Option<String> {
    let mut colour: HashMap<&str, Colour> =
        graph.keys().map(|k| (k.as_str(), Colour::White)).collect();

    fn visit<'g>(
        name: &'g str,
        graph: &'g Graph,
        colour: &mut HashMap<&'g str, Colour>,
    ) -> Option<String> {
        match colour.get(name) {
            Some(Colour::Grey) => return Some(name.to_string()),
            Some(Colour::Black) | None => return None,
            Some(Colour::White) => {}
        }
        colour.insert(name, Colour::Grey);
        if let Some(vertex) = graph.get(name) {
            for dep in vertex.deps() {
                if graph.contains_key(dep) {
                    if let Some(found) = visit(dep.as_str(), graph, colour) {
                        return Some(found);
                    }
                }
            }
        }
        colour.insert(name, Colour::Black);
        None
    }

    for name in graph.keys() {
        if colour.get(name.as_str()) == Some(&Colour::White) {
            if let Some(found) = visit(name.as_str(), graph, &mut colour) {
                return Some(found);
            }
        }
    }
    None
}

/// Kahn's algorithm over graph edges only. The ready queue is seeded in
/// declaration order and newly-ready vertices are enqueued in
/// declaration order, so sibling order is deterministic.
pub fn topological_sort(graph: &Graph) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for name in graph.keys() {
        in_degree.insert(name.as_str(), 0);
        dependents.insert(name.as_str(), Vec::new());
    }

    for (name, vertex) in graph {
        for dep in vertex.deps() {
            if graph.contains_key(dep) {
                dependents.get_mut(dep.as_str()).unwrap().push(name.as_str());
                *in_degree.get_mut(name.as_str()).unwrap() += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = graph
        .keys()
        .map(String::as_str)
        .filter(|name| in_degree[*name] == 0)
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(graph.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut ready: Vec<&str> = Vec::new();
        for &dependent in &dependents[current] {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.push(dependent);
            }
        }
        ready.sort_by_key(|name| graph.get_index_of(*name));
        for name in ready {
            queue.push_back(name);
        }
    }

    order
}
