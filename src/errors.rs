//! Error taxonomy for the execution engine.
//!
//! One variant per failure kind. Every error aborts the current
//! `execute` call; nothing is caught or retried inside the engine.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// Graph or vertex structure is invalid (missing dep, unknown op,
    /// cycle, undeclared ref, bad wire document).
    #[error("validation: {0}")]
    Validation(String),

    /// Parameter or expression resolution failed (parse error,
    /// undefined variable, type mismatch, float result).
    #[error("resolution: {0}")]
    Resolution(String),

    /// Operation dispatch failed (op not registered, missing required
    /// manifest key, unusable manifest value).
    #[error("dispatch: {0}")]
    Dispatch(String),

    /// An engine contract was broken by a collaborator.
    #[error("contract: {0}")]
    Contract(String),

    /// Store read/write failure. A corrupt on-disk artifact is fatal,
    /// never a cache miss.
    #[error("store i/o: {0}")]
    StoreIo(String),

    /// Cancellation observed between vertices. Names the vertex that
    /// was about to run.
    #[error("cancelled before vertex '{0}'")]
    Cancelled(String),
}

impl InvariantError {
    /// Re-wrap an error with a vertex prefix, preserving its kind.
    pub(crate) fn at_vertex(self, vertex: &str) -> InvariantError {
        match self {
            InvariantError::Validation(m) => {
                InvariantError::Validation(format!("vertex '{}': {}", vertex, m))
            }
            InvariantError::Resolution(m) => {
                InvariantError::Resolution(format!("vertex '{}': {}", vertex, m))
            }
            InvariantError::Dispatch(m) => {
                InvariantError::Dispatch(format!("vertex '{}': {}", vertex, m))
            }
            InvariantError::Contract(m) => {
                InvariantError::Contract(format!("vertex '{}': {}", vertex, m))
            }
            InvariantError::StoreIo(m) => {
                InvariantError::StoreIo(format!("vertex '{}': {}", vertex, m))
            }
            InvariantError::Cancelled(v) => InvariantError::Cancelled(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_kind() {
        let e = InvariantError::Resolution("undefined variable 'x'".to_string());
        assert_eq!(e.to_string(), "resolution: undefined variable 'x'");
    }

    #[test]
    fn test_at_vertex_preserves_kind() {
        let e = InvariantError::Dispatch("op 'add' is not registered".to_string());
        let wrapped = e.at_vertex("sum");
        assert!(matches!(wrapped, InvariantError::Dispatch(_)));
        assert!(wrapped.to_string().contains("vertex 'sum'"));
    }

    #[test]
    fn test_at_vertex_keeps_cancelled_vertex() {
        let e = InvariantError::Cancelled("sum".to_string());
        assert_eq!(e.clone().at_vertex("other"), e);
    }
}
