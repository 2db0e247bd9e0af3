//! Error types for the computation cache.
//!
//! Every failure the cache reports is a precondition or programming error:
//! given the same snapshot and the same inputs, the same error comes back.

use thiserror::Error;

/// Unified error type for all cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// A primitive node was read before a value was ever set on it.
    #[error("primitive node '{key}' has not been initialized")]
    PrimitiveValueNotInitialized { key: String },

    /// An externally computed node was required, but no value has been
    /// supplied since it was last invalidated.
    #[error("externally computed node '{key}' has no value; it must be set by the caller")]
    ExternallyComputableValueUnavailable { key: String },

    /// The operation is not supported for this kind of node.
    #[error("unsupported operation on node '{key}': {reason}")]
    UnsupportedOperation { key: String, reason: String },

    /// Two declarations share the same key.
    #[error("duplicate node key '{key}'")]
    DuplicateKey { key: String },

    /// A declaration references a parent that was never declared.
    #[error("node '{node}' depends on undeclared node '{parent}'")]
    UndeclaredParent { node: String, parent: String },

    /// The declared dependencies contain at least one cycle.
    #[error("cyclic dependency among nodes: {}", keys.join(", "))]
    CyclicDependency { keys: Vec<String> },

    /// No node with this key exists in the graph.
    #[error("unknown node '{key}'")]
    UnknownNode { key: String },

    /// `fetch_directly` was called on a node without a ready value.
    #[error("value of node '{key}' is not directly available")]
    ValueNotDirectlyAvailable { key: String },

    /// A node function asked for a value that is not among its parents.
    #[error("parent value '{parent}' not found")]
    ParentValueNotFound { parent: String },

    /// A stored value does not have the type the reader expected.
    #[error("value of '{key}' is not a {expected}")]
    ValueTypeMismatch { key: String, expected: &'static str },

    /// Array data and shape disagree in element count.
    #[error("shape mismatch: expected {expected} elements, found {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Malformed cache configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// True for the two "value not there yet" kinds, which best-effort
    /// updates skip instead of reporting.
    pub fn is_value_unavailable(&self) -> bool {
        matches!(
            self,
            CacheError::PrimitiveValueNotInitialized { .. }
                | CacheError::ExternallyComputableValueUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_values_are_unavailable() {
        let uninit = CacheError::PrimitiveValueNotInitialized { key: "x".into() };
        let external = CacheError::ExternallyComputableValueUnavailable { key: "g".into() };
        let unsupported = CacheError::UnsupportedOperation {
            key: "f".into(),
            reason: "not externally computed".into(),
        };

        assert!(uninit.is_value_unavailable());
        assert!(external.is_value_unavailable());
        assert!(!unsupported.is_value_unavailable());
        assert!(!CacheError::DuplicateKey { key: "x".into() }.is_value_unavailable());
    }

    #[test]
    fn cycle_message_lists_keys() {
        let err = CacheError::CyclicDependency {
            keys: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency among nodes: a, b");
    }
}
