//! Error types for the reactor engine.
//!
//! The core itself never fails on `value()`/`set_value()`. Errors come from
//! three places: binding registration (cycles), adapters (narrowing and
//! bounds), and dispatch setup (configuration, thread spawning).

use thiserror::Error;

use crate::graph::NodeId;

pub type ReactorResult<T> = Result<T, ReactorError>;

#[derive(Debug, Error)]
pub enum ReactorError {
    /// A dynamic value could not be narrowed to the adapter's concrete shape.
    #[error("type mismatch: expected {expected}: {error}")]
    TypeMismatch {
        expected: &'static str,
        #[source]
        error: serde_json::Error,
    },

    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("range {from}..{to} out of bounds for length {len}")]
    InvalidRange { from: usize, to: usize, len: usize },

    #[error("sequence is empty")]
    Empty,

    /// Registering the edge `from -> to` would close a cycle in the binding graph.
    #[error("binding {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("failed to start dispatch thread: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("invalid dispatch configuration: {0}")]
    Config(String),
}

impl ReactorError {
    /// Whether this is one of the sequence bounds failures.
    pub fn is_bounds(&self) -> bool {
        matches!(
            self,
            ReactorError::OutOfBounds { .. } | ReactorError::InvalidRange { .. } | ReactorError::Empty
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_family() {
        assert!(ReactorError::OutOfBounds { index: 3, len: 2 }.is_bounds());
        assert!(ReactorError::InvalidRange { from: 2, to: 1, len: 4 }.is_bounds());
        assert!(ReactorError::Empty.is_bounds());
        assert!(!ReactorError::Config("x".into()).is_bounds());
    }

    #[test]
    fn messages_name_the_failure() {
        let err = ReactorError::OutOfBounds { index: 5, len: 3 };
        assert_eq!(err.to_string(), "index 5 out of bounds for length 3");

        let err = ReactorError::Cycle { from: NodeId::from(1), to: NodeId::from(2) };
        assert_eq!(err.to_string(), "binding #1 -> #2 would create a cycle");
    }
}
