//! Routing error types.

use thiserror::Error;

use crate::value::KeyType;

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors that can occur while routing an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No argument supplied a routing key.
    #[error("sharding field '{field}' can't be found in args")]
    MissingRoutingKey {
        /// The declared key field.
        field: String,
    },

    /// The named algorithm is not registered.
    #[error("sharding algorithm '{name}' is not registered")]
    AlgorithmNotFound {
        /// The requested algorithm name.
        name: String,
    },

    /// The routing key's type is not accepted by the algorithm.
    #[error("routing key of type {actual} can't be passed to algorithm '{algorithm}' expecting {expected}")]
    KeyTypeMismatch {
        /// The algorithm name.
        algorithm: String,
        /// The algorithm's declared key type.
        expected: KeyType,
        /// The runtime type of the routing key.
        actual: KeyType,
    },

    /// The algorithm strategy was used before an algorithm was configured.
    #[error("no sharding algorithm configured")]
    AlgorithmNotConfigured,
}

impl RoutingError {
    /// Returns true if the operation may proceed unrouted after this error.
    ///
    /// Only a missing routing key aborts the operation.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingRoutingKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_fatal() {
        let err = RoutingError::MissingRoutingKey {
            field: "uid".to_string(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "sharding field 'uid' can't be found in args");
    }

    #[test]
    fn test_algorithm_errors_are_recoverable() {
        let not_found = RoutingError::AlgorithmNotFound {
            name: "by_region".to_string(),
        };
        let mismatch = RoutingError::KeyTypeMismatch {
            algorithm: "modulo".to_string(),
            expected: KeyType::Number,
            actual: KeyType::Text,
        };
        assert!(not_found.is_recoverable());
        assert!(mismatch.is_recoverable());
        assert!(RoutingError::AlgorithmNotConfigured.is_recoverable());
        assert!(mismatch.to_string().contains("expecting number"));
    }
}
