//! Error types for dbrouter core values.

use std::fmt;

/// The result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or validating core values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// A resource limit was exceeded.
    LimitExceeded {
        /// Which limit was exceeded.
        limit: &'static str,
        /// The maximum allowed value.
        max: u64,
        /// The actual value that exceeded the limit.
        actual: u64,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::LimitExceeded { limit, max, actual } => {
                write!(f, "limit exceeded: {limit} (max={max}, actual={actual})")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument {
            name: "tb_count",
            reason: "must be a power of two",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'tb_count': must be a power of two"
        );
    }

    #[test]
    fn test_limit_exceeded_display() {
        let err = Error::LimitExceeded {
            limit: "total_shards",
            max: 65_536,
            actual: 131_072,
        };
        let msg = format!("{err}");
        assert!(msg.contains("total_shards"));
        assert!(msg.contains("65536"));
        assert!(msg.contains("131072"));
    }
}
