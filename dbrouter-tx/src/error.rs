//! Connection and transaction error types.

use dbrouter_core::DataSourceId;
use thiserror::Error;

use crate::coordinator::TxState;

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TxError>;

/// Errors raised by a physical connection or datasource.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// No datasource is registered under the routed identifier.
    #[error("datasource '{id}' is not configured")]
    UnknownDataSource {
        /// The identifier that was routed to.
        id: DataSourceId,
    },

    /// The connection was already closed.
    #[error("connection is closed")]
    Closed,

    /// The datasource has no free connections.
    #[error("datasource '{id}' exhausted: {active} active (max {max})")]
    PoolExhausted {
        /// The datasource.
        id: DataSourceId,
        /// Connections currently open.
        active: u32,
        /// Maximum open connections.
        max: u32,
    },

    /// The database rejected an operation.
    #[error("{operation} failed: {message}")]
    Backend {
        /// The operation that failed.
        operation: &'static str,
        /// Error message from the database.
        message: String,
    },
}

/// Errors from the transaction coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The coordinator is not in the state the operation needs.
    #[error("invalid transaction state: in {current}, need {required}")]
    InvalidState {
        /// The current state.
        current: TxState,
        /// The required state.
        required: TxState,
    },

    /// A connection operation failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectionError::UnknownDataSource {
            id: DataSourceId::new("db09"),
        };
        assert_eq!(err.to_string(), "datasource 'db09' is not configured");

        let err = TxError::InvalidState {
            current: TxState::Open,
            required: TxState::Idle,
        };
        assert_eq!(err.to_string(), "invalid transaction state: in open, need idle");
    }

    #[test]
    fn test_connection_error_converts() {
        let err: TxError = ConnectionError::Closed.into();
        assert_eq!(err.to_string(), "connection is closed");
    }
}
