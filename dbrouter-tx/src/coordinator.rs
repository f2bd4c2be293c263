//! Cross-shard transaction coordinator.
//!
//! One coordinator belongs to one logical call. While a transaction is open
//! every connection the call acquires is enrolled here, at most one per
//! shard, and the coordinator alone decides when they commit, roll back and
//! close.
//!
//! # State machine
//!
//! ```text
//! Idle --open--> Open --complete_success--> Committing --> Idle
//!                  \---complete_failure---> RollingBack --> Idle
//! ```
//!
//! Completion is best effort: every enrolled connection gets its commit (or
//! rollback) and close attempt even if an earlier shard failed. A partially
//! committed transaction is a possible outcome; it shows up in [`TxOutcome`].

use std::fmt;

use dbrouter_core::DataSourceId;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, TransactionFlag};
use crate::error::{ConnectionError, TxError, TxResult};
use crate::session::ShardSession;

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    /// No transaction.
    #[default]
    Idle,
    /// A transaction is open and enrolling connections.
    Open,
    /// Committing enrolled connections.
    Committing,
    /// Rolling back enrolled connections.
    RollingBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Open => "open",
            Self::Committing => "committing",
            Self::RollingBack => "rolling back",
        };
        f.write_str(name)
    }
}

/// A per-shard operation that failed during completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    /// The shard.
    pub shard: DataSourceId,
    /// `commit`, `rollback` or `close`.
    pub operation: &'static str,
    /// The connection error.
    pub error: ConnectionError,
}

/// Result of completing a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutcome {
    /// Shards that took part, in registration order.
    pub shards: Vec<DataSourceId>,
    /// Operations that failed.
    pub failures: Vec<ShardFailure>,
}

impl TxOutcome {
    /// Returns true if every shard completed without error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the shards whose commit failed.
    #[must_use]
    pub fn failed_commits(&self) -> Vec<&DataSourceId> {
        self.failures
            .iter()
            .filter(|f| f.operation == "commit")
            .map(|f| &f.shard)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Ending {
    Commit,
    Rollback,
}

/// Drives commit or rollback across every shard touched by one call.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    state: TxState,
    flag: TransactionFlag,
    session: ShardSession,
}

impl TransactionCoordinator {
    /// Creates an idle coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> TxState {
        self.state
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    /// Returns the flag shared with enrolled connections.
    #[must_use]
    pub const fn flag(&self) -> &TransactionFlag {
        &self.flag
    }

    /// Returns the enrolled connections.
    #[must_use]
    pub const fn session(&self) -> &ShardSession {
        &self.session
    }

    /// Opens a transaction.
    ///
    /// # Errors
    /// Returns `TxError::InvalidState` unless the coordinator is idle.
    pub fn open_transaction(&mut self) -> TxResult<()> {
        if self.state != TxState::Idle {
            return Err(TxError::InvalidState {
                current: self.state,
                required: TxState::Idle,
            });
        }
        self.begin();
        Ok(())
    }

    fn begin(&mut self) {
        self.session = ShardSession::new();
        self.flag.open();
        self.state = TxState::Open;
        info!("cross-shard transaction opened");
    }

    /// Returns the connection already enrolled for `shard`.
    #[must_use]
    pub fn cached(&self, shard: &DataSourceId) -> Option<ConnectionHandle> {
        self.session.get(shard)
    }

    pub(crate) fn enroll(&mut self, connection: ConnectionHandle) {
        let shard = connection.shard().clone();
        if self.session.register(connection) {
            debug!(shard = %shard, enrolled = self.session.len(), "connection enrolled");
        }
    }

    /// Commits then closes every enrolled connection, in registration order.
    ///
    /// # Errors
    /// Returns `TxError::InvalidState` unless a transaction is open.
    /// Per-shard failures do not stop completion; they are logged and
    /// reported in the outcome.
    pub fn complete_success(&mut self) -> TxResult<TxOutcome> {
        self.require_open()?;
        Ok(self.finish(Ending::Commit))
    }

    /// Rolls back then closes every enrolled connection and hands `cause`
    /// back to the caller.
    ///
    /// Without an open transaction nothing is rolled back and `cause` is
    /// returned as is.
    pub fn complete_failure<E>(&mut self, cause: E) -> E {
        if self.is_open() {
            let outcome = self.finish(Ending::Rollback);
            if !outcome.is_clean() {
                warn!(
                    failures = outcome.failures.len(),
                    "rollback finished with failures"
                );
            }
        }
        cause
    }

    /// Drops enrolled connections and resets to idle without completing
    /// them.
    pub fn clear(&mut self) {
        let dropped = self.session.take();
        if !dropped.is_empty() {
            warn!(shards = dropped.len(), "discarding uncompleted shard connections");
        }
        self.flag.close();
        self.state = TxState::Idle;
    }

    /// Runs `call` inside a cross-shard transaction.
    ///
    /// Commits when `call` succeeds and rolls back when it fails or panics.
    /// The caller sees the call's own result; completion failures are only
    /// logged. If a transaction is already open the call joins it and the
    /// outer scope completes it.
    pub fn in_transaction<T, E, F>(&mut self, call: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        if self.is_open() {
            debug!("joining open cross-shard transaction");
            return call(self);
        }
        if self.state != TxState::Idle {
            self.clear();
        }
        self.begin();

        let mut scope = AbortOnDrop(self);
        let result = call(&mut *scope.0);
        let coordinator = &mut *scope.0;
        if !coordinator.is_open() {
            return result;
        }

        match result {
            Ok(value) => {
                let outcome = coordinator.finish(Ending::Commit);
                if !outcome.is_clean() {
                    error!(
                        shards = outcome.shards.len(),
                        failed = outcome.failures.len(),
                        "cross-shard transaction partially committed"
                    );
                }
                Ok(value)
            }
            Err(cause) => Err(coordinator.complete_failure(cause)),
        }
    }

    fn require_open(&self) -> TxResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TxError::InvalidState {
                current: self.state,
                required: TxState::Open,
            })
        }
    }

    fn finish(&mut self, ending: Ending) -> TxOutcome {
        let (state, operation) = match ending {
            Ending::Commit => (TxState::Committing, "commit"),
            Ending::Rollback => (TxState::RollingBack, "rollback"),
        };
        self.state = state;

        let connections = self.session.take();
        let mut outcome = TxOutcome {
            shards: connections.iter().map(|c| c.shard().clone()).collect(),
            failures: Vec::new(),
        };

        for connection in &connections {
            let shard = connection.shard();
            let completed = match ending {
                Ending::Commit => connection.commit_for_transaction(),
                Ending::Rollback => connection.rollback_for_transaction(),
            };
            if let Err(err) = completed {
                error!(shard = %shard, operation, error = %err, "shard completion failed");
                outcome.failures.push(ShardFailure {
                    shard: shard.clone(),
                    operation,
                    error: err,
                });
            }
            // Close even after a failed commit or rollback.
            if let Err(err) = connection.close_for_transaction() {
                error!(shard = %shard, error = %err, "shard close failed");
                outcome.failures.push(ShardFailure {
                    shard: shard.clone(),
                    operation: "close",
                    error: err,
                });
            }
        }

        self.flag.close();
        self.state = TxState::Idle;
        info!(
            operation,
            shards = outcome.shards.len(),
            failures = outcome.failures.len(),
            "cross-shard transaction completed"
        );
        outcome
    }
}

impl Drop for TransactionCoordinator {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("coordinator dropped with open transaction, rolling back");
            self.finish(Ending::Rollback);
        }
    }
}

/// Rolls back if the scope unwinds while the transaction is still open.
struct AbortOnDrop<'a>(&'a mut TransactionCoordinator);

impl Drop for AbortOnDrop<'_> {
    fn drop(&mut self) {
        if self.0.is_open() {
            warn!("transaction scope exited without completing, rolling back");
            self.0.finish(Ending::Rollback);
        }
    }
}
