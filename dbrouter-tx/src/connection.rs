//! Physical connections and the shard-aware wrapper.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dbrouter_core::DataSourceId;
use tracing::trace;

use crate::error::ConnectionError;

/// A physical database connection.
pub trait Connection: Send {
    /// Executes a statement, returning the affected row count.
    ///
    /// # Errors
    /// Returns an error if the connection is closed or the database rejects
    /// the statement.
    fn execute(&mut self, sql: &str) -> Result<u64, ConnectionError>;

    /// Enables or disables automatic commit.
    ///
    /// # Errors
    /// Returns an error if the connection is closed.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), ConnectionError>;

    /// Returns true if every statement commits on its own.
    fn auto_commit(&self) -> bool;

    /// Commits the current transaction.
    ///
    /// # Errors
    /// Returns an error if the commit fails.
    fn commit(&mut self) -> Result<(), ConnectionError>;

    /// Rolls back the current transaction.
    ///
    /// # Errors
    /// Returns an error if the rollback fails.
    fn rollback(&mut self) -> Result<(), ConnectionError>;

    /// Releases the connection.
    ///
    /// # Errors
    /// Returns an error if the release fails.
    fn close(&mut self) -> Result<(), ConnectionError>;

    /// Returns true once the connection has been closed.
    fn is_closed(&self) -> bool;
}

/// A source of physical connections, shared by all concurrent calls.
pub trait DataSource: Send + Sync {
    /// Opens a connection.
    ///
    /// # Errors
    /// Returns an error if no connection can be obtained.
    fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Whether cross-shard transaction mode is active for one call.
///
/// Cloned into every connection the call opens, so connections observe the
/// mode without reaching for global state.
#[derive(Debug, Clone, Default)]
pub struct TransactionFlag(Arc<AtomicBool>);

impl TransactionFlag {
    /// Creates an inactive flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates cross-shard transaction mode.
    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Deactivates cross-shard transaction mode.
    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Returns true while cross-shard transaction mode is active.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Shared handle to a shard connection.
pub type ConnectionHandle = Arc<ShardAwareConnection>;

/// Connection wrapper with two operation sets.
///
/// The standalone set (`commit`, `close`) becomes a no-op while the call's
/// transaction flag is open; the coordinator owns commit and close timing
/// then. The transaction set (`*_for_transaction`) always reaches the
/// physical connection and is only driven by the coordinator.
pub struct ShardAwareConnection {
    shard: DataSourceId,
    inner: Mutex<Box<dyn Connection>>,
    flag: TransactionFlag,
}

impl ShardAwareConnection {
    /// Wraps a physical connection to `shard`.
    #[must_use]
    pub fn new(shard: DataSourceId, inner: Box<dyn Connection>, flag: TransactionFlag) -> Self {
        Self {
            shard,
            inner: Mutex::new(inner),
            flag,
        }
    }

    /// Returns the datasource this connection belongs to.
    #[must_use]
    pub const fn shard(&self) -> &DataSourceId {
        &self.shard
    }

    /// Returns true while commit and close are deferred to the coordinator.
    #[must_use]
    pub fn is_enrolled(&self) -> bool {
        self.flag.is_open()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Executes a statement.
    ///
    /// # Errors
    /// Returns the physical connection's error.
    pub fn execute(&self, sql: &str) -> Result<u64, ConnectionError> {
        self.lock().execute(sql)
    }

    /// Enables or disables automatic commit.
    ///
    /// # Errors
    /// Returns the physical connection's error.
    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<(), ConnectionError> {
        self.lock().set_auto_commit(auto_commit)
    }

    /// Returns true if every statement commits on its own.
    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.lock().auto_commit()
    }

    /// Commits, unless a cross-shard transaction is open.
    ///
    /// # Errors
    /// Returns the physical connection's error.
    pub fn commit(&self) -> Result<(), ConnectionError> {
        if self.is_enrolled() {
            trace!(shard = %self.shard, "commit deferred to cross-shard transaction");
            return Ok(());
        }
        self.lock().commit()
    }

    /// Rolls back.
    ///
    /// # Errors
    /// Returns the physical connection's error.
    pub fn rollback(&self) -> Result<(), ConnectionError> {
        self.lock().rollback()
    }

    /// Closes, unless a cross-shard transaction is open.
    ///
    /// # Errors
    /// Returns the physical connection's error.
    pub fn close(&self) -> Result<(), ConnectionError> {
        if self.is_enrolled() {
            trace!(shard = %self.shard, "close deferred to cross-shard transaction");
            return Ok(());
        }
        self.lock().close()
    }

    /// Returns true once the physical connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    pub(crate) fn commit_for_transaction(&self) -> Result<(), ConnectionError> {
        self.lock().commit()
    }

    pub(crate) fn rollback_for_transaction(&self) -> Result<(), ConnectionError> {
        self.lock().rollback()
    }

    pub(crate) fn close_for_transaction(&self) -> Result<(), ConnectionError> {
        self.lock().close()
    }
}

impl fmt::Debug for ShardAwareConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardAwareConnection")
            .field("shard", &self.shard)
            .field("enrolled", &self.is_enrolled())
            .finish_non_exhaustive()
    }
}
