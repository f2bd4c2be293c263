//! Routing-aware datasource.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dbrouter_core::{DataSourceId, RoutingContext};
use tracing::{debug, trace, warn};

use crate::connection::{
    Connection, ConnectionHandle, DataSource, ShardAwareConnection, TransactionFlag,
};
use crate::coordinator::TransactionCoordinator;
use crate::error::ConnectionError;

/// Picks the physical datasource for a call from its routing context.
///
/// Targets are shared across all calls; per-call state lives in the
/// [`RoutingContext`] and [`TransactionCoordinator`] passed in.
pub struct DynamicDataSource {
    targets: HashMap<DataSourceId, Arc<dyn DataSource>>,
    default: DataSourceId,
}

impl DynamicDataSource {
    /// Creates a datasource with no targets, falling back to `default`.
    #[must_use]
    pub fn new(default: impl Into<DataSourceId>) -> Self {
        Self {
            targets: HashMap::new(),
            default: default.into(),
        }
    }

    /// Adds a target.
    #[must_use]
    pub fn with_target(mut self, id: impl Into<DataSourceId>, target: Arc<dyn DataSource>) -> Self {
        self.add_target(id, target);
        self
    }

    /// Adds or replaces a target.
    pub fn add_target(&mut self, id: impl Into<DataSourceId>, target: Arc<dyn DataSource>) {
        self.targets.insert(id.into(), target);
    }

    /// Returns true if `id` is a registered target.
    #[must_use]
    pub fn contains(&self, id: &DataSourceId) -> bool {
        self.targets.contains_key(id)
    }

    /// Returns the registered target identifiers, sorted.
    #[must_use]
    pub fn targets(&self) -> Vec<DataSourceId> {
        let mut ids: Vec<_> = self.targets.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Returns the fallback datasource.
    #[must_use]
    pub const fn default_id(&self) -> &DataSourceId {
        &self.default
    }

    /// Returns `db` + the routed db key, or the default when unrouted.
    #[must_use]
    pub fn determine_target(&self, ctx: &RoutingContext) -> DataSourceId {
        ctx.datasource().unwrap_or_else(|| self.default.clone())
    }

    fn connect(&self, id: &DataSourceId) -> Result<Box<dyn Connection>, ConnectionError> {
        let target = self
            .targets
            .get(id)
            .ok_or_else(|| ConnectionError::UnknownDataSource { id: id.clone() })?;
        target.connect()
    }

    /// Returns a connection for the routed shard.
    ///
    /// Outside a transaction every call opens a fresh standalone connection.
    /// Inside one, the first call per shard opens a connection, disables
    /// automatic commit and enrolls it; later calls return the same handle.
    ///
    /// # Errors
    /// Returns `ConnectionError::UnknownDataSource` if the routed datasource
    /// is not registered, or the target's connect error.
    pub fn acquire_connection(
        &self,
        ctx: &RoutingContext,
        coordinator: &mut TransactionCoordinator,
    ) -> Result<ConnectionHandle, ConnectionError> {
        let shard = self.determine_target(ctx);

        if !coordinator.is_open() {
            trace!(shard = %shard, "standalone connection");
            let inner = self.connect(&shard)?;
            return Ok(Arc::new(ShardAwareConnection::new(
                shard,
                inner,
                TransactionFlag::new(),
            )));
        }

        if let Some(cached) = coordinator.cached(&shard) {
            trace!(shard = %shard, "reusing enrolled connection");
            return Ok(cached);
        }

        let inner = self.connect(&shard)?;
        let connection = Arc::new(ShardAwareConnection::new(
            shard.clone(),
            inner,
            coordinator.flag().clone(),
        ));
        if let Err(err) = connection.set_auto_commit(false) {
            // Never enrolled, so the coordinator won't close it.
            if let Err(close_err) = connection.close_for_transaction() {
                warn!(shard = %shard, error = %close_err, "failed to close unenrolled connection");
            }
            return Err(err);
        }
        coordinator.enroll(Arc::clone(&connection));
        debug!(shard = %shard, "opened transactional connection");
        Ok(connection)
    }
}

impl fmt::Debug for DynamicDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicDataSource")
            .field("targets", &self.targets())
            .field("default", &self.default)
            .finish()
    }
}
