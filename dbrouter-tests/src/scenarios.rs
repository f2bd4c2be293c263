//! Reusable harness for integration scenarios.
//!
//! The harness owns a router over `db_count x tb_count` shards and one
//! in-memory datasource per database, all recording into a shared log.
//! Each call gets its own [`RoutingContext`] and, when transactional, its
//! own [`TransactionCoordinator`].

use std::sync::Arc;

use dbrouter_core::{DataSourceId, RouterConfig, RoutingContext};
use dbrouter_routing::{
    AlgorithmRegistry, Argument, InvokeError, ModuloSharding, OperationSpec, RoutingError,
    RoutingValue, ShardRouter,
};
use dbrouter_tx::{
    ConnectionError, DataSource, DynamicDataSource, EventLog, MemoryDataSource,
    TransactionCoordinator,
};
use tracing::debug;

/// Keys with known placements on a 2 x 4 topology with the default hash.
pub mod keys {
    /// Routes to `db01`, table `_003`.
    pub const DB01: &str = "hello";
    /// Routes to `db02`, table `_000`.
    pub const DB02: &str = "user-1";
    /// Routes to `db01`, table `_002`.
    pub const DB01_OTHER_TABLE: &str = "user-3";
}

/// Failure of a harness call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScenarioError {
    /// Routing failed before the operation ran.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// A connection operation failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The business operation failed on purpose.
    #[error("business rule violated: {0}")]
    Business(String),
}

impl From<InvokeError<Self>> for ScenarioError {
    fn from(err: InvokeError<Self>) -> Self {
        match err {
            InvokeError::Routing(e) => Self::Routing(e),
            InvokeError::Operation(e) => e,
        }
    }
}

/// Router, datasources and log for one scenario.
#[derive(Debug)]
pub struct Harness {
    /// The router.
    pub router: ShardRouter,
    /// The routing-aware datasource.
    pub datasource: DynamicDataSource,
    /// One in-memory datasource per database, `db01` first.
    pub shards: Vec<Arc<MemoryDataSource>>,
    /// Log shared by every shard.
    pub log: EventLog,
}

impl Harness {
    /// Creates a harness with the `modulo` algorithm registered.
    ///
    /// # Panics
    ///
    /// Panics if the counts are not a valid topology.
    #[must_use]
    pub fn new(db_count: u32, tb_count: u32) -> Self {
        let config = RouterConfig::new(db_count, tb_count).expect("valid topology");
        let mut algorithms = AlgorithmRegistry::new();
        algorithms.register("modulo", move || {
            Box::new(ModuloSharding::new(db_count, tb_count))
        });

        let log = EventLog::new();
        let mut datasource = DynamicDataSource::new("db01");
        let mut shards = Vec::new();
        for db in 1..=db_count {
            let id = DataSourceId::new(format!("db{db:02}"));
            let shard = Arc::new(MemoryDataSource::with_log(id.clone(), log.clone()));
            datasource.add_target(id, Arc::clone(&shard) as Arc<dyn DataSource>);
            shards.push(shard);
        }

        Self {
            router: ShardRouter::new(config).with_algorithms(Arc::new(algorithms)),
            datasource,
            shards,
            log,
        }
    }

    /// Returns the in-memory datasource of database `db` (from 1).
    #[must_use]
    pub fn shard(&self, db: usize) -> &MemoryDataSource {
        &self.shards[db - 1]
    }

    /// Routes `key`, then executes `sql` rewritten for its table shard.
    ///
    /// A transactional `op` runs in a cross-shard transaction, joining one
    /// that is already open; otherwise the statement commits and closes on
    /// its own. Returns the statement as executed.
    ///
    /// # Errors
    ///
    /// Returns routing and connection failures.
    pub fn execute(
        &self,
        op: &OperationSpec,
        key: &RoutingValue,
        sql: &str,
        ctx: &mut RoutingContext,
        tx: &mut TransactionCoordinator,
    ) -> Result<String, ScenarioError> {
        let executed = self.router.invoke_scoped(
            op,
            &[Argument::Key(Some(key))],
            ctx,
            tx,
            |ctx, tx| {
                let conn = self.datasource.acquire_connection(ctx, tx)?;
                let statement = self.router.rewrite(sql, op, ctx).into_owned();
                conn.execute(&statement)?;
                conn.commit()?;
                conn.close()?;
                Ok::<_, ScenarioError>(statement)
            },
        )?;
        debug!(key = %key, statement = %executed, "statement executed");
        Ok(executed)
    }

    /// Runs one statement per key under `op`, failing after the last one
    /// when `fail` is set.
    ///
    /// Whether the statements commit together is up to `op`'s
    /// transactional marker.
    ///
    /// # Errors
    ///
    /// Returns the first failure, or `ScenarioError::Business` when `fail`.
    pub fn batch(
        &self,
        op: &OperationSpec,
        keys: &[&str],
        sql: &str,
        fail: bool,
    ) -> Result<Vec<String>, ScenarioError> {
        let mut ctx = RoutingContext::new();
        let mut tx = TransactionCoordinator::new();

        self.router.in_scope(op, &mut tx, |tx| {
            let mut executed = Vec::with_capacity(keys.len());
            for key in keys {
                let key = RoutingValue::from(*key);
                executed.push(self.execute(op, &key, sql, &mut ctx, tx)?);
            }
            if fail {
                return Err(ScenarioError::Business(format!(
                    "rejected after {} statements",
                    executed.len()
                )));
            }
            Ok(executed)
        })
    }

    /// Runs one statement per key in a cross-shard transaction, failing
    /// after the last one when `fail` is set.
    ///
    /// # Errors
    ///
    /// Same as [`Harness::batch`].
    pub fn transaction(
        &self,
        keys: &[&str],
        sql: &str,
        fail: bool,
    ) -> Result<Vec<String>, ScenarioError> {
        self.batch(&OperationSpec::new("batch", "").transactional(), keys, sql, fail)
    }
}
