//! Shard router - the interceptor entry point.
//!
//! The router is invoked around a guarded data operation. It extracts the
//! routing key, runs the strategy the operation's entity asks for, hands
//! the populated [`RoutingContext`] to the operation, and clears the context
//! on every exit path.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use dbrouter_core::{RouterConfig, RoutingContext};
use dbrouter_tx::TransactionCoordinator;
use tracing::{debug, warn};

use crate::algorithm::{AlgorithmRegistry, AlgorithmShardingStrategy};
use crate::error::{RoutingError, RoutingResult};
use crate::hash::HashShardingStrategy;
use crate::key::{extract_routing_key, Argument};
use crate::rewrite::StatementRewriter;
use crate::strategy::ShardingStrategy;
use crate::value::RoutingValue;

/// Which strategy routes an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyKind {
    /// Perturbed hash over the router's topology.
    Hash,
    /// A registered custom algorithm, by name.
    Algorithm(String),
}

/// Per-entity routing markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPolicy {
    /// Whether statements for this entity get the table suffix. When false
    /// the entity is split by database only.
    pub split_table: bool,
    /// Strategy computing the shard.
    pub strategy: StrategyKind,
}

static DEFAULT_POLICY: EntityPolicy = EntityPolicy::new();

impl EntityPolicy {
    /// Database and table split, hash routed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            split_table: true,
            strategy: StrategyKind::Hash,
        }
    }

    /// Marks the entity as split by database only.
    #[must_use]
    pub fn without_table_split(mut self) -> Self {
        self.split_table = false;
        self
    }

    /// Routes the entity with the named algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, name: impl Into<String>) -> Self {
        self.strategy = StrategyKind::Algorithm(name.into());
        self
    }
}

impl Default for EntityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative markers of one routed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    /// Operation name, for logs.
    pub name: String,
    /// Field holding the routing key on record arguments.
    pub key_field: String,
    /// Entity the operation reads or writes.
    pub entity: Option<String>,
    /// Whether the operation spans a cross-shard transaction.
    pub transactional: bool,
}

impl OperationSpec {
    /// Creates an operation keyed by `key_field`.
    #[must_use]
    pub fn new(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            entity: None,
            transactional: false,
        }
    }

    /// Sets the entity.
    #[must_use]
    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Marks the operation as a cross-shard transaction.
    #[must_use]
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }
}

/// What to do when a custom algorithm can't route a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlgorithmFailurePolicy {
    /// Log and let the operation proceed unrouted.
    #[default]
    Degrade,
    /// Fail the operation with the routing error.
    FailFast,
}

/// Error from [`ShardRouter::invoke`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError<E> {
    /// Routing failed before the operation ran.
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),
    /// The operation itself failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> InvokeError<E> {
    /// Returns the operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Routing(_) => None,
        }
    }
}

/// Clears the context when dropped, so unwinding clears it too.
struct ClearOnDrop<'a>(&'a mut RoutingContext);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Routes operations to database and table shards.
#[derive(Debug)]
pub struct ShardRouter {
    /// Topology.
    config: RouterConfig,
    /// Default strategy.
    hash: HashShardingStrategy,
    /// Custom algorithms available to entities.
    algorithms: Arc<AlgorithmRegistry>,
    /// Markers by entity name.
    entities: HashMap<String, EntityPolicy>,
    /// Statement rewriter.
    rewriter: StatementRewriter,
    /// Handling of recoverable algorithm failures.
    algorithm_failure: AlgorithmFailurePolicy,
}

impl ShardRouter {
    /// Creates a router over `config` with no custom algorithms.
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            hash: HashShardingStrategy::new(config),
            algorithms: Arc::new(AlgorithmRegistry::new()),
            entities: HashMap::new(),
            rewriter: StatementRewriter::new(),
            algorithm_failure: AlgorithmFailurePolicy::default(),
        }
    }

    /// Sets the algorithm registry.
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: Arc<AlgorithmRegistry>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Registers markers for an entity.
    #[must_use]
    pub fn with_entity(mut self, entity: impl Into<String>, policy: EntityPolicy) -> Self {
        self.entities.insert(entity.into(), policy);
        self
    }

    /// Sets the algorithm failure policy.
    #[must_use]
    pub fn with_algorithm_failure(mut self, policy: AlgorithmFailurePolicy) -> Self {
        self.algorithm_failure = policy;
        self
    }

    /// Returns the topology.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Returns the algorithm registry.
    #[must_use]
    pub const fn algorithms(&self) -> &Arc<AlgorithmRegistry> {
        &self.algorithms
    }

    /// Returns the markers for `entity`, or the defaults.
    #[must_use]
    pub fn entity_policy(&self, entity: Option<&str>) -> &EntityPolicy {
        entity
            .and_then(|e| self.entities.get(e))
            .unwrap_or(&DEFAULT_POLICY)
    }

    /// Routes an already-extracted key for `entity` into `ctx`.
    ///
    /// # Errors
    /// Returns an error only if the algorithm failure policy is
    /// [`AlgorithmFailurePolicy::FailFast`] and the algorithm can't route.
    pub fn route_key(
        &self,
        key: &RoutingValue,
        entity: Option<&str>,
        ctx: &mut RoutingContext,
    ) -> RoutingResult<()> {
        let result = match &self.entity_policy(entity).strategy {
            StrategyKind::Hash => self.hash.route(key, ctx),
            StrategyKind::Algorithm(name) => {
                AlgorithmShardingStrategy::new(Arc::clone(&self.algorithms))
                    .with_algorithm(name.as_str())
                    .route(key, ctx)
            }
        };

        match result {
            Err(err)
                if err.is_recoverable()
                    && self.algorithm_failure == AlgorithmFailurePolicy::Degrade =>
            {
                warn!(
                    entity = entity.unwrap_or("-"),
                    error = %err,
                    "routing skipped; operation proceeds unrouted"
                );
                Ok(())
            }
            other => other,
        }
    }

    /// Extracts the routing key for `op` from `args` and routes it into `ctx`.
    ///
    /// # Errors
    /// Returns [`RoutingError::MissingRoutingKey`] if no argument supplies a
    /// key, or an algorithm error under [`AlgorithmFailurePolicy::FailFast`].
    pub fn route(
        &self,
        op: &OperationSpec,
        args: &[Argument<'_>],
        ctx: &mut RoutingContext,
    ) -> RoutingResult<()> {
        let key = extract_routing_key(&op.key_field, args)?;
        debug!(operation = %op.name, key = %key, "routing operation");
        self.route_key(&key, op.entity.as_deref(), ctx)
    }

    /// Runs `call` with `ctx` routed for `op`, then clears `ctx`.
    ///
    /// `ctx` is cleared whether routing fails, `call` fails, or `call`
    /// panics, so nothing leaks into the next call sharing it.
    ///
    /// # Errors
    /// Returns [`InvokeError::Routing`] if routing failed (and `call` never
    /// ran), or [`InvokeError::Operation`] with `call`'s error unchanged.
    pub fn invoke<T, E, F>(
        &self,
        op: &OperationSpec,
        args: &[Argument<'_>],
        ctx: &mut RoutingContext,
        call: F,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnOnce(&RoutingContext) -> Result<T, E>,
    {
        let mut scope = ClearOnDrop(ctx);
        self.route(op, args, &mut *scope.0)?;
        call(&*scope.0).map_err(InvokeError::Operation)
    }

    /// Runs `call` in the transaction scope `op` declares.
    ///
    /// A transactional operation runs inside
    /// [`TransactionCoordinator::in_transaction`]: connections acquired
    /// through the coordinator are enrolled and commit or roll back together
    /// when `call` returns. If a transaction is already open the call joins
    /// it. Any other operation runs directly and its connections commit on
    /// their own.
    ///
    /// # Errors
    /// Returns `call`'s error unchanged.
    pub fn in_scope<T, E, F>(
        &self,
        op: &OperationSpec,
        coordinator: &mut TransactionCoordinator,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionCoordinator) -> Result<T, E>,
    {
        if op.transactional {
            debug!(operation = %op.name, "entering cross-shard transaction scope");
            coordinator.in_transaction(call)
        } else {
            call(coordinator)
        }
    }

    /// Routes `op`, then runs `call` in the transaction scope `op` declares.
    ///
    /// Combines [`ShardRouter::in_scope`] and [`ShardRouter::invoke`]. A
    /// routing failure inside a transactional scope rolls back whatever the
    /// scope already enrolled.
    ///
    /// # Errors
    /// Same as [`ShardRouter::invoke`].
    pub fn invoke_scoped<T, E, F>(
        &self,
        op: &OperationSpec,
        args: &[Argument<'_>],
        ctx: &mut RoutingContext,
        coordinator: &mut TransactionCoordinator,
        call: F,
    ) -> Result<T, InvokeError<E>>
    where
        F: FnOnce(&RoutingContext, &mut TransactionCoordinator) -> Result<T, E>,
    {
        self.in_scope(op, coordinator, |tx| {
            self.invoke(op, args, ctx, |routed| call(routed, tx))
        })
    }

    /// Rewrites `sql` for the table shard in `ctx`, honoring the entity's
    /// table-split marker.
    #[must_use]
    pub fn rewrite<'a>(
        &self,
        sql: &'a str,
        op: &OperationSpec,
        ctx: &RoutingContext,
    ) -> Cow<'a, str> {
        let split_table = self.entity_policy(op.entity.as_deref()).split_table;
        self.rewriter.rewrite(sql, ctx.table(), split_table)
    }
}
