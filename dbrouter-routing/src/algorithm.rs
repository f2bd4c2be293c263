//! Custom sharding algorithms resolved by name.
//!
//! Algorithms are registered up front in an [`AlgorithmRegistry`] together
//! with a factory. Every routed call builds a fresh instance, so algorithms
//! never share mutable state across calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dbrouter_core::{DbIndex, RoutingContext, TableIndex};
use tracing::debug;

use crate::error::{RoutingError, RoutingResult};
use crate::strategy::{ShardingResult, ShardingStrategy};
use crate::value::{KeyType, RoutingValue};

/// A user-supplied sharding function.
pub trait ShardingAlgorithm: Send {
    /// The key type this algorithm accepts.
    fn key_type(&self) -> KeyType;

    /// Computes the shard for `key`. Either part of the result may be absent.
    fn do_sharding(&self, key: &RoutingValue) -> ShardingResult;
}

type AlgorithmFactory = Box<dyn Fn() -> Box<dyn ShardingAlgorithm> + Send + Sync>;

struct AlgorithmEntry {
    key_type: KeyType,
    factory: AlgorithmFactory,
}

/// Name → algorithm factory table, populated at startup.
#[derive(Default)]
pub struct AlgorithmRegistry {
    entries: HashMap<String, AlgorithmEntry>,
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an algorithm factory under `name`, replacing any previous
    /// registration.
    ///
    /// The declared key type is read from one instance built at registration.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ShardingAlgorithm> + Send + Sync + 'static,
    {
        let key_type = factory().key_type();
        self.entries.insert(
            name.into(),
            AlgorithmEntry {
                key_type,
                factory: Box::new(factory),
            },
        );
    }

    /// Registers a default-constructible algorithm under `name`.
    pub fn register_default<A>(&mut self, name: impl Into<String>)
    where
        A: ShardingAlgorithm + Default + 'static,
    {
        self.register(name, || Box::new(A::default()));
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the declared key type of `name`.
    #[must_use]
    pub fn key_type(&self, name: &str) -> Option<KeyType> {
        self.entries.get(name).map(|e| e.key_type)
    }

    /// Builds a fresh instance of `name`.
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn ShardingAlgorithm>> {
        self.entries.get(name).map(|e| (e.factory)())
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered algorithms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}

/// Strategy delegating to a named, registered algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmShardingStrategy {
    registry: Arc<AlgorithmRegistry>,
    algorithm: Option<String>,
}

impl AlgorithmShardingStrategy {
    /// Creates an unconfigured strategy over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            registry,
            algorithm: None,
        }
    }

    /// Selects the algorithm by name.
    #[must_use]
    pub fn with_algorithm(mut self, name: impl Into<String>) -> Self {
        self.configure(name);
        self
    }

    /// Selects the algorithm by name.
    pub fn configure(&mut self, name: impl Into<String>) {
        self.algorithm = Some(name.into());
    }

    /// Returns the configured algorithm name.
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }
}

impl ShardingStrategy for AlgorithmShardingStrategy {
    fn name(&self) -> &'static str {
        "algorithm"
    }

    fn route(&self, key: &RoutingValue, ctx: &mut RoutingContext) -> RoutingResult<()> {
        let name = self
            .algorithm
            .as_deref()
            .ok_or(RoutingError::AlgorithmNotConfigured)?;

        let declared = self
            .registry
            .key_type(name)
            .ok_or_else(|| RoutingError::AlgorithmNotFound {
                name: name.to_string(),
            })?;

        let actual = key.key_type();
        if !declared.accepts(actual) {
            return Err(RoutingError::KeyTypeMismatch {
                algorithm: name.to_string(),
                expected: declared,
                actual,
            });
        }

        let algorithm =
            self.registry
                .instantiate(name)
                .ok_or_else(|| RoutingError::AlgorithmNotFound {
                    name: name.to_string(),
                })?;
        let result = algorithm.do_sharding(key);
        result.apply(ctx);

        debug!(
            strategy = self.name(),
            algorithm = name,
            db = ?result.db,
            table = ?result.table,
            "routed key"
        );
        Ok(())
    }
}

/// Routes numeric keys by plain modulo: consecutive keys fill the tables of
/// one database before moving to the next.
#[derive(Debug, Clone, Copy)]
pub struct ModuloSharding {
    db_count: u32,
    tb_count: u32,
}

impl ModuloSharding {
    /// Creates a modulo algorithm for the given topology.
    ///
    /// # Panics
    /// Panics if either count is zero.
    #[must_use]
    pub fn new(db_count: u32, tb_count: u32) -> Self {
        assert!(db_count > 0 && tb_count > 0, "shard counts must be positive");
        Self { db_count, tb_count }
    }
}

impl ShardingAlgorithm for ModuloSharding {
    fn key_type(&self) -> KeyType {
        KeyType::Number
    }

    fn do_sharding(&self, key: &RoutingValue) -> ShardingResult {
        let value = match key {
            RoutingValue::Int(n) => n.unsigned_abs(),
            RoutingValue::UInt(n) => *n,
            RoutingValue::Text(_) => return ShardingResult::default(),
        };
        let tb_count = u64::from(self.tb_count);
        let db_count = u64::from(self.db_count);

        // Both remainders are below a u32 count.
        #[allow(clippy::cast_possible_truncation)]
        let db = ((value / tb_count) % db_count) as u32 + 1;
        #[allow(clippy::cast_possible_truncation)]
        let table = (value % tb_count) as u32;

        ShardingResult::new(DbIndex::new(db), TableIndex::new(table))
    }
}
