//! Runtime topology built from a [`TopologyFile`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dbrouter_core::{DataSourceId, RouterConfig};
use dbrouter_routing::{AlgorithmRegistry, ModuloSharding, OperationSpec, ShardRouter};
use dbrouter_tx::{DataSource, DynamicDataSource, EventLog, MemoryDataSource};
use tracing::{debug, warn};

use crate::config::{ConfigError, TopologyFile};

/// Registry name of the built-in modulo algorithm.
pub const MODULO_ALGORITHM: &str = "modulo";

/// A router and datasource wired from one topology file.
///
/// Physical datasources are in-memory, recording into one shared
/// [`EventLog`]; each honors its pool's `max_active`.
#[derive(Debug)]
pub struct Topology {
    file: TopologyFile,
    config: RouterConfig,
    router: ShardRouter,
    datasource: DynamicDataSource,
    memory: BTreeMap<DataSourceId, Arc<MemoryDataSource>>,
    log: EventLog,
}

impl Topology {
    /// Builds the runtime topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the file fails validation.
    pub fn build(file: TopologyFile) -> Result<Self, ConfigError> {
        file.validate()?;
        let config = file.router_config()?;

        let mut algorithms = AlgorithmRegistry::new();
        let (db_count, tb_count) = (config.db_count(), config.tb_count());
        algorithms.register(MODULO_ALGORITHM, move || {
            Box::new(ModuloSharding::new(db_count, tb_count))
        });
        let algorithms = Arc::new(algorithms);

        let mut router = ShardRouter::new(config).with_algorithms(Arc::clone(&algorithms));
        for (name, entity) in &file.entities {
            if let Some(algorithm) = &entity.algorithm {
                if !algorithms.contains(algorithm) {
                    warn!(entity = %name, algorithm = %algorithm, "entity names an unregistered algorithm");
                }
            }
            router = router.with_entity(name.as_str(), entity.policy());
        }

        let default = file.default_datasource().unwrap_or_default().to_string();
        let log = EventLog::new();
        let mut datasource = DynamicDataSource::new(default);
        let mut memory = BTreeMap::new();
        for id in &file.list {
            let pool = file
                .datasources
                .get(id)
                .map(|ds| ds.pool.max_active)
                .unwrap_or_default();
            let target = Arc::new(
                MemoryDataSource::with_log(id.as_str(), log.clone()).with_max_active(pool),
            );
            datasource.add_target(id.as_str(), Arc::clone(&target) as Arc<dyn DataSource>);
            memory.insert(DataSourceId::new(id.as_str()), target);
            debug!(datasource = %id, max_active = pool, "datasource registered");
        }

        Ok(Self {
            file,
            config,
            router,
            datasource,
            memory,
            log,
        })
    }

    /// Loads and builds a topology from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::build(TopologyFile::from_file(path)?)
    }

    /// Returns the source file.
    #[must_use]
    pub const fn file(&self) -> &TopologyFile {
        &self.file
    }

    /// Returns the shard topology.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// Returns the routing-aware datasource.
    #[must_use]
    pub const fn datasource(&self) -> &DynamicDataSource {
        &self.datasource
    }

    /// Returns the in-memory datasource registered under `id`.
    #[must_use]
    pub fn memory(&self, id: &DataSourceId) -> Option<&Arc<MemoryDataSource>> {
        self.memory.get(id)
    }

    /// Returns the log shared by every datasource.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Returns the operation configured under `name`, if any.
    #[must_use]
    pub fn configured_operation(&self, name: &str) -> Option<OperationSpec> {
        self.file.operation(name)
    }

    /// Returns the configured operation, or an ad hoc one keyed by the key
    /// argument itself.
    #[must_use]
    pub fn operation(&self, name: Option<&str>, entity: Option<&str>) -> OperationSpec {
        if let Some(op) = name.and_then(|n| self.configured_operation(n)) {
            return op;
        }
        let adhoc = OperationSpec::new(name.unwrap_or("adhoc"), "");
        match entity {
            Some(entity) => adhoc.for_entity(entity),
            None => adhoc,
        }
    }
}
