//! Topology file format.
//!
//! # Example
//!
//! ```toml
//! db_count = 2
//! tb_count = 4
//! hash = "polynomial"
//! default_datasource = "db01"
//! list = ["db01", "db02"]
//!
//! [datasources.db01]
//! url = "mysql://10.0.0.1:3306/orders"
//! username = "router"
//! password = "secret"
//!
//! [datasources.db01.pool]
//! max_active = 8
//!
//! [datasources.db02]
//! url = "mysql://10.0.0.2:3306/orders"
//!
//! [entities.user]
//! split_table = true
//!
//! [entities.ledger]
//! algorithm = "modulo"
//!
//! [operations.insert_user]
//! key = "user_id"
//! entity = "user"
//! transactional = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use dbrouter_core::{HashFunction, RouterConfig};
use dbrouter_routing::{EntityPolicy, OperationSpec};
use serde::{Deserialize, Serialize};

/// Connection pool settings of one datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened at startup.
    pub initial_size: u32,
    /// Idle connections kept open.
    pub min_idle: u32,
    /// Maximum simultaneously open connections.
    pub max_active: u32,
    /// How long an acquire waits for a free connection.
    pub max_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 5,
            min_idle: 5,
            max_active: 20,
            max_wait_ms: 3_000,
        }
    }
}

/// Connection settings of one physical datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Connection URL.
    pub url: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Driver name.
    pub driver: String,
    /// Pool settings.
    pub pool: PoolConfig,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            driver: "mysql".to_string(),
            pool: PoolConfig::default(),
        }
    }
}

/// Routing markers of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Whether the table name gets the shard suffix.
    pub split_table: bool,
    /// Custom algorithm name; hash routing when absent.
    pub algorithm: Option<String>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            split_table: true,
            algorithm: None,
        }
    }
}

impl EntityConfig {
    /// Converts to the router's entity policy.
    #[must_use]
    pub fn policy(&self) -> EntityPolicy {
        let mut policy = EntityPolicy::new();
        if !self.split_table {
            policy = policy.without_table_split();
        }
        if let Some(name) = &self.algorithm {
            policy = policy.with_algorithm(name.as_str());
        }
        policy
    }
}

/// Routing markers of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Field holding the routing key.
    pub key: String,
    /// Entity the operation touches.
    pub entity: Option<String>,
    /// Whether the operation runs as a cross-shard transaction.
    pub transactional: bool,
}

/// A complete topology file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyFile {
    /// Number of databases.
    pub db_count: u32,
    /// Number of table shards per database.
    pub tb_count: u32,
    /// Hash function name (`polynomial` or `xxh3`).
    pub hash: String,
    /// Datasource used when a call is not routed. Defaults to the first
    /// listed datasource.
    pub default_datasource: Option<String>,
    /// Datasource identifiers.
    pub list: Vec<String>,
    /// Settings per datasource identifier.
    pub datasources: BTreeMap<String, DataSourceConfig>,
    /// Markers per entity name.
    pub entities: BTreeMap<String, EntityConfig>,
    /// Markers per operation name.
    pub operations: BTreeMap<String, OperationConfig>,
}

impl Default for TopologyFile {
    fn default() -> Self {
        Self {
            db_count: 1,
            tb_count: 1,
            hash: HashFunction::default().name().to_string(),
            default_datasource: None,
            list: Vec::new(),
            datasources: BTreeMap::new(),
            entities: BTreeMap::new(),
            operations: BTreeMap::new(),
        }
    }
}

impl TopologyFile {
    /// Loads and validates a topology from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a topology from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed or the topology is
    /// inconsistent.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(file)
    }

    /// Serializes the topology to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns the validated shard topology.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash name is unknown or the counts are
    /// rejected by [`RouterConfig::validate`].
    pub fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        let hash: HashFunction = self.hash.parse()?;
        Ok(RouterConfig::new(self.db_count, self.tb_count)?.with_hash(hash))
    }

    /// Returns the default datasource identifier.
    #[must_use]
    pub fn default_datasource(&self) -> Option<&str> {
        self.default_datasource
            .as_deref()
            .or_else(|| self.list.first().map(String::as_str))
    }

    /// Returns the routing markers of a configured operation.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<OperationSpec> {
        self.operations.get(name).map(|op| {
            let mut marked = OperationSpec::new(name, op.key.as_str());
            if let Some(entity) = &op.entity {
                marked = marked.for_entity(entity.as_str());
            }
            if op.transactional {
                marked = marked.transactional();
            }
            marked
        })
    }

    /// Checks the topology for consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a listed datasource has no
    /// settings, the default is not listed, a hash-routed database has no
    /// datasource, or an operation names an unknown entity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.router_config()?;

        if self.list.is_empty() {
            return Err(invalid("datasource list is empty"));
        }
        for id in &self.list {
            if !self.datasources.contains_key(id) {
                return Err(invalid(format!("datasource '{id}' is listed but not configured")));
            }
        }

        match self.default_datasource() {
            Some(id) if self.list.iter().any(|l| l == id) => {}
            Some(id) => return Err(invalid(format!("default datasource '{id}' is not listed"))),
            None => return Err(invalid("no default datasource")),
        }

        for db in 1..=self.db_count {
            let id = format!("db{db:02}");
            if !self.list.contains(&id) {
                return Err(invalid(format!("database {db} routes to unlisted datasource '{id}'")));
            }
        }

        for (name, op) in &self.operations {
            if op.key.is_empty() {
                return Err(invalid(format!("operation '{name}' has no routing key")));
            }
            if let Some(entity) = &op.entity {
                if !self.entities.contains_key(entity) {
                    return Err(invalid(format!(
                        "operation '{name}' names unknown entity '{entity}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Error type for topology loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the topology file.
    #[error("failed to read topology from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Parse error in TOML.
    #[error("failed to parse topology: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
    /// The topology is inconsistent.
    #[error("invalid topology: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
    /// The shard counts or hash name were rejected.
    #[error("invalid topology: {0}")]
    Router(#[from] dbrouter_core::Error),
}
