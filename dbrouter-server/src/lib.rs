//! dbrouter Server - Topology loading for the `dbrouter` tool.
//!
//! A topology file describes the shard counts, the physical datasources and
//! the routing markers of entities and operations. [`TopologyFile`] parses
//! and validates it; [`Topology`] turns it into a ready [`ShardRouter`] and
//! [`DynamicDataSource`] backed by in-memory datasources.
//!
//! [`ShardRouter`]: dbrouter_routing::ShardRouter
//! [`DynamicDataSource`]: dbrouter_tx::DynamicDataSource

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod topology;

pub use config::{
    ConfigError, DataSourceConfig, EntityConfig, OperationConfig, PoolConfig, TopologyFile,
};
pub use topology::{Topology, MODULO_ALGORITHM};
