//! dbrouter Routing - Shard selection and statement rewriting.
//!
//! This crate decides *where* a data operation goes and rewrites the
//! statement to match:
//!
//! - **Strategies**: perturbed-hash routing and named custom algorithms
//! - **Key extraction**: find the routing key among an operation's arguments
//! - **Rewriting**: append the table shard suffix to the target table name
//! - **Router**: the interceptor entry point tying the three together,
//!   clearing the routing context on every exit path and opening a
//!   cross-shard transaction for operations marked transactional

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod algorithm;
mod error;
mod hash;
mod key;
mod rewrite;
mod router;
mod strategy;
mod value;

pub use algorithm::{
    AlgorithmRegistry, AlgorithmShardingStrategy, ModuloSharding, ShardingAlgorithm,
};
pub use error::{RoutingError, RoutingResult};
pub use hash::{hash_key, perturb, HashShardingStrategy};
pub use key::{extract_routing_key, Argument, FieldSource, Fields};
pub use rewrite::StatementRewriter;
pub use router::{
    AlgorithmFailurePolicy, EntityPolicy, InvokeError, OperationSpec, ShardRouter, StrategyKind,
};
pub use strategy::{ShardingResult, ShardingStrategy};
pub use value::{KeyType, RoutingValue};
