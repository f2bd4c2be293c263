//! dbrouter Tx - Shard connections and cross-shard transactions.
//!
//! This crate manages the connections a routed call opens:
//!
//! - **`DynamicDataSource`**: picks the physical datasource from the routing
//!   context and, inside a cross-shard transaction, hands out one cached
//!   connection per shard
//! - **`ShardAwareConnection`**: defers commit and close to the coordinator
//!   while a cross-shard transaction is open
//! - **`TransactionCoordinator`**: commits or rolls back every enrolled
//!   connection in registration order, best effort
//!
//! There is no two-phase commit. A failed per-shard commit is logged and the
//! remaining shards still commit.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod coordinator;
mod datasource;
mod error;
mod memory;
mod session;

pub use connection::{
    Connection, ConnectionHandle, DataSource, ShardAwareConnection, TransactionFlag,
};
pub use coordinator::{ShardFailure, TransactionCoordinator, TxOutcome, TxState};
pub use datasource::DynamicDataSource;
pub use error::{ConnectionError, TxError, TxResult};
pub use memory::{ConnectionEvent, EventLog, EventRecord, MemoryDataSource};
pub use session::ShardSession;
