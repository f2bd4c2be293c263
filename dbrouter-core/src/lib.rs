//! dbrouter Core - Strongly-typed shard identifiers and routing state.
//!
//! This crate provides the values every other dbrouter crate passes around:
//! the shard indices a strategy computes, the static topology they are
//! computed against, and the per-call [`RoutingContext`] that carries the
//! decision to the point of execution.
//!
//! # Design Principles
//!
//! - **Strongly-typed indices**: a `DbIndex` can't be passed where a
//!   `TableIndex` is expected
//! - **Explicit context**: routing state is a value threaded through calls,
//!   never hidden global or thread-local state
//! - **Validated topology**: `RouterConfig` refuses shapes the hash strategy
//!   can't mask

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod context;
mod error;
mod types;

pub use config::{HashFunction, RouterConfig, SHARDS_MAX};
pub use context::RoutingContext;
pub use error::{Error, Result};
pub use types::{DataSourceId, DbIndex, TableIndex};
