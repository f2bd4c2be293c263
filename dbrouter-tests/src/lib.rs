//! dbrouter Tests - Integration scenarios across the router crates.
//!
//! Unit tests live inline in each crate under `#[cfg(test)]`. This crate
//! wires the crates together the way an application would: route a call,
//! acquire its shard connection, rewrite and execute the statement, and
//! complete the cross-shard transaction.
//!
//! ## Test Organization
//!
//! - `routing_tests`: key extraction, strategies and rewriting through the
//!   router
//! - `transaction_tests`: coordinator and datasource behavior with several
//!   shards
//! - `end_to_end_tests`: topology file to executed statements
//! - `concurrency_tests`: independent calls sharing datasources
//!
//! **Support Modules**:
//! - `scenarios`: a two-database harness and reusable call shapes
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod scenarios;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod end_to_end_tests;
#[cfg(test)]
mod routing_tests;
