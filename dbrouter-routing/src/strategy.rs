//! The sharding strategy seam.

use dbrouter_core::{DbIndex, RoutingContext, TableIndex};

use crate::error::RoutingResult;
use crate::value::RoutingValue;

/// Shard indices produced by a strategy or algorithm.
///
/// An absent part leaves that part of the route unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardingResult {
    /// Database shard (1-based).
    pub db: Option<DbIndex>,
    /// Table shard (0-based).
    pub table: Option<TableIndex>,
}

impl ShardingResult {
    /// Creates a result routing both the database and the table.
    #[must_use]
    pub const fn new(db: DbIndex, table: TableIndex) -> Self {
        Self {
            db: Some(db),
            table: Some(table),
        }
    }

    /// Creates a result that only selects a database.
    #[must_use]
    pub const fn db_only(db: DbIndex) -> Self {
        Self {
            db: Some(db),
            table: None,
        }
    }

    /// Creates a result that only selects a table.
    #[must_use]
    pub const fn table_only(table: TableIndex) -> Self {
        Self {
            db: None,
            table: Some(table),
        }
    }

    /// Writes the present parts into the context.
    pub fn apply(self, ctx: &mut RoutingContext) {
        if let Some(db) = self.db {
            ctx.set_db(db);
        }
        if let Some(table) = self.table {
            ctx.set_table(table);
        }
    }
}

/// Computes the shard for a routing key and records it in the context.
pub trait ShardingStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Routes `key`, writing the selected shard into `ctx`.
    ///
    /// # Errors
    /// Returns an error if the strategy can't route this key. Nothing is
    /// written to `ctx` in that case.
    fn route(&self, key: &RoutingValue, ctx: &mut RoutingContext) -> RoutingResult<()>;

    /// Erases everything this strategy wrote into `ctx`.
    fn clear(&self, ctx: &mut RoutingContext) {
        ctx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_full_result() {
        let mut ctx = RoutingContext::new();
        ShardingResult::new(DbIndex::new(2), TableIndex::new(1)).apply(&mut ctx);

        assert_eq!(ctx.db_key().as_deref(), Some("02"));
        assert_eq!(ctx.table_key().as_deref(), Some("001"));
    }

    #[test]
    fn test_apply_partial_keeps_existing() {
        let mut ctx = RoutingContext::new();
        ctx.set_table(TableIndex::new(9));

        ShardingResult::db_only(DbIndex::new(1)).apply(&mut ctx);

        assert_eq!(ctx.db(), Some(DbIndex::new(1)));
        assert_eq!(ctx.table(), Some(TableIndex::new(9)));
    }

    #[test]
    fn test_apply_empty_result() {
        let mut ctx = RoutingContext::new();
        ShardingResult::default().apply(&mut ctx);
        assert!(ctx.is_empty());
    }
}
