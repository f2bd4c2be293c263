//! Per-call routing context.
//!
//! A `RoutingContext` belongs to exactly one in-flight logical call. The
//! strategy writes it, the datasource router and the statement rewriter read
//! it, and the call that populated it clears it before returning.

use crate::types::{DataSourceId, DbIndex, TableIndex};

/// Database and table shard selected for the current call.
///
/// Either part may be absent, meaning "do not change this part of the route".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingContext {
    db: Option<DbIndex>,
    table: Option<TableIndex>,
}

impl RoutingContext {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            db: None,
            table: None,
        }
    }

    /// Records the database shard.
    pub fn set_db(&mut self, db: DbIndex) {
        self.db = Some(db);
    }

    /// Records the table shard.
    pub fn set_table(&mut self, table: TableIndex) {
        self.table = Some(table);
    }

    /// Returns the selected database shard, if any.
    #[must_use]
    pub const fn db(&self) -> Option<DbIndex> {
        self.db
    }

    /// Returns the selected table shard, if any.
    #[must_use]
    pub const fn table(&self) -> Option<TableIndex> {
        self.table
    }

    /// Returns the two-digit database key, e.g. `"02"`.
    #[must_use]
    pub fn db_key(&self) -> Option<String> {
        self.db.map(DbIndex::key)
    }

    /// Returns the three-digit table key, e.g. `"001"`.
    #[must_use]
    pub fn table_key(&self) -> Option<String> {
        self.table.map(TableIndex::key)
    }

    /// Returns the datasource this context routes to, if a database is set.
    #[must_use]
    pub fn datasource(&self) -> Option<DataSourceId> {
        self.db.map(DbIndex::datasource)
    }

    /// Returns true if neither key is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.db.is_none() && self.table.is_none()
    }

    /// Erases both keys.
    pub fn clear(&mut self) {
        self.db = None;
        self.table = None;
    }
}
