//! Strongly-typed shard identifiers.
//!
//! Physical names follow one convention everywhere: a database is
//! `"db" + zero-padded(index, 2)` and a table suffix is
//! `"_" + zero-padded(index, 3)`.

use std::fmt;

/// Macro to generate strongly-typed shard index wrappers.
///
/// Each index wraps a u32 and renders as a zero-padded decimal of the given
/// width, which is the form stored in a [`crate::RoutingContext`].
macro_rules! define_index {
    ($name:ident, $width:expr, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates a new index from a raw u32 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            /// Returns the raw u32 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0
            }

            /// Returns the zero-padded key form of this index.
            #[must_use]
            pub fn key(self) -> String {
                format!("{:0width$}", self.0, width = $width)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:0width$}", self.0, width = $width)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u32 {
            fn from(index: $name) -> Self {
                index.get()
            }
        }
    };
}

define_index!(DbIndex, 2, "db", "1-based index of a physical database shard.");
define_index!(TableIndex, 3, "tb", "0-based index of a physical table shard within a database.");

impl DbIndex {
    /// Returns the physical datasource identifier for this database shard.
    #[must_use]
    pub fn datasource(self) -> DataSourceId {
        DataSourceId::new(format!("db{self}"))
    }
}

impl TableIndex {
    /// Returns the physical table name for a logical table.
    #[must_use]
    pub fn physical_table(self, logical: &str) -> String {
        format!("{logical}_{self}")
    }
}

/// Identifier of a physical datasource, e.g. `db01` or a configured default.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataSourceId(String);

impl DataSourceId {
    /// Creates a datasource identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ds({})", self.0)
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataSourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DataSourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
