//! Static shard topology.
//!
//! The topology is fixed for the lifetime of the process: changing either
//! count moves keys to different shards.

use crate::{Error, Result};

/// Maximum number of physical table shards across all databases.
pub const SHARDS_MAX: u32 = 65_536;

/// Hash function applied to a routing key before perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// 31-multiplier polynomial hash over the key's UTF-16 code units.
    ///
    /// Placements computed with this hash match data already sharded by
    /// routers using the same function, so it is the default.
    #[default]
    Polynomial,
    /// Upper 32 bits of xxh3-64 over the key's UTF-8 bytes.
    Xxh3,
}

impl HashFunction {
    /// Returns the configuration name of this hash function.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Polynomial => "polynomial",
            Self::Xxh3 => "xxh3",
        }
    }
}

impl std::str::FromStr for HashFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "polynomial" => Ok(Self::Polynomial),
            "xxh3" => Ok(Self::Xxh3),
            _ => Err(Error::InvalidArgument {
                name: "hash",
                reason: "expected 'polynomial' or 'xxh3'",
            }),
        }
    }
}

/// Shard topology: how many databases, and how many tables in each.
///
/// Only [`RouterConfig::new`] builds one, so every value has passed
/// [`RouterConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    db_count: u32,
    tb_count: u32,
    hash: HashFunction,
}

impl RouterConfig {
    /// Creates a validated topology using the default hash function.
    ///
    /// # Errors
    /// Returns an error if the counts violate [`RouterConfig::validate`].
    pub fn new(db_count: u32, tb_count: u32) -> Result<Self> {
        let config = Self {
            db_count,
            tb_count,
            hash: HashFunction::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the hash function.
    #[must_use]
    pub const fn with_hash(mut self, hash: HashFunction) -> Self {
        self.hash = hash;
        self
    }

    /// Returns the number of physical databases (`db01..=dbNN`).
    #[must_use]
    pub const fn db_count(&self) -> u32 {
        self.db_count
    }

    /// Returns the number of table shards per database (`_000..`).
    #[must_use]
    pub const fn tb_count(&self) -> u32 {
        self.tb_count
    }

    /// Returns the hash applied to routing keys by the hash strategy.
    #[must_use]
    pub const fn hash(&self) -> HashFunction {
        self.hash
    }

    /// Returns the total number of table shards, `db_count * tb_count`.
    #[must_use]
    pub const fn total_shards(&self) -> u32 {
        self.db_count * self.tb_count
    }

    /// Validates that the topology can be routed by bit-masking.
    ///
    /// # Errors
    /// Returns an error if `db_count` is zero, `tb_count` is not a power of
    /// two, or the total shard count is not a power of two within
    /// [`SHARDS_MAX`].
    pub fn validate(&self) -> Result<()> {
        if self.db_count == 0 {
            return Err(Error::InvalidArgument {
                name: "db_count",
                reason: "must be positive",
            });
        }

        if !self.tb_count.is_power_of_two() {
            return Err(Error::InvalidArgument {
                name: "tb_count",
                reason: "must be a power of two",
            });
        }

        let total = u64::from(self.db_count) * u64::from(self.tb_count);
        if total > u64::from(SHARDS_MAX) {
            return Err(Error::LimitExceeded {
                limit: "total_shards",
                max: u64::from(SHARDS_MAX),
                actual: total,
            });
        }

        // The hash strategy masks with total - 1.
        if !total.is_power_of_two() {
            return Err(Error::InvalidArgument {
                name: "db_count",
                reason: "db_count * tb_count must be a power of two",
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topology() {
        let config = RouterConfig::new(2, 4).unwrap();
        assert_eq!(config.total_shards(), 8);
        assert_eq!(config.db_count(), 2);
        assert_eq!(config.tb_count(), 4);
        assert_eq!(config.hash(), HashFunction::Polynomial);
        assert_eq!(config.with_hash(HashFunction::Xxh3).hash(), HashFunction::Xxh3);
    }

    #[test]
    fn test_single_database() {
        assert!(RouterConfig::new(1, 1).is_ok());
        assert!(RouterConfig::new(1, 32).is_ok());
    }

    #[test]
    fn test_zero_databases_rejected() {
        let err = RouterConfig::new(0, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "db_count", .. }));
    }

    #[test]
    fn test_table_count_not_power_of_two() {
        assert!(RouterConfig::new(2, 3).is_err());
        assert!(RouterConfig::new(2, 0).is_err());
    }

    #[test]
    fn test_zero_tables_never_reaches_a_config() {
        // The mask and the db/table split divide by tb_count.
        let err = RouterConfig::new(2, 0).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidArgument {
                name: "tb_count",
                reason: "must be a power of two",
            }
        );
    }

    #[test]
    fn test_total_not_power_of_two() {
        let err = RouterConfig::new(3, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_total_exceeds_limit() {
        let err = RouterConfig::new(1024, 1024).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { .. }));
    }

    #[test]
    fn test_hash_function_parse() {
        assert_eq!("xxh3".parse::<HashFunction>().unwrap(), HashFunction::Xxh3);
        assert_eq!(
            "polynomial".parse::<HashFunction>().unwrap(),
            HashFunction::Polynomial
        );
        assert!("md5".parse::<HashFunction>().is_err());
        assert_eq!(HashFunction::Xxh3.name(), "xxh3");
    }
}
