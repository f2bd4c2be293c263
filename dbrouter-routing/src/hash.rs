//! Perturbed-hash sharding.
//!
//! A key is hashed, its high 16 bits are folded into the low 16 bits, and the
//! result is masked down to one of `db_count * tb_count` table shards. With
//! `db_count = 2, tb_count = 4`:
//!
//! ```text
//! idx:   0    1    2    3  |  4    5    6    7
//!       db01/_000 .. _003  | db02/_000 .. _003
//! ```
//!
//! so `idx = 5` lands on `db02` table `_001`.

use dbrouter_core::{DbIndex, HashFunction, RouterConfig, RoutingContext, TableIndex};
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::RoutingResult;
use crate::strategy::{ShardingResult, ShardingStrategy};
use crate::value::RoutingValue;

/// Hashes a key to 32 bits with the given function.
#[must_use]
pub fn hash_key(function: HashFunction, key: &str) -> u32 {
    match function {
        HashFunction::Polynomial => key
            .encode_utf16()
            .fold(0_u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit))),
        HashFunction::Xxh3 => {
            // Upper bits of xxh3 are the better distributed half.
            #[allow(clippy::cast_possible_truncation)]
            let upper = (xxh3_64(key.as_bytes()) >> 32) as u32;
            upper
        }
    }
}

/// Spreads the high-order bits of `hash` into the low-order bits used by the
/// mask.
#[must_use]
pub const fn perturb(hash: u32) -> u32 {
    hash ^ (hash >> 16)
}

/// Routes keys by perturbed hash over a fixed topology.
#[derive(Debug, Clone, Copy)]
pub struct HashShardingStrategy {
    config: RouterConfig,
}

impl HashShardingStrategy {
    /// Creates a strategy for the given topology.
    #[must_use]
    pub const fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Returns the topology.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Maps an already-perturbed hash to its shard.
    #[must_use]
    pub const fn shard_for_hash(&self, perturbed: u32) -> ShardingResult {
        let idx = perturbed & (self.config.total_shards() - 1);
        let db = idx / self.config.tb_count() + 1;
        let table = idx % self.config.tb_count();
        ShardingResult::new(DbIndex::new(db), TableIndex::new(table))
    }

    /// Computes the shard for a string key.
    #[must_use]
    pub fn shard_for_key(&self, key: &str) -> ShardingResult {
        self.shard_for_hash(perturb(hash_key(self.config.hash(), key)))
    }
}

impl ShardingStrategy for HashShardingStrategy {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn route(&self, key: &RoutingValue, ctx: &mut RoutingContext) -> RoutingResult<()> {
        let result = self.shard_for_key(&key.to_string());
        result.apply(ctx);

        debug!(
            strategy = self.name(),
            db = ?result.db,
            table = ?result.table,
            "routed key"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(db_count: u32, tb_count: u32) -> HashShardingStrategy {
        HashShardingStrategy::new(RouterConfig::new(db_count, tb_count).unwrap())
    }

    #[test]
    fn test_polynomial_hash_values() {
        assert_eq!(hash_key(HashFunction::Polynomial, ""), 0);
        assert_eq!(hash_key(HashFunction::Polynomial, "hello"), 99_162_322);
        // Wraps past i32::MAX.
        assert_eq!(hash_key(HashFunction::Polynomial, "user-1"), 3_458_935_471);
    }

    #[test]
    fn test_xxh3_hash_is_deterministic() {
        let a = hash_key(HashFunction::Xxh3, "key1");
        let b = hash_key(HashFunction::Xxh3, "key1");
        let c = hash_key(HashFunction::Xxh3, "key2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_perturb() {
        assert_eq!(perturb(5), 5);
        assert_eq!(perturb(0x0001_0000), 0x0001_0001);
        assert_eq!(perturb(99_162_322), 99_163_451);
    }

    #[test]
    fn test_shard_for_hash_example() {
        // idx 5 with 4 tables per database lands on db02 / _001.
        let result = strategy(2, 4).shard_for_hash(5);
        assert_eq!(result.db, Some(DbIndex::new(2)));
        assert_eq!(result.table, Some(TableIndex::new(1)));
        assert_eq!(result.db.unwrap().datasource().as_str(), "db02");
        assert_eq!(result.table.unwrap().physical_table("user"), "user_001");
    }

    #[test]
    fn test_shard_for_hash_masks_high_bits() {
        let s = strategy(2, 4);
        assert_eq!(s.shard_for_hash(8 + 5), s.shard_for_hash(5));
        assert_eq!(s.shard_for_hash(u32::MAX).db, Some(DbIndex::new(2)));
        assert_eq!(s.shard_for_hash(u32::MAX).table, Some(TableIndex::new(3)));
    }

    #[test]
    fn test_route_known_keys() {
        let s = strategy(2, 4);

        // "hello": perturbed 99163451, idx 3.
        let mut ctx = RoutingContext::new();
        s.route(&RoutingValue::from("hello"), &mut ctx).unwrap();
        assert_eq!(ctx.db_key().as_deref(), Some("01"));
        assert_eq!(ctx.table_key().as_deref(), Some("003"));

        // "user-1": idx 4.
        let mut ctx = RoutingContext::new();
        s.route(&RoutingValue::from("user-1"), &mut ctx).unwrap();
        assert_eq!(ctx.db_key().as_deref(), Some("02"));
        assert_eq!(ctx.table_key().as_deref(), Some("000"));
    }

    #[test]
    fn test_numeric_keys_hash_their_decimal_form() {
        let s = strategy(2, 4);
        let mut ctx = RoutingContext::new();
        s.route(&RoutingValue::from(10_001_u64), &mut ctx).unwrap();

        let expected = s.shard_for_key("10001");
        assert_eq!(ctx.db(), expected.db);
        assert_eq!(ctx.table(), expected.table);
    }

    #[test]
    fn test_indices_in_range() {
        for (db_count, tb_count) in [(1, 1), (1, 8), (2, 4), (4, 2), (8, 32), (16, 1)] {
            let s = strategy(db_count, tb_count);
            for i in 0..2_000 {
                let result = s.shard_for_key(&format!("key-{i}"));
                let db = result.db.unwrap().get();
                let table = result.table.unwrap().get();
                assert!((1..=db_count).contains(&db), "db {db} out of range");
                assert!(table < tb_count, "table {table} out of range");
            }
        }
    }

    #[test]
    fn test_routing_is_deterministic() {
        let s = strategy(4, 8);
        for i in 0..100 {
            let key = format!("order-{i}");
            assert_eq!(s.shard_for_key(&key), s.shard_for_key(&key));
        }
    }

    #[test]
    fn test_colliding_keys_share_a_shard() {
        // "Aa" and "BB" have the same polynomial hash.
        let s = strategy(2, 4);
        assert_eq!(
            hash_key(HashFunction::Polynomial, "Aa"),
            hash_key(HashFunction::Polynomial, "BB")
        );
        assert_eq!(s.shard_for_key("Aa"), s.shard_for_key("BB"));
    }

    #[test]
    fn test_distribution_is_roughly_uniform() {
        for hash in [HashFunction::Polynomial, HashFunction::Xxh3] {
            let s = HashShardingStrategy::new(RouterConfig::new(2, 4).unwrap().with_hash(hash));
            let mut counts = [0_u32; 8];
            for i in 0..8_000 {
                let result = s.shard_for_key(&format!("user-{i}"));
                let idx = (result.db.unwrap().get() - 1) * 4 + result.table.unwrap().get();
                counts[idx as usize] += 1;
            }
            for (idx, count) in counts.iter().enumerate() {
                assert!(
                    (500..=1_500).contains(count),
                    "{hash:?}: shard {idx} got {count} of 8000 keys"
                );
            }
        }
    }

    #[test]
    fn test_clear_after_route() {
        let s = strategy(2, 4);
        let mut ctx = RoutingContext::new();
        s.route(&RoutingValue::from("hello"), &mut ctx).unwrap();
        assert!(!ctx.is_empty());

        s.clear(&mut ctx);
        assert!(ctx.is_empty());
        assert_eq!(ctx.db_key(), None);
        assert_eq!(ctx.table_key(), None);
    }
}
