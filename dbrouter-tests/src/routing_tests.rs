//! Routing through the public router API.

use std::collections::HashMap;

use dbrouter_core::{DbIndex, RouterConfig, RoutingContext, TableIndex};
use dbrouter_routing::{
    AlgorithmFailurePolicy, Argument, EntityPolicy, FieldSource, Fields, InvokeError,
    OperationSpec, RoutingError, RoutingValue, ShardRouter,
};

use crate::scenarios::{keys, Harness};

/// A record type exposing its fields explicitly.
struct Order {
    order_id: String,
    customer: Customer,
}

struct Customer {
    user_id: String,
}

impl FieldSource for Customer {
    fn field(&self, name: &str) -> Option<RoutingValue> {
        (name == "user_id").then(|| RoutingValue::from(self.user_id.as_str()))
    }
}

impl FieldSource for Order {
    fn field(&self, name: &str) -> Option<RoutingValue> {
        (name == "order_id").then(|| RoutingValue::from(self.order_id.as_str()))
    }

    fn parent(&self) -> Option<&dyn FieldSource> {
        Some(&self.customer)
    }
}

#[test]
fn test_routing_known_placements() {
    let harness = Harness::new(2, 4);
    let op = OperationSpec::new("find_user", "user_id");
    let mut ctx = RoutingContext::new();

    let placements = [
        (keys::DB01, 1, 3),
        (keys::DB02, 2, 0),
        (keys::DB01_OTHER_TABLE, 1, 2),
    ];
    for (key, db, table) in placements {
        let record = Fields::new().with("user_id", key);
        harness
            .router
            .route(&op, &[Argument::Record(&record)], &mut ctx)
            .unwrap();
        assert_eq!(ctx.db(), Some(DbIndex::new(db)), "key {key}");
        assert_eq!(ctx.table(), Some(TableIndex::new(table)), "key {key}");
        ctx.clear();
    }
}

#[test]
fn test_routing_key_from_parent_record() {
    let harness = Harness::new(2, 4);
    let order = Order {
        order_id: "o-1".to_string(),
        customer: Customer {
            user_id: keys::DB02.to_string(),
        },
    };
    let op = OperationSpec::new("insert_order", "user_id");
    let mut ctx = RoutingContext::new();

    harness
        .router
        .route(&op, &[Argument::Other, Argument::Record(&order)], &mut ctx)
        .unwrap();
    assert_eq!(ctx.datasource().unwrap().as_str(), "db02");
}

#[test]
fn test_routing_record_wins_over_marked_key() {
    let harness = Harness::new(2, 4);
    let record = Fields::new().with("user_id", keys::DB02);
    let marked = RoutingValue::from(keys::DB01);
    let op = OperationSpec::new("update_user", "user_id");
    let mut ctx = RoutingContext::new();

    harness
        .router
        .route(
            &op,
            &[Argument::Key(Some(&marked)), Argument::Record(&record)],
            &mut ctx,
        )
        .unwrap();
    assert_eq!(ctx.db_key().as_deref(), Some("02"));
}

#[test]
fn test_routing_missing_key_is_fatal() {
    let harness = Harness::new(2, 4);
    let op = OperationSpec::new("update_user", "user_id");
    let mut ctx = RoutingContext::new();
    let mut ran = false;

    let result = harness.router.invoke(
        &op,
        &[Argument::Key(None), Argument::Other],
        &mut ctx,
        |_| {
            ran = true;
            Ok::<_, ()>(())
        },
    );

    assert!(!ran);
    assert!(matches!(
        result,
        Err(InvokeError::Routing(RoutingError::MissingRoutingKey { ref field })) if field == "user_id"
    ));
    assert!(ctx.is_empty());
}

#[test]
fn test_routing_algorithm_entity_and_degrade() {
    let config = RouterConfig::new(2, 4).unwrap();
    let harness = Harness::new(2, 4);
    let router = ShardRouter::new(config)
        .with_algorithms(std::sync::Arc::clone(harness.router.algorithms()))
        .with_entity("ledger", EntityPolicy::new().with_algorithm("modulo"))
        .with_entity("audit", EntityPolicy::new().with_algorithm("daily"));
    let mut ctx = RoutingContext::new();

    router
        .route_key(&RoutingValue::from(13_u64), Some("ledger"), &mut ctx)
        .unwrap();
    // 13 / 4 = 3, 3 % 2 = 1 -> db02; 13 % 4 = 1.
    assert_eq!(ctx.db_key().as_deref(), Some("02"));
    assert_eq!(ctx.table_key().as_deref(), Some("001"));
    ctx.clear();

    // Text key for a numeric algorithm: skipped, context untouched.
    router
        .route_key(&RoutingValue::from("thirteen"), Some("ledger"), &mut ctx)
        .unwrap();
    assert!(ctx.is_empty());

    router
        .route_key(&RoutingValue::from("x"), Some("audit"), &mut ctx)
        .unwrap();
    assert!(ctx.is_empty());

    let strict = router.with_algorithm_failure(AlgorithmFailurePolicy::FailFast);
    let err = strict
        .route_key(&RoutingValue::from("x"), Some("audit"), &mut ctx)
        .unwrap_err();
    assert_eq!(
        err,
        RoutingError::AlgorithmNotFound {
            name: "daily".to_string()
        }
    );
}

#[test]
fn test_routing_rewrite_per_entity() {
    let config = RouterConfig::new(2, 4).unwrap();
    let router = ShardRouter::new(config)
        .with_entity("user", EntityPolicy::new())
        .with_entity("account", EntityPolicy::new().without_table_split());
    let mut ctx = RoutingContext::new();
    router
        .route_key(&RoutingValue::from(keys::DB01), Some("user"), &mut ctx)
        .unwrap();

    let user = OperationSpec::new("find_user", "user_id").for_entity("user");
    let account = OperationSpec::new("find_account", "user_id").for_entity("account");

    assert_eq!(
        router.rewrite("select * from user where user_id = ?", &user, &ctx),
        "select * from user_003 where user_id = ?"
    );
    assert_eq!(
        router.rewrite("select * from account where user_id = ?", &account, &ctx),
        "select * from account where user_id = ?"
    );
}

#[test]
fn test_routing_spreads_keys_evenly() {
    let harness = Harness::new(2, 4);
    let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
    let mut ctx = RoutingContext::new();

    for i in 0..8000 {
        let key = RoutingValue::from(format!("user-{i}"));
        harness.router.route_key(&key, None, &mut ctx).unwrap();
        let slot = (ctx.db().unwrap().get(), ctx.table().unwrap().get());
        *counts.entry(slot).or_default() += 1;
        ctx.clear();
    }

    assert_eq!(counts.len(), 8);
    for (slot, count) in counts {
        assert!((500..=1500).contains(&count), "slot {slot:?} got {count}");
    }
}
