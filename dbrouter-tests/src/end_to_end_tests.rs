//! Topology file to executed statements.

use std::io::Write;

use dbrouter_core::{DataSourceId, RoutingContext};
use dbrouter_routing::{Argument, Fields, RoutingValue};
use dbrouter_server::{ConfigError, Topology};
use dbrouter_tx::{ConnectionError, ConnectionEvent, TransactionCoordinator};

use crate::scenarios::keys;

const TOPOLOGY: &str = r#"
db_count = 2
tb_count = 4
default_datasource = "db01"
list = ["db01", "db02"]

[datasources.db01]
url = "mysql://10.0.0.1:3306/shop"

[datasources.db02]
url = "mysql://10.0.0.2:3306/shop"

[entities.user]

[entities.coupon]
split_table = false

[operations.insert_user]
key = "user_id"
entity = "user"
transactional = true

[operations.grant_coupon]
key = "user_id"
entity = "coupon"
"#;

fn load() -> Topology {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TOPOLOGY.as_bytes()).unwrap();
    Topology::from_file(file.path()).unwrap()
}

#[derive(Debug, PartialEq, Eq)]
enum ShopError {
    Connection(ConnectionError),
    OutOfStock,
}

#[test]
fn test_end_to_end_register_user_and_grant_coupon() {
    let topology = load();
    let router = topology.router();
    let insert = topology.operation(Some("insert_user"), None);
    let grant = topology.operation(Some("grant_coupon"), None);
    assert!(insert.transactional);

    let user = Fields::new().with("user_id", keys::DB02).with("name", "ada");
    let mut ctx = RoutingContext::new();
    let mut tx = TransactionCoordinator::new();

    // The configured marker on insert_user opens the transaction; grant_coupon
    // joins it.
    let result: Result<(), ShopError> = router.in_scope(&insert, &mut tx, |tx| {
        for (op, sql) in [
            (&insert, "insert into user (user_id, name) values (?, ?)"),
            (&grant, "insert into coupon (user_id) values (?)"),
        ] {
            router
                .invoke(op, &[Argument::Record(&user)], &mut ctx, |ctx| {
                    let conn = topology.datasource().acquire_connection(ctx, tx)?;
                    conn.execute(&router.rewrite(sql, op, ctx)).map(|_| ())
                })
                .map_err(|e| ShopError::Connection(e.into_operation().unwrap()))?;
        }
        Ok(())
    });

    assert_eq!(result, Ok(()));
    let db02 = topology.memory(&DataSourceId::new("db02")).unwrap();
    assert_eq!(
        db02.log().events_for(db02.id()),
        vec![
            ConnectionEvent::Connect,
            ConnectionEvent::AutoCommit(false),
            ConnectionEvent::Execute("insert into user_000 (user_id, name) values (?, ?)".to_string()),
            ConnectionEvent::Execute("insert into coupon (user_id) values (?)".to_string()),
            ConnectionEvent::Commit,
            ConnectionEvent::Close,
        ]
    );
    assert!(ctx.is_empty());
    assert!(!tx.is_open());
}

#[test]
fn test_end_to_end_business_failure_rolls_back_every_shard() {
    let topology = load();
    let router = topology.router();
    let insert = topology.operation(Some("insert_user"), None);
    let mut ctx = RoutingContext::new();
    let mut tx = TransactionCoordinator::new();

    let result: Result<(), ShopError> = router.in_scope(&insert, &mut tx, |tx| {
        for key in [keys::DB01, keys::DB02] {
            let key = RoutingValue::from(key);
            router
                .invoke(&insert, &[Argument::Key(Some(&key))], &mut ctx, |ctx| {
                    let conn = topology.datasource().acquire_connection(ctx, tx)?;
                    conn.execute(&router.rewrite("update user set credits = 0", &insert, ctx))
                })
                .map_err(|e| ShopError::Connection(e.into_operation().unwrap()))?;
        }
        Err(ShopError::OutOfStock)
    });

    assert_eq!(result, Err(ShopError::OutOfStock));
    let log = topology.log();
    assert_eq!(
        log.datasources_with(&ConnectionEvent::Rollback),
        vec![DataSourceId::new("db01"), DataSourceId::new("db02")]
    );
    assert!(log.datasources_with(&ConnectionEvent::Commit).is_empty());
    assert_eq!(log.datasources_with(&ConnectionEvent::Close).len(), 2);
}

#[test]
fn test_end_to_end_unrouted_call_uses_default_datasource() {
    let topology = load();
    let ctx = RoutingContext::new();
    let mut tx = TransactionCoordinator::new();

    let conn = topology
        .datasource()
        .acquire_connection(&ctx, &mut tx)
        .unwrap();
    assert_eq!(conn.shard().as_str(), "db01");

    let op = topology.operation(Some("insert_user"), None);
    assert_eq!(
        topology.router().rewrite("select * from user", &op, &ctx),
        "select * from user"
    );
}

#[test]
fn test_end_to_end_invalid_topology_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"db_count = 3\ntb_count = 4\nlist = [\"db01\"]\n[datasources.db01]\n")
        .unwrap();

    let err = Topology::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Router(_)));
}
