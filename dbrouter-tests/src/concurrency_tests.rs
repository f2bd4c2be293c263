//! Independent calls sharing one router and its datasources.
//!
//! Every call owns its routing context and coordinator; only the router
//! and the physical datasources are shared.

use std::collections::BTreeMap;
use std::thread;

use dbrouter_tx::ConnectionEvent;

use crate::scenarios::{keys, Harness};

#[test]
fn test_concurrent_transactions_stay_isolated() {
    let harness = Harness::new(2, 4);
    let workers = 8;

    thread::scope(|s| {
        for worker in 0..workers {
            let harness = &harness;
            s.spawn(move || {
                // Odd workers fail and must roll back only their own work.
                let fail = worker % 2 == 1;
                let result = harness.transaction(&[keys::DB01, keys::DB02], "update user set n = 1", fail);
                assert_eq!(result.is_err(), fail);
            });
        }
    });

    let mut per_connection: BTreeMap<(String, u64), Vec<ConnectionEvent>> = BTreeMap::new();
    for record in harness.log.records() {
        per_connection
            .entry((record.datasource.as_str().to_string(), record.connection))
            .or_default()
            .push(record.event);
    }

    // One connection per shard per worker, each ending in exactly one
    // commit or rollback followed by close.
    assert_eq!(per_connection.len(), 2 * workers);
    let mut commits = 0;
    let mut rollbacks = 0;
    for events in per_connection.values() {
        assert_eq!(events.first(), Some(&ConnectionEvent::Connect));
        assert_eq!(events.last(), Some(&ConnectionEvent::Close));
        let ending = &events[events.len() - 2];
        match ending {
            ConnectionEvent::Commit => commits += 1,
            ConnectionEvent::Rollback => rollbacks += 1,
            other => panic!("unexpected ending {other:?}"),
        }
    }
    assert_eq!(commits, workers);
    assert_eq!(rollbacks, workers);
    assert_eq!(harness.shard(1).active(), 0);
    assert_eq!(harness.shard(2).active(), 0);
}

#[test]
fn test_concurrent_single_key_transactions_share_pools() {
    let harness = Harness::new(2, 4);

    thread::scope(|s| {
        for i in 0..16 {
            let harness = &harness;
            s.spawn(move || {
                let key = format!("user-{i}");
                harness
                    .transaction(&[key.as_str()], "select * from user", false)
                    .unwrap();
            });
        }
    });

    let connects = harness.log.datasources_with(&ConnectionEvent::Connect).len();
    assert_eq!(connects, 16);
    assert_eq!(harness.shard(1).active() + harness.shard(2).active(), 0);
}
