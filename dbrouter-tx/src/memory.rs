//! In-memory datasource.
//!
//! Connections execute nothing; they record every call into a shared
//! [`EventLog`], so the order in which a transaction touched, committed and
//! closed its shards can be inspected afterwards. Commit and rollback
//! failures can be injected per datasource.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dbrouter_core::DataSourceId;

use crate::connection::{Connection, DataSource};
use crate::error::ConnectionError;

/// A call made on an in-memory connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection was opened.
    Connect,
    /// A statement was executed.
    Execute(String),
    /// Automatic commit was switched.
    AutoCommit(bool),
    /// A commit was attempted.
    Commit,
    /// A rollback was attempted.
    Rollback,
    /// The connection was closed.
    Close,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Datasource the connection belongs to.
    pub datasource: DataSourceId,
    /// Connection number within the datasource, from 1.
    pub connection: u64,
    /// What happened.
    pub event: ConnectionEvent,
}

/// Ordered record of calls, shareable across datasources.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<EventRecord>>>);

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, datasource: &DataSourceId, connection: u64, event: ConnectionEvent) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(EventRecord {
                datasource: datasource.clone(),
                connection,
                event,
            });
    }

    /// Returns every record so far.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the events of one datasource, in order.
    #[must_use]
    pub fn events_for(&self, datasource: &DataSourceId) -> Vec<ConnectionEvent> {
        self.records()
            .into_iter()
            .filter(|r| &r.datasource == datasource)
            .map(|r| r.event)
            .collect()
    }

    /// Returns the datasources that received `event`, in order.
    #[must_use]
    pub fn datasources_with(&self, event: &ConnectionEvent) -> Vec<DataSourceId> {
        self.records()
            .into_iter()
            .filter(|r| &r.event == event)
            .map(|r| r.datasource)
            .collect()
    }

    /// Discards every record.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[derive(Debug, Default)]
struct Faults {
    auto_commit: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
}

/// Datasource handing out recording connections.
#[derive(Debug)]
pub struct MemoryDataSource {
    id: DataSourceId,
    log: EventLog,
    next_connection: AtomicU64,
    active: Arc<AtomicU32>,
    max_active: Option<u32>,
    faults: Arc<Faults>,
}

impl MemoryDataSource {
    /// Creates a datasource with its own log and no connection limit.
    #[must_use]
    pub fn new(id: impl Into<DataSourceId>) -> Self {
        Self::with_log(id, EventLog::new())
    }

    /// Creates a datasource recording into a shared log.
    #[must_use]
    pub fn with_log(id: impl Into<DataSourceId>, log: EventLog) -> Self {
        Self {
            id: id.into(),
            log,
            next_connection: AtomicU64::new(1),
            active: Arc::new(AtomicU32::new(0)),
            max_active: None,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Limits the number of simultaneously open connections.
    #[must_use]
    pub const fn with_max_active(mut self, max_active: u32) -> Self {
        self.max_active = Some(max_active);
        self
    }

    /// Returns the datasource identifier.
    #[must_use]
    pub const fn id(&self) -> &DataSourceId {
        &self.id
    }

    /// Returns the event log.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// Makes every subsequent automatic-commit switch on this datasource
    /// fail.
    pub fn fail_auto_commit(&self, fail: bool) {
        self.faults.auto_commit.store(fail, Ordering::Release);
    }

    /// Makes every subsequent commit on this datasource fail.
    pub fn fail_commits(&self, fail: bool) {
        self.faults.commit.store(fail, Ordering::Release);
    }

    /// Makes every subsequent rollback on this datasource fail.
    pub fn fail_rollbacks(&self, fail: bool) {
        self.faults.rollback.store(fail, Ordering::Release);
    }
}

impl DataSource for MemoryDataSource {
    fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(max) = self.max_active {
            if active > max {
                self.active.fetch_sub(1, Ordering::AcqRel);
                return Err(ConnectionError::PoolExhausted {
                    id: self.id.clone(),
                    active: max,
                    max,
                });
            }
        }

        let number = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.log.record(&self.id, number, ConnectionEvent::Connect);
        Ok(Box::new(MemoryConnection {
            datasource: self.id.clone(),
            number,
            log: self.log.clone(),
            active: Arc::clone(&self.active),
            faults: Arc::clone(&self.faults),
            auto_commit: true,
            closed: false,
        }))
    }
}

struct MemoryConnection {
    datasource: DataSourceId,
    number: u64,
    log: EventLog,
    active: Arc<AtomicU32>,
    faults: Arc<Faults>,
    auto_commit: bool,
    closed: bool,
}

impl MemoryConnection {
    fn record(&self, event: ConnectionEvent) {
        self.log.record(&self.datasource, self.number, event);
    }

    const fn check_open(&self) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, ConnectionError> {
        self.check_open()?;
        self.record(ConnectionEvent::Execute(sql.to_string()));
        Ok(1)
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.record(ConnectionEvent::AutoCommit(auto_commit));
        if self.faults.auto_commit.load(Ordering::Acquire) {
            return Err(ConnectionError::Backend {
                operation: "set_auto_commit",
                message: format!("injected auto-commit failure on {}", self.datasource),
            });
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.record(ConnectionEvent::Commit);
        if self.faults.commit.load(Ordering::Acquire) {
            return Err(ConnectionError::Backend {
                operation: "commit",
                message: format!("injected commit failure on {}", self.datasource),
            });
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.record(ConnectionEvent::Rollback);
        if self.faults.rollback.load(Ordering::Acquire) {
            return Err(ConnectionError::Backend {
                operation: "rollback",
                message: format!("injected rollback failure on {}", self.datasource),
            });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.record(ConnectionEvent::Close);
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
