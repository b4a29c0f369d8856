//! Use-case services over the repository layer.
//!
//! # Responsibility
//! - Authorize, validate and apply every mutation inside one transaction.
//! - Append audit rows in the same transaction as the change they describe.
//! - Deliver queued notifications once that transaction has committed.
//!
//! # Invariants
//! - Validation and permission checks run before the first write.
//! - A failed operation leaves no partial state: the transaction is rolled
//!   back when dropped uncommitted.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::notify::{NoopNotifier, Notification, NotificationEvent, Notifier};
use crate::repo::activity_repo::SqliteActivityRepository;
use crate::repo::project_repo::SqliteProjectRepository;
use crate::repo::task_repo::SqliteTaskRepository;
use crate::repo::RepoResult;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

pub mod access_guard;
pub mod audit;
pub mod comment_service;
pub mod feed_service;
pub mod project_service;
pub mod task_service;

/// Shared dependencies of every service.
#[derive(Clone)]
pub struct CoreContext<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl<'conn> CoreContext<'conn> {
    /// Context with default config and wall-clock time.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Replaces the config after validating it.
    pub fn with_config(mut self, config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs `op` inside one IMMEDIATE transaction; commits only on `Ok`.
    /// Notifications queued by `op` are delivered after the commit.
    pub(crate) fn transact<T, F>(&self, op: F) -> CoreResult<T>
    where
        F: FnOnce(&Store<'_>) -> CoreResult<T>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let (value, outbox) = {
            let store = Store::open(&tx)?;
            let value = op(&store)?;
            (value, store.outbox.into_inner())
        };
        tx.commit()?;
        self.deliver(&outbox);
        Ok(value)
    }

    fn deliver(&self, outbox: &[Notification]) {
        for notification in outbox {
            self.notifier.notify(notification);
            debug!(
                "event=notification_deliver module=service status=ok kind={} project_id={} recipient_count={}",
                notification.event.kind(),
                notification.project_id,
                notification.recipients.len()
            );
        }
    }

    /// Runs a read-only `op` directly on the connection.
    pub(crate) fn read<T, F>(&self, op: F) -> CoreResult<T>
    where
        F: FnOnce(&Store<'_>) -> CoreResult<T>,
    {
        let store = Store::open(self.conn)?;
        op(&store)
    }
}

/// The three repositories bound to one connection or transaction, plus
/// the notifications waiting for that transaction to commit.
pub(crate) struct Store<'c> {
    pub(crate) projects: SqliteProjectRepository<'c>,
    pub(crate) tasks: SqliteTaskRepository<'c>,
    pub(crate) activity: SqliteActivityRepository<'c>,
    outbox: RefCell<Vec<Notification>>,
}

impl<'c> Store<'c> {
    pub(crate) fn open(conn: &'c Connection) -> RepoResult<Self> {
        Ok(Self {
            projects: SqliteProjectRepository::try_new(conn)?,
            tasks: SqliteTaskRepository::try_new(conn)?,
            activity: SqliteActivityRepository::try_new(conn)?,
            outbox: RefCell::new(Vec::new()),
        })
    }

    /// Queues a notification for everyone in `recipients` except the actor.
    pub(crate) fn notify(
        &self,
        recipients: impl IntoIterator<Item = i64>,
        actor_id: i64,
        project_id: i64,
        task_id: Option<i64>,
        event: NotificationEvent,
    ) {
        if let Some(notification) =
            Notification::new(recipients, actor_id, project_id, task_id, event)
        {
            self.outbox.borrow_mut().push(notification);
        }
    }

    pub(crate) fn guard(
        &self,
    ) -> access_guard::AccessGuard<'_, SqliteProjectRepository<'c>, SqliteTaskRepository<'c>> {
        access_guard::AccessGuard::new(&self.projects, &self.tasks)
    }

    pub(crate) fn audit<'a>(
        &'a self,
        clock: &'a dyn Clock,
    ) -> audit::AuditRecorder<'a, SqliteActivityRepository<'c>> {
        audit::AuditRecorder::new(&self.activity, clock)
    }
}

/// Emits one metadata-only outcome event for a service operation.
pub(crate) fn log_outcome<T>(
    event: &'static str,
    module: &'static str,
    started_at: Instant,
    result: &CoreResult<T>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => debug!("event={event} module={module} status=ok duration_ms={duration_ms}"),
        Err(err) if err.kind() == ErrorKind::Storage => error!(
            "event={event} module={module} status=error duration_ms={duration_ms} error_kind=storage error={err}"
        ),
        Err(err) => warn!(
            "event={event} module={module} status=rejected duration_ms={duration_ms} error_kind={}",
            error_kind_name(err)
        ),
    }
}

fn error_kind_name(err: &CoreError) -> &'static str {
    match err.kind() {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Permission => "permission",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Storage => "storage",
    }
}
