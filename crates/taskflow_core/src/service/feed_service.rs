//! Activity feed aggregator.
//!
//! # Responsibility
//! - Serve the merged TaskHistory + TaskComment + ActivityLog stream of a
//!   project, optionally narrowed to one task.
//!
//! # Invariants
//! - Only current project members can read a feed; any other requester,
//!   including one asking for an unknown project, is denied.
//! - Entries are ordered by `created_at` descending, ties by source rank
//!   then row id, both descending.
//! - The limit is defaulted and capped by `EngineConfig`.

use crate::error::{CoreError, CoreResult, NotFound};
use crate::model::activity::{FeedEntry, TaskHistoryEntry};
use crate::repo::activity_repo::ActivityRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::{log_outcome, CoreContext, Store};
use std::time::Instant;

const MODULE: &str = "feed_service";

/// Read-only facade over the feed and history queries.
pub struct FeedService<'conn> {
    ctx: CoreContext<'conn>,
}

impl<'conn> FeedService<'conn> {
    pub fn new(ctx: CoreContext<'conn>) -> Self {
        Self { ctx }
    }

    /// Newest-first feed of everything that happened in a project.
    ///
    /// `limit` of `None` or `0` uses the configured default; larger values
    /// are capped.
    pub fn get_project_feed(
        &self,
        project_id: i64,
        requester_id: i64,
        limit: Option<u32>,
    ) -> CoreResult<Vec<FeedEntry>> {
        let started_at = Instant::now();
        let limit = self.ctx.config().normalize_feed_limit(limit);
        let result = self.ctx.read(|store| {
            authorize_reader(store, project_id, requester_id)?;
            Ok(store.activity.feed(project_id, None, limit)?)
        });
        log_outcome("feed_project", MODULE, started_at, &result);
        result
    }

    /// Project feed narrowed to rows that reference `task_id`.
    pub fn get_task_feed(
        &self,
        project_id: i64,
        task_id: i64,
        requester_id: i64,
        limit: Option<u32>,
    ) -> CoreResult<Vec<FeedEntry>> {
        let started_at = Instant::now();
        let limit = self.ctx.config().normalize_feed_limit(limit);
        let result = self.ctx.read(|store| {
            authorize_reader(store, project_id, requester_id)?;
            require_task_in_project(store, project_id, task_id)?;
            Ok(store.activity.feed(project_id, Some(task_id), limit)?)
        });
        log_outcome("feed_task", MODULE, started_at, &result);
        result
    }

    /// Status transitions attributed to the project, newest first. Rows of
    /// deleted tasks are included with `task_id: None`.
    pub fn project_history(
        &self,
        project_id: i64,
        requester_id: i64,
        limit: Option<u32>,
    ) -> CoreResult<Vec<TaskHistoryEntry>> {
        let limit = self.ctx.config().normalize_feed_limit(limit);
        self.ctx.read(|store| {
            authorize_reader(store, project_id, requester_id)?;
            Ok(store.activity.list_project_history(project_id, limit)?)
        })
    }

    /// Status transitions of one task, newest first.
    pub fn task_history(
        &self,
        project_id: i64,
        task_id: i64,
        requester_id: i64,
        limit: Option<u32>,
    ) -> CoreResult<Vec<TaskHistoryEntry>> {
        let limit = self.ctx.config().normalize_feed_limit(limit);
        self.ctx.read(|store| {
            authorize_reader(store, project_id, requester_id)?;
            require_task_in_project(store, project_id, task_id)?;
            Ok(store.activity.list_task_history(task_id, limit)?)
        })
    }
}

// A missing project has no member rows, so it is reported as a denial.
fn authorize_reader(store: &Store<'_>, project_id: i64, requester_id: i64) -> CoreResult<()> {
    if store.guard().is_member(project_id, requester_id)? {
        Ok(())
    } else {
        Err(CoreError::denied(requester_id, "read_feed"))
    }
}

fn require_task_in_project(store: &Store<'_>, project_id: i64, task_id: i64) -> CoreResult<()> {
    match store.tasks.get_task(task_id)? {
        Some(task) if task.project_id == project_id => Ok(()),
        _ => Err(NotFound::TaskInProject {
            project_id,
            task_id,
        }
        .into()),
    }
}
