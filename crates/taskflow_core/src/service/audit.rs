//! Append-only audit writer.
//!
//! # Invariants
//! - Never mutates or reads existing rows; callers supply valid ids.
//! - Write failures propagate; nothing is swallowed.

use crate::clock::Clock;
use crate::error::CoreResult;
use crate::model::activity::{status_transition_detail, ActivityLogEntry, TaskHistoryEntry};
use crate::model::tag::{ActionTag, StatusTag};
use crate::repo::activity_repo::ActivityRepository;

/// Stateless recorder of activity log and status history rows.
pub struct AuditRecorder<'r, A> {
    activity: &'r A,
    clock: &'r dyn Clock,
}

impl<'r, A: ActivityRepository> AuditRecorder<'r, A> {
    pub fn new(activity: &'r A, clock: &'r dyn Clock) -> Self {
        Self { activity, clock }
    }

    /// Appends one activity log row.
    pub fn record(
        &self,
        actor_emp_id: i64,
        action: &ActionTag,
        project_id: Option<i64>,
        task_id: Option<i64>,
        detail: Option<&str>,
    ) -> CoreResult<ActivityLogEntry> {
        let entry = self.activity.append_log(
            actor_emp_id,
            action,
            project_id,
            task_id,
            detail,
            self.clock.now(),
        )?;
        Ok(entry)
    }

    /// Appends the TaskHistory row and the matching `status_changed` log
    /// of one transition, sharing one timestamp.
    pub fn record_status_change(
        &self,
        actor_emp_id: i64,
        project_id: i64,
        task_id: i64,
        old_status: &StatusTag,
        new_status: &StatusTag,
    ) -> CoreResult<TaskHistoryEntry> {
        let now = self.clock.now();
        let history = self.activity.append_history(
            project_id,
            task_id,
            old_status,
            new_status,
            actor_emp_id,
            now,
        )?;
        let detail = status_transition_detail(old_status, new_status);
        self.activity.append_log(
            actor_emp_id,
            &ActionTag::builtin(ActionTag::STATUS_CHANGED),
            Some(project_id),
            Some(task_id),
            Some(detail.as_str()),
            now,
        )?;
        Ok(history)
    }
}
