//! Outbound notifications for employees affected by a change.
//!
//! # Responsibility
//! - Describe who should hear about an assignment, a status or progress
//!   change, or a mention.
//! - Hand committed notifications to a pluggable [`Notifier`].
//!
//! # Invariants
//! - The actor never receives a notification for their own action.
//! - Recipients are distinct and ascending.
//! - Notifications of a rolled-back transaction are never delivered.

use crate::model::tag::StatusTag;
use serde::Serialize;
use std::collections::BTreeSet;

/// What happened, with the data a recipient needs to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Assignment {
        title: String,
    },
    StatusChange {
        old_status: StatusTag,
        new_status: StatusTag,
    },
    ProgressChange {
        old_progress: u8,
        new_progress: u8,
    },
    Mention {
        comment_id: i64,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Assignment { .. } => "assignment",
            Self::StatusChange { .. } => "status_change",
            Self::ProgressChange { .. } => "progress_change",
            Self::Mention { .. } => "mention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipients: Vec<i64>,
    pub actor_id: i64,
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub event: NotificationEvent,
}

impl Notification {
    /// Drops the actor and duplicate ids; `None` when nobody is left.
    pub fn new(
        recipients: impl IntoIterator<Item = i64>,
        actor_id: i64,
        project_id: i64,
        task_id: Option<i64>,
        event: NotificationEvent,
    ) -> Option<Self> {
        let recipients: BTreeSet<i64> = recipients
            .into_iter()
            .filter(|emp_id| *emp_id != actor_id)
            .collect();
        if recipients.is_empty() {
            return None;
        }
        Some(Self {
            recipients: recipients.into_iter().collect(),
            actor_id,
            project_id,
            task_id,
            event,
        })
    }
}

/// Delivery seam. Called after the producing transaction committed;
/// delivery failures are the implementation's concern.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification) {}
}
