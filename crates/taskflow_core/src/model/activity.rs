//! Append-only activity records and the unified feed entry.

use crate::model::tag::{ActionTag, StatusTag};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskComment {
    pub comment_id: i64,
    pub project_id: i64,
    pub task_id: i64,
    pub emp_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One status transition. `task_id` is nulled when the task is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHistoryEntry {
    pub history_id: i64,
    pub project_id: Option<i64>,
    pub task_id: Option<i64>,
    pub old_status: StatusTag,
    pub new_status: StatusTag,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLogEntry {
    pub log_id: i64,
    pub emp_id: i64,
    pub project_id: Option<i64>,
    pub task_id: Option<i64>,
    pub action: ActionTag,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Table a feed entry was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    History,
    Comment,
    Activity,
}

impl FeedSource {
    /// Secondary sort rank for entries sharing one timestamp.
    pub fn rank(self) -> i64 {
        match self {
            Self::History => 0,
            Self::Comment => 1,
            Self::Activity => 2,
        }
    }

    pub(crate) fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(Self::History),
            1 => Some(Self::Comment),
            2 => Some(Self::Activity),
            _ => None,
        }
    }
}

/// Normalized row of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub created_at: DateTime<Utc>,
    pub task_id: Option<i64>,
    pub emp_id: Option<i64>,
    /// `status_changed`, `commented`, or the activity log's own action.
    #[serde(rename = "type")]
    pub kind: String,
    pub detail: String,
    pub source: FeedSource,
    pub source_id: i64,
}

/// Detail text of a status transition, e.g. `IN_PROGRESS → DONE`.
pub fn status_transition_detail(old: &StatusTag, new: &StatusTag) -> String {
    format!("{old} → {new}")
}
