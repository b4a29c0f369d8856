//! Task tree records and inputs.
//!
//! # Invariants
//! - `progress` is within `0..=100`.
//! - A task's parent, when present, belongs to the same project.
//! - `assignee_ids` is sorted ascending and free of duplicates.

use crate::model::patch::FieldPatch;
use crate::model::tag::{PriorityTag, StatusTag};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_PROGRESS: i32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: i64,
    pub project_id: i64,
    pub parent_task_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: StatusTag,
    pub priority: PriorityTag,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub estimate_hours: Option<f64>,
    pub progress: u8,
    pub assignee_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task with its materialized subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTree {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<TaskTree>,
}

impl TaskTree {
    /// Number of tasks in this tree, root included.
    pub fn task_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.subtasks.iter());
        }
        count
    }

    /// Depth-first lookup by title, mostly useful in tests and tooling.
    pub fn find_by_title(&self, title: &str) -> Option<&TaskTree> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.task.title == title {
                return Some(node);
            }
            stack.extend(node.subtasks.iter());
        }
        None
    }
}

/// One node of a task tree to create.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TaskNode {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Defaults to `MEDIUM`.
    #[serde(default)]
    pub priority: Option<PriorityTag>,
    /// Defaults to the configured initial task status.
    #[serde(default)]
    pub status: Option<StatusTag>,
    /// Defaults to 0.
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub estimate_hours: Option<f64>,
    #[serde(default)]
    pub assignee_ids: Vec<i64>,
    #[serde(default)]
    pub subtasks: Vec<TaskNode>,
}

impl TaskNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_assignees(mut self, assignee_ids: impl IntoIterator<Item = i64>) -> Self {
        self.assignee_ids = assignee_ids.into_iter().collect();
        self
    }

    pub fn with_status(mut self, status: StatusTag) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_subtask(mut self, child: TaskNode) -> Self {
        self.subtasks.push(child);
        self
    }
}

/// Partial update for task fields.
///
/// `assignee_ids: Set(vec![])` clears every assignment; `Keep` leaves
/// assignments untouched.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub title: FieldPatch<String>,
    pub description: FieldPatch<Option<String>>,
    pub status: FieldPatch<StatusTag>,
    pub priority: FieldPatch<PriorityTag>,
    pub start_date: FieldPatch<Option<NaiveDate>>,
    pub due_date: FieldPatch<Option<NaiveDate>>,
    pub estimate_hours: FieldPatch<Option<f64>>,
    pub progress: FieldPatch<i32>,
    pub assignee_ids: FieldPatch<Vec<i64>>,
}

impl TaskPatch {
    pub fn assignees(assignee_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            assignee_ids: FieldPatch::Set(assignee_ids.into_iter().collect()),
            ..Self::default()
        }
    }
}
