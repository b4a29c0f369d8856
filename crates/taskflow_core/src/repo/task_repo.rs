//! Task tree and assignment persistence.
//!
//! # Responsibility
//! - Store task rows, their parent links and `(task, employee)` assignments.
//! - Provide subtree reads and per-row deletion for cascade orchestration.
//!
//! # Invariants
//! - Child listing is deterministic: `task_id ASC`.
//! - `delete_task_rows` removes comments, assignments and the task row of
//!   exactly one task; history/log references are nulled by the schema.

use crate::model::tag::{PriorityTag, StatusTag};
use crate::model::task::Task;
use crate::repo::{
    date_to_db, ensure_connection_ready, parse_date, parse_tag, parse_timestamp, timestamp_to_db,
    RepoError, RepoResult,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;

const TASK_COLUMNS: &str = "task_id,
    project_id,
    parent_task_id,
    title,
    description,
    status,
    priority,
    start_date,
    due_date,
    estimate_hours,
    progress,
    created_at,
    updated_at";

/// Column values for one task insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaskRecord<'a> {
    pub project_id: i64,
    pub parent_task_id: Option<i64>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub status: &'a StatusTag,
    pub priority: &'a PriorityTag,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub estimate_hours: Option<f64>,
    pub progress: u8,
}

/// Repository interface for task tree operations.
pub trait TaskRepository {
    /// Inserts one task row and returns its id.
    fn create_task(&self, record: &NewTaskRecord<'_>, now: DateTime<Utc>) -> RepoResult<i64>;
    /// Loads one task with its assignees.
    fn get_task(&self, task_id: i64) -> RepoResult<Option<Task>>;
    /// Writes every scalar column of `task`; assignments are untouched.
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    /// Lists all tasks of a project, parents before children.
    fn list_project_tasks(&self, project_id: i64) -> RepoResult<Vec<Task>>;
    /// Loads `task_id` and all of its descendants.
    fn list_subtree(&self, task_id: i64) -> RepoResult<Vec<Task>>;
    fn list_child_ids(&self, task_id: i64) -> RepoResult<Vec<i64>>;
    fn list_root_ids(&self, project_id: i64) -> RepoResult<Vec<i64>>;
    fn is_assignee(&self, task_id: i64, emp_id: i64) -> RepoResult<bool>;
    /// Adds an assignment when absent. Returns whether a row was added.
    fn add_assignee(&self, task_id: i64, emp_id: i64, now: DateTime<Utc>) -> RepoResult<bool>;
    /// Returns whether a row was removed.
    fn remove_assignee(&self, task_id: i64, emp_id: i64) -> RepoResult<bool>;
    /// Drops every assignment of `emp_id` on tasks of `project_id`.
    fn remove_assignments_in_project(&self, project_id: i64, emp_id: i64) -> RepoResult<usize>;
    /// Deletes one task row together with its comments and assignments.
    fn delete_task_rows(&self, task_id: i64) -> RepoResult<()>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["tasks", "task_members", "task_comments"])?;
        Ok(Self { conn })
    }

    fn query_tasks(&self, sql: &str, param: i64) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([param])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        self.attach_assignees(&mut tasks)?;
        Ok(tasks)
    }

    fn attach_assignees(&self, tasks: &mut [Task]) -> RepoResult<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let mut index: BTreeMap<i64, usize> = BTreeMap::new();
        for (position, task) in tasks.iter().enumerate() {
            index.insert(task.task_id, position);
        }

        let placeholders = vec!["?"; index.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT task_id, emp_id
             FROM task_members
             WHERE task_id IN ({placeholders})
             ORDER BY task_id ASC, emp_id ASC;"
        ))?;
        let mut rows = stmt.query(rusqlite::params_from_iter(index.keys()))?;
        while let Some(row) = rows.next()? {
            let task_id: i64 = row.get(0)?;
            let emp_id: i64 = row.get(1)?;
            if let Some(position) = index.get(&task_id) {
                tasks[*position].assignee_ids.push(emp_id);
            }
        }
        Ok(())
    }

    fn query_ids(&self, sql: &str, param: i64) -> RepoResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([param])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, record: &NewTaskRecord<'_>, now: DateTime<Utc>) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO tasks (
                project_id,
                parent_task_id,
                title,
                description,
                status,
                priority,
                start_date,
                due_date,
                estimate_hours,
                progress,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11);",
            params![
                record.project_id,
                record.parent_task_id,
                record.title,
                record.description,
                record.status.as_str(),
                record.priority.as_str(),
                date_to_db(record.start_date),
                date_to_db(record.due_date),
                record.estimate_hours,
                i64::from(record.progress),
                timestamp_to_db(now),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_task(&self, task_id: i64) -> RepoResult<Option<Task>> {
        let mut tasks = self.query_tasks(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1;"),
            task_id,
        )?;
        Ok(tasks.pop())
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET title = ?2,
                 description = ?3,
                 status = ?4,
                 priority = ?5,
                 start_date = ?6,
                 due_date = ?7,
                 estimate_hours = ?8,
                 progress = ?9,
                 updated_at = ?10
             WHERE task_id = ?1;",
            params![
                task.task_id,
                task.title.as_str(),
                task.description.as_deref(),
                task.status.as_str(),
                task.priority.as_str(),
                date_to_db(task.start_date),
                date_to_db(task.due_date),
                task.estimate_hours,
                i64::from(task.progress),
                timestamp_to_db(task.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "tasks",
                id: task.task_id,
            });
        }
        Ok(())
    }

    fn list_project_tasks(&self, project_id: i64) -> RepoResult<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS}
                 FROM tasks
                 WHERE project_id = ?1
                 ORDER BY task_id ASC;"
            ),
            project_id,
        )
    }

    fn list_subtree(&self, task_id: i64) -> RepoResult<Vec<Task>> {
        // UNION (not UNION ALL) stops on corrupted cyclic parent links.
        self.query_tasks(
            &format!(
                "WITH RECURSIVE subtree(task_id) AS (
                    SELECT task_id FROM tasks WHERE task_id = ?1
                    UNION
                    SELECT child.task_id
                    FROM tasks child
                    INNER JOIN subtree parent ON child.parent_task_id = parent.task_id
                )
                SELECT {TASK_COLUMNS}
                FROM tasks
                WHERE task_id IN (SELECT task_id FROM subtree)
                ORDER BY task_id ASC;"
            ),
            task_id,
        )
    }

    fn list_child_ids(&self, task_id: i64) -> RepoResult<Vec<i64>> {
        self.query_ids(
            "SELECT task_id
             FROM tasks
             WHERE parent_task_id = ?1
             ORDER BY task_id ASC;",
            task_id,
        )
    }

    fn list_root_ids(&self, project_id: i64) -> RepoResult<Vec<i64>> {
        self.query_ids(
            "SELECT task_id
             FROM tasks
             WHERE project_id = ?1
               AND parent_task_id IS NULL
             ORDER BY task_id ASC;",
            project_id,
        )
    }

    fn is_assignee(&self, task_id: i64, emp_id: i64) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM task_members
                WHERE task_id = ?1
                  AND emp_id = ?2
            );",
            params![task_id, emp_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn add_assignee(&self, task_id: i64, emp_id: i64, now: DateTime<Utc>) -> RepoResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO task_members (task_id, emp_id, assigned_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (task_id, emp_id) DO NOTHING;",
            params![task_id, emp_id, timestamp_to_db(now)],
        )?;
        Ok(inserted == 1)
    }

    fn remove_assignee(&self, task_id: i64, emp_id: i64) -> RepoResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM task_members
             WHERE task_id = ?1
               AND emp_id = ?2;",
            params![task_id, emp_id],
        )?;
        Ok(removed == 1)
    }

    fn remove_assignments_in_project(&self, project_id: i64, emp_id: i64) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM task_members
             WHERE emp_id = ?2
               AND task_id IN (SELECT task_id FROM tasks WHERE project_id = ?1);",
            params![project_id, emp_id],
        )?;
        Ok(removed)
    }

    fn delete_task_rows(&self, task_id: i64) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM task_comments WHERE task_id = ?1;", [task_id])?;
        self.conn
            .execute("DELETE FROM task_members WHERE task_id = ?1;", [task_id])?;
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE task_id = ?1;", [task_id])?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "tasks",
                id: task_id,
            });
        }
        Ok(())
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let progress_value: i64 = row.get("progress")?;
    let progress = u8::try_from(progress_value)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid progress `{progress_value}` in tasks.progress"
            ))
        })?;

    Ok(Task {
        task_id: row.get("task_id")?,
        project_id: row.get("project_id")?,
        parent_task_id: row.get("parent_task_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: parse_tag(row.get("status")?, "tasks.status")?,
        priority: parse_tag(row.get("priority")?, "tasks.priority")?,
        start_date: parse_date(row.get("start_date")?, "tasks.start_date")?,
        due_date: parse_date(row.get("due_date")?, "tasks.due_date")?,
        estimate_hours: row.get("estimate_hours")?,
        progress,
        assignee_ids: Vec::new(),
        created_at: parse_timestamp(row.get("created_at")?, "tasks.created_at")?,
        updated_at: parse_timestamp(row.get("updated_at")?, "tasks.updated_at")?,
    })
}
