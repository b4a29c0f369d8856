//! Append-only activity persistence and the unified feed query.
//!
//! # Responsibility
//! - Append status history and generic activity log rows.
//! - Store task comments.
//! - Merge history, comments and activity logs into one ordered feed.
//!
//! # Invariants
//! - History and activity rows are never updated.
//! - Feed order: `created_at DESC, source_rank DESC, source_id DESC`.

use crate::model::activity::{
    ActivityLogEntry, FeedEntry, FeedSource, TaskComment, TaskHistoryEntry,
};
use crate::model::tag::{ActionTag, StatusTag};
use crate::repo::{
    ensure_connection_ready, parse_tag, parse_timestamp, timestamp_to_db, RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const FEED_SQL: &str = "SELECT created_at, task_id, emp_id, kind, detail, source_rank, source_id
FROM (
    SELECT
        h.changed_at AS created_at,
        h.task_id AS task_id,
        h.changed_by AS emp_id,
        'status_changed' AS kind,
        h.old_status || ' → ' || h.new_status AS detail,
        0 AS source_rank,
        h.history_id AS source_id
    FROM task_history h
    WHERE h.project_id = ?1
      AND (?2 IS NULL OR h.task_id = ?2)
    UNION ALL
    SELECT
        c.created_at,
        c.task_id,
        c.emp_id,
        'commented',
        c.content,
        1,
        c.comment_id
    FROM task_comments c
    WHERE c.project_id = ?1
      AND (?2 IS NULL OR c.task_id = ?2)
    UNION ALL
    SELECT
        l.created_at,
        l.task_id,
        l.emp_id,
        l.action,
        COALESCE(l.detail, ''),
        2,
        l.log_id
    FROM activity_logs l
    WHERE l.project_id = ?1
      AND (?2 IS NULL OR l.task_id = ?2)
)
ORDER BY created_at DESC, source_rank DESC, source_id DESC
LIMIT ?3;";

/// Repository interface for activity records.
pub trait ActivityRepository {
    fn append_log(
        &self,
        emp_id: i64,
        action: &ActionTag,
        project_id: Option<i64>,
        task_id: Option<i64>,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepoResult<ActivityLogEntry>;
    fn append_history(
        &self,
        project_id: i64,
        task_id: i64,
        old_status: &StatusTag,
        new_status: &StatusTag,
        changed_by: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<TaskHistoryEntry>;
    /// History rows of one task, newest first.
    fn list_task_history(&self, task_id: i64, limit: u32) -> RepoResult<Vec<TaskHistoryEntry>>;
    /// History rows attributed to one project, newest first. Includes rows
    /// whose task has been deleted.
    fn list_project_history(&self, project_id: i64, limit: u32)
        -> RepoResult<Vec<TaskHistoryEntry>>;
    fn insert_comment(
        &self,
        project_id: i64,
        task_id: i64,
        emp_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<TaskComment>;
    fn get_comment(&self, comment_id: i64) -> RepoResult<Option<TaskComment>>;
    fn update_comment(&self, comment_id: i64, content: &str, now: DateTime<Utc>) -> RepoResult<()>;
    fn delete_comment(&self, comment_id: i64) -> RepoResult<()>;
    /// Comments of one task, oldest first.
    fn list_comments(&self, task_id: i64) -> RepoResult<Vec<TaskComment>>;
    /// Unified feed of a project, optionally narrowed to one task.
    fn feed(&self, project_id: i64, task_id: Option<i64>, limit: u32) -> RepoResult<Vec<FeedEntry>>;
}

/// SQLite-backed activity repository.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["task_history", "task_comments", "activity_logs"])?;
        Ok(Self { conn })
    }

    fn query_history(&self, sql: &str, key: i64, limit: u32) -> RepoResult<Vec<TaskHistoryEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params![key, i64::from(limit)])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_history_row(row)?);
        }
        Ok(items)
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn append_log(
        &self,
        emp_id: i64,
        action: &ActionTag,
        project_id: Option<i64>,
        task_id: Option<i64>,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepoResult<ActivityLogEntry> {
        self.conn.execute(
            "INSERT INTO activity_logs (emp_id, project_id, task_id, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                emp_id,
                project_id,
                task_id,
                action.as_str(),
                detail,
                timestamp_to_db(now),
            ],
        )?;
        Ok(ActivityLogEntry {
            log_id: self.conn.last_insert_rowid(),
            emp_id,
            project_id,
            task_id,
            action: action.clone(),
            detail: detail.map(str::to_string),
            created_at: now,
        })
    }

    fn append_history(
        &self,
        project_id: i64,
        task_id: i64,
        old_status: &StatusTag,
        new_status: &StatusTag,
        changed_by: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<TaskHistoryEntry> {
        self.conn.execute(
            "INSERT INTO task_history (
                project_id,
                task_id,
                old_status,
                new_status,
                changed_by,
                changed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                project_id,
                task_id,
                old_status.as_str(),
                new_status.as_str(),
                changed_by,
                timestamp_to_db(now),
            ],
        )?;
        Ok(TaskHistoryEntry {
            history_id: self.conn.last_insert_rowid(),
            project_id: Some(project_id),
            task_id: Some(task_id),
            old_status: old_status.clone(),
            new_status: new_status.clone(),
            changed_by: Some(changed_by),
            changed_at: now,
        })
    }

    fn list_task_history(&self, task_id: i64, limit: u32) -> RepoResult<Vec<TaskHistoryEntry>> {
        self.query_history(
            "SELECT history_id, project_id, task_id, old_status, new_status, changed_by, changed_at
             FROM task_history
             WHERE task_id = ?1
             ORDER BY changed_at DESC, history_id DESC
             LIMIT ?2;",
            task_id,
            limit,
        )
    }

    fn list_project_history(
        &self,
        project_id: i64,
        limit: u32,
    ) -> RepoResult<Vec<TaskHistoryEntry>> {
        self.query_history(
            "SELECT history_id, project_id, task_id, old_status, new_status, changed_by, changed_at
             FROM task_history
             WHERE project_id = ?1
             ORDER BY changed_at DESC, history_id DESC
             LIMIT ?2;",
            project_id,
            limit,
        )
    }

    fn insert_comment(
        &self,
        project_id: i64,
        task_id: i64,
        emp_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<TaskComment> {
        self.conn.execute(
            "INSERT INTO task_comments (project_id, task_id, emp_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5);",
            params![project_id, task_id, emp_id, content, timestamp_to_db(now)],
        )?;
        Ok(TaskComment {
            comment_id: self.conn.last_insert_rowid(),
            project_id,
            task_id,
            emp_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn get_comment(&self, comment_id: i64) -> RepoResult<Option<TaskComment>> {
        let mut stmt = self.conn.prepare(
            "SELECT comment_id, project_id, task_id, emp_id, content, created_at, updated_at
             FROM task_comments
             WHERE comment_id = ?1;",
        )?;
        let mut rows = stmt.query([comment_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_comment_row(row)?));
        }
        Ok(None)
    }

    fn update_comment(&self, comment_id: i64, content: &str, now: DateTime<Utc>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE task_comments
             SET content = ?2,
                 updated_at = ?3
             WHERE comment_id = ?1;",
            params![comment_id, content, timestamp_to_db(now)],
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "task_comments",
                id: comment_id,
            });
        }
        Ok(())
    }

    fn delete_comment(&self, comment_id: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM task_comments WHERE comment_id = ?1;",
            [comment_id],
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "task_comments",
                id: comment_id,
            });
        }
        Ok(())
    }

    fn list_comments(&self, task_id: i64) -> RepoResult<Vec<TaskComment>> {
        let mut stmt = self.conn.prepare(
            "SELECT comment_id, project_id, task_id, emp_id, content, created_at, updated_at
             FROM task_comments
             WHERE task_id = ?1
             ORDER BY created_at ASC, comment_id ASC;",
        )?;
        let mut rows = stmt.query([task_id])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_comment_row(row)?);
        }
        Ok(items)
    }

    fn feed(
        &self,
        project_id: i64,
        task_id: Option<i64>,
        limit: u32,
    ) -> RepoResult<Vec<FeedEntry>> {
        let mut stmt = self.conn.prepare(FEED_SQL)?;
        let mut rows = stmt.query(params![project_id, task_id, i64::from(limit)])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_feed_row(row)?);
        }
        Ok(items)
    }
}

fn parse_history_row(row: &Row<'_>) -> RepoResult<TaskHistoryEntry> {
    Ok(TaskHistoryEntry {
        history_id: row.get("history_id")?,
        project_id: row.get("project_id")?,
        task_id: row.get("task_id")?,
        old_status: parse_tag(row.get("old_status")?, "task_history.old_status")?,
        new_status: parse_tag(row.get("new_status")?, "task_history.new_status")?,
        changed_by: row.get("changed_by")?,
        changed_at: parse_timestamp(row.get("changed_at")?, "task_history.changed_at")?,
    })
}

fn parse_comment_row(row: &Row<'_>) -> RepoResult<TaskComment> {
    Ok(TaskComment {
        comment_id: row.get("comment_id")?,
        project_id: row.get("project_id")?,
        task_id: row.get("task_id")?,
        emp_id: row.get("emp_id")?,
        content: row.get("content")?,
        created_at: parse_timestamp(row.get("created_at")?, "task_comments.created_at")?,
        updated_at: parse_timestamp(row.get("updated_at")?, "task_comments.updated_at")?,
    })
}

fn parse_feed_row(row: &Row<'_>) -> RepoResult<FeedEntry> {
    let rank: i64 = row.get("source_rank")?;
    let source = FeedSource::from_rank(rank)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid feed source rank `{rank}`")))?;
    Ok(FeedEntry {
        created_at: parse_timestamp(row.get("created_at")?, "feed.created_at")?,
        task_id: row.get("task_id")?,
        emp_id: row.get("emp_id")?,
        kind: row.get("kind")?,
        detail: row.get("detail")?,
        source,
        source_id: row.get("source_id")?,
    })
}
