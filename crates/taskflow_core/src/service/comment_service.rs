//! Task comments and mention notifications.
//!
//! # Invariants
//! - Comment bodies are trimmed and non-empty.
//! - Only the author edits a comment; the author or the project OWNER
//!   deletes it.
//! - The comment row is its own feed entry; creation appends no
//!   `commented` log.

use crate::error::{CoreError, CoreResult, NotFound, ValidationError};
use crate::model::activity::TaskComment;
use crate::model::tag::ActionTag;
use crate::notify::NotificationEvent;
use crate::repo::activity_repo::ActivityRepository;
use crate::service::task_service::TaskEngine;
use crate::service::{log_outcome, CoreContext, Store};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::time::Instant;

const MODULE: &str = "comment_service";

static MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\d+)").expect("valid mention regex"));

/// Facade for comment operations on tasks.
pub struct CommentService<'conn> {
    ctx: CoreContext<'conn>,
}

impl<'conn> CommentService<'conn> {
    pub fn new(ctx: CoreContext<'conn>) -> Self {
        Self { ctx }
    }

    fn engine<'s, 'c>(&'s self, store: &'s Store<'c>) -> TaskEngine<'s, 'c> {
        TaskEngine::new(store, self.ctx.config(), self.ctx.clock())
    }

    /// Adds a comment. Each distinct `@<emp_id>` other than the author
    /// appends one `mentioned` log and is notified.
    pub fn add_comment(
        &self,
        task_id: i64,
        actor_id: i64,
        content: &str,
    ) -> CoreResult<TaskComment> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let content = normalize_content(content)?;
            let engine = self.engine(store);
            let task = engine.require_task(task_id)?;
            engine.require_member(task.project_id, actor_id, "add_comment")?;

            let comment = store.activity.insert_comment(
                task.project_id,
                task.task_id,
                actor_id,
                content,
                self.ctx.now(),
            )?;
            let mentions = parse_mentions(content, actor_id);
            let audit = store.audit(self.ctx.clock());
            for mentioned in &mentions {
                let detail = format!("@{mentioned}");
                audit.record(
                    actor_id,
                    &ActionTag::builtin(ActionTag::MENTIONED),
                    Some(task.project_id),
                    Some(task.task_id),
                    Some(detail.as_str()),
                )?;
            }
            store.notify(
                mentions,
                actor_id,
                task.project_id,
                Some(task.task_id),
                NotificationEvent::Mention {
                    comment_id: comment.comment_id,
                },
            );
            Ok(comment)
        });
        log_outcome("comment_add", MODULE, started_at, &result);
        result
    }

    /// Author only.
    pub fn edit_comment(
        &self,
        comment_id: i64,
        actor_id: i64,
        content: &str,
    ) -> CoreResult<TaskComment> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let content = normalize_content(content)?;
            let mut comment = require_comment(store, comment_id)?;
            if comment.emp_id != actor_id {
                return Err(CoreError::denied(actor_id, "edit_comment"));
            }

            let now = self.ctx.now();
            store.activity.update_comment(comment_id, content, now)?;
            let detail = format!("comment {comment_id}");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::COMMENT_EDITED),
                Some(comment.project_id),
                Some(comment.task_id),
                Some(detail.as_str()),
            )?;
            comment.content = content.to_owned();
            comment.updated_at = now;
            Ok(comment)
        });
        log_outcome("comment_edit", MODULE, started_at, &result);
        result
    }

    /// Author or project OWNER.
    pub fn delete_comment(&self, comment_id: i64, actor_id: i64) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let comment = require_comment(store, comment_id)?;
            if comment.emp_id != actor_id
                && !store.guard().is_owner(comment.project_id, actor_id)?
            {
                return Err(CoreError::denied(actor_id, "delete_comment"));
            }

            store.activity.delete_comment(comment_id)?;
            let detail = format!("comment {comment_id}");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::COMMENT_DELETED),
                Some(comment.project_id),
                Some(comment.task_id),
                Some(detail.as_str()),
            )?;
            Ok(())
        });
        log_outcome("comment_delete", MODULE, started_at, &result);
        result
    }

    /// Members only; oldest first.
    pub fn list_comments(&self, task_id: i64, actor_id: i64) -> CoreResult<Vec<TaskComment>> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            let task = engine.require_task(task_id)?;
            engine.require_member(task.project_id, actor_id, "list_comments")?;
            Ok(store.activity.list_comments(task_id)?)
        })
    }
}

fn normalize_content(content: &str) -> Result<&str, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyContent)
    } else {
        Ok(trimmed)
    }
}

fn require_comment(store: &Store<'_>, comment_id: i64) -> CoreResult<TaskComment> {
    store
        .activity
        .get_comment(comment_id)?
        .ok_or(CoreError::NotFound(NotFound::Comment(comment_id)))
}

/// Distinct mentioned employee ids, ascending, without the author.
fn parse_mentions(content: &str, author_id: i64) -> BTreeSet<i64> {
    MENTION_PATTERN
        .captures_iter(content)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<i64>().ok())
        .filter(|emp_id| *emp_id != author_id)
        .collect()
}
