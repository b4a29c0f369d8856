//! Task hierarchy engine.
//!
//! # Responsibility
//! - Create task trees, apply partial updates, transition status and
//!   progress, cascade-delete subtrees.
//! - Keep task assignments and project membership in sync.
//! - Notify assignees of assignments and status or progress changes.
//!
//! # Invariants
//! - A task's parent belongs to the same project.
//! - `0 <= progress <= 100`.
//! - Auto-membership inserts MEMBER rows only; existing roles are kept.
//! - Subtree traversal uses an explicit work-list, never recursion over
//!   stored rows.

use crate::clock::Clock;
use crate::config::{EngineConfig, SameStatusPolicy};
use crate::error::{CoreError, CoreResult, NotFound, ValidationError};
use crate::model::project::{MemberRole, Project};
use crate::model::patch::FieldPatch;
use crate::model::tag::{ActionTag, PriorityTag, StatusTag};
use crate::model::task::{Task, TaskNode, TaskPatch, TaskTree, MAX_PROGRESS};
use crate::notify::NotificationEvent;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::{NewTaskRecord, TaskRepository};
use crate::repo::RepoError;
use crate::service::{log_outcome, CoreContext, Store};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;

const MODULE: &str = "task_service";

/// Transaction-scoped engine; every method assumes the caller owns the
/// enclosing transaction.
pub(crate) struct TaskEngine<'s, 'c> {
    store: &'s Store<'c>,
    config: &'s EngineConfig,
    clock: &'s dyn Clock,
}

impl<'s, 'c> TaskEngine<'s, 'c> {
    pub(crate) fn new(
        store: &'s Store<'c>,
        config: &'s EngineConfig,
        clock: &'s dyn Clock,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub(crate) fn require_project(&self, project_id: i64) -> CoreResult<Project> {
        self.store
            .projects
            .get_project(project_id)?
            .ok_or(CoreError::NotFound(NotFound::Project(project_id)))
    }

    pub(crate) fn require_task(&self, task_id: i64) -> CoreResult<Task> {
        self.store
            .tasks
            .get_task(task_id)?
            .ok_or(CoreError::NotFound(NotFound::Task(task_id)))
    }

    /// Any membership; returns the role.
    pub(crate) fn require_member(
        &self,
        project_id: i64,
        emp_id: i64,
        action: &'static str,
    ) -> CoreResult<MemberRole> {
        self.store
            .guard()
            .role(project_id, emp_id)?
            .ok_or_else(|| CoreError::denied(emp_id, action))
    }

    pub(crate) fn require_owner(
        &self,
        project_id: i64,
        emp_id: i64,
        action: &'static str,
    ) -> CoreResult<()> {
        if self.store.guard().is_owner(project_id, emp_id)? {
            Ok(())
        } else {
            Err(CoreError::denied(emp_id, action))
        }
    }

    fn require_contributor(
        &self,
        project_id: i64,
        emp_id: i64,
        action: &'static str,
    ) -> CoreResult<()> {
        if self.store.guard().can_contribute(project_id, emp_id)? {
            Ok(())
        } else {
            Err(CoreError::denied(emp_id, action))
        }
    }

    fn require_task_mutation(
        &self,
        task: &Task,
        emp_id: i64,
        action: &'static str,
    ) -> CoreResult<()> {
        if self.store.guard().can_mutate_task(task, emp_id)? {
            Ok(())
        } else {
            Err(CoreError::denied(emp_id, action))
        }
    }

    /// Validates the whole input tree, then inserts it top-down.
    pub(crate) fn create_tree(
        &self,
        project_id: i64,
        actor_id: i64,
        node: &TaskNode,
        parent_task_id: Option<i64>,
    ) -> CoreResult<TaskTree> {
        validate_node(node, 1, self.config.max_tree_depth)?;
        self.require_project(project_id)?;
        self.require_contributor(project_id, actor_id, "create_task")?;
        if let Some(parent_id) = parent_task_id {
            let parent = self.require_task(parent_id)?;
            if parent.project_id != project_id {
                return Err(ValidationError::ParentInOtherProject {
                    parent_task_id: parent_id,
                    project_id,
                }
                .into());
            }
        }
        self.insert_node(project_id, actor_id, node, parent_task_id)
    }

    // Depth is bounded by `validate_node`.
    fn insert_node(
        &self,
        project_id: i64,
        actor_id: i64,
        node: &TaskNode,
        parent_task_id: Option<i64>,
    ) -> CoreResult<TaskTree> {
        let now = self.clock.now();
        let status = node
            .status
            .clone()
            .unwrap_or_else(|| self.config.initial_task_status.clone());
        let priority = node.priority.clone().unwrap_or_else(PriorityTag::medium);
        let progress = validate_progress(node.progress.unwrap_or(0))?;
        let record = NewTaskRecord {
            project_id,
            parent_task_id,
            title: node.title.trim(),
            description: node.description.as_deref(),
            status: &status,
            priority: &priority,
            start_date: node.start_date,
            due_date: node.due_date,
            estimate_hours: node.estimate_hours,
            progress,
        };
        let task_id = self.store.tasks.create_task(&record, now)?;
        for emp_id in unique_ids(&node.assignee_ids) {
            self.assign(project_id, task_id, emp_id, now)?;
        }
        let task = self.load_task(task_id)?;
        self.store.notify(
            task.assignee_ids.iter().copied(),
            actor_id,
            project_id,
            Some(task_id),
            NotificationEvent::Assignment {
                title: task.title.clone(),
            },
        );

        let mut subtasks = Vec::with_capacity(node.subtasks.len());
        for child in &node.subtasks {
            subtasks.push(self.insert_node(project_id, actor_id, child, Some(task_id))?);
        }
        Ok(TaskTree { task, subtasks })
    }

    fn load_task(&self, task_id: i64) -> CoreResult<Task> {
        self.store.tasks.get_task(task_id)?.ok_or_else(|| {
            RepoError::RowNotFound {
                table: "tasks",
                id: task_id,
            }
            .into()
        })
    }

    /// Task assignment plus idempotent auto-membership.
    fn assign(
        &self,
        project_id: i64,
        task_id: i64,
        emp_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let added = self.store.tasks.add_assignee(task_id, emp_id, now)?;
        self.store
            .projects
            .ensure_member(project_id, emp_id, MemberRole::Member, now)?;
        Ok(added)
    }

    pub(crate) fn update(&self, task_id: i64, patch: TaskPatch, actor_id: i64) -> CoreResult<Task> {
        let mut task = self.require_task(task_id)?;
        self.require_task_mutation(&task, actor_id, "update_task")?;

        if let Some(title) = patch.title.as_set() {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle.into());
            }
        }
        let new_progress = match patch.progress.as_set() {
            Some(value) => Some(validate_progress(*value)?),
            None => None,
        };
        let start_date = patch.start_date.as_set().copied().unwrap_or(task.start_date);
        let due_date = patch.due_date.as_set().copied().unwrap_or(task.due_date);
        validate_dates(start_date, due_date)?;
        if let Some(estimate) = patch.estimate_hours.as_set() {
            validate_estimate(*estimate)?;
        }

        let now = self.clock.now();
        let audit = self.store.audit(self.clock);
        let TaskPatch {
            title,
            description,
            status,
            priority,
            start_date,
            due_date,
            estimate_hours,
            progress: _,
            assignee_ids,
        } = patch;

        let mut changed_fields: Vec<&'static str> = Vec::new();
        if let FieldPatch::Set(title) = title {
            let title = title.trim();
            if title != task.title {
                task.title = title.to_owned();
                changed_fields.push("title");
            }
        }
        if description.apply_to(&mut task.description) {
            changed_fields.push("description");
        }
        let old_status = task.status.clone();
        let status_changed = status.apply_to(&mut task.status);
        if status_changed && !self.config.history_on_field_update {
            changed_fields.push("status");
        }
        if priority.apply_to(&mut task.priority) {
            changed_fields.push("priority");
        }
        if start_date.apply_to(&mut task.start_date) {
            changed_fields.push("start_date");
        }
        if due_date.apply_to(&mut task.due_date) {
            changed_fields.push("due_date");
        }
        if estimate_hours.apply_to(&mut task.estimate_hours) {
            changed_fields.push("estimate_hours");
        }
        let old_progress = task.progress;
        let progress_changed = match new_progress {
            Some(value) if value != task.progress => {
                task.progress = value;
                true
            }
            _ => false,
        };

        let (added, removed) = match assignee_ids {
            FieldPatch::Set(ids) => self.sync_assignees(&task, &ids, now)?,
            FieldPatch::Keep => (Vec::new(), Vec::new()),
        };
        let assignees_changed = !added.is_empty() || !removed.is_empty();

        if !changed_fields.is_empty() || status_changed || progress_changed || assignees_changed {
            task.updated_at = now;
            self.store.tasks.update_task(&task)?;
        }

        let (project_id, task_ref) = (Some(task.project_id), Some(task.task_id));
        if status_changed && self.config.history_on_field_update {
            audit.record_status_change(
                actor_id,
                task.project_id,
                task.task_id,
                &old_status,
                &task.status,
            )?;
        }
        if progress_changed {
            let detail = progress_detail(old_progress, task.progress);
            audit.record(
                actor_id,
                &ActionTag::builtin(ActionTag::PROGRESS_CHANGED),
                project_id,
                task_ref,
                Some(detail.as_str()),
            )?;
        }
        if assignees_changed {
            let detail = format!("+{added:?} -{removed:?}");
            audit.record(
                actor_id,
                &ActionTag::builtin(ActionTag::ASSIGNEE_CHANGED),
                project_id,
                task_ref,
                Some(detail.as_str()),
            )?;
        }
        if !changed_fields.is_empty() {
            let detail = changed_fields.join(", ");
            audit.record(
                actor_id,
                &ActionTag::builtin(ActionTag::TASK_UPDATED),
                project_id,
                task_ref,
                Some(detail.as_str()),
            )?;
        }

        let updated = self.load_task(task.task_id)?;
        self.notify_update(&updated, actor_id, &added, status_changed.then_some(old_status));
        if progress_changed {
            self.notify_progress(&updated, actor_id, old_progress);
        }
        Ok(updated)
    }

    fn notify_update(
        &self,
        task: &Task,
        actor_id: i64,
        added: &[i64],
        old_status: Option<StatusTag>,
    ) {
        self.store.notify(
            added.iter().copied(),
            actor_id,
            task.project_id,
            Some(task.task_id),
            NotificationEvent::Assignment {
                title: task.title.clone(),
            },
        );
        if let Some(old_status) = old_status {
            self.notify_status(task, actor_id, old_status);
        }
    }

    fn notify_status(&self, task: &Task, actor_id: i64, old_status: StatusTag) {
        if old_status == task.status {
            return;
        }
        self.store.notify(
            task.assignee_ids.iter().copied(),
            actor_id,
            task.project_id,
            Some(task.task_id),
            NotificationEvent::StatusChange {
                old_status,
                new_status: task.status.clone(),
            },
        );
    }

    fn notify_progress(&self, task: &Task, actor_id: i64, old_progress: u8) {
        self.store.notify(
            task.assignee_ids.iter().copied(),
            actor_id,
            task.project_id,
            Some(task.task_id),
            NotificationEvent::ProgressChange {
                old_progress,
                new_progress: task.progress,
            },
        );
    }

    /// Returns `(added, removed)` assignee ids, both ascending.
    fn sync_assignees(
        &self,
        task: &Task,
        assignee_ids: &[i64],
        now: DateTime<Utc>,
    ) -> CoreResult<(Vec<i64>, Vec<i64>)> {
        let desired: BTreeSet<i64> = assignee_ids.iter().copied().collect();
        let current: BTreeSet<i64> = task.assignee_ids.iter().copied().collect();
        let removed: Vec<i64> = current.difference(&desired).copied().collect();
        let added: Vec<i64> = desired.difference(&current).copied().collect();

        for emp_id in &removed {
            self.store.tasks.remove_assignee(task.task_id, *emp_id)?;
        }
        for emp_id in &added {
            self.assign(task.project_id, task.task_id, *emp_id, now)?;
        }
        Ok((added, removed))
    }

    pub(crate) fn change_status(
        &self,
        task_id: i64,
        new_status: StatusTag,
        actor_id: i64,
    ) -> CoreResult<Task> {
        let mut task = self.require_task(task_id)?;
        self.require_task_mutation(&task, actor_id, "change_status")?;
        if task.status == new_status && self.config.same_status_policy == SameStatusPolicy::Skip {
            return Ok(task);
        }

        let old_status = std::mem::replace(&mut task.status, new_status);
        task.updated_at = self.clock.now();
        self.store.tasks.update_task(&task)?;
        self.store.audit(self.clock).record_status_change(
            actor_id,
            task.project_id,
            task.task_id,
            &old_status,
            &task.status,
        )?;
        self.notify_status(&task, actor_id, old_status);
        Ok(task)
    }

    pub(crate) fn change_progress(
        &self,
        task_id: i64,
        new_progress: i32,
        actor_id: i64,
    ) -> CoreResult<Task> {
        let progress = validate_progress(new_progress)?;
        let mut task = self.require_task(task_id)?;
        self.require_task_mutation(&task, actor_id, "change_progress")?;

        let old_progress = std::mem::replace(&mut task.progress, progress);
        task.updated_at = self.clock.now();
        self.store.tasks.update_task(&task)?;
        let detail = progress_detail(old_progress, progress);
        self.store.audit(self.clock).record(
            actor_id,
            &ActionTag::builtin(ActionTag::PROGRESS_CHANGED),
            Some(task.project_id),
            Some(task.task_id),
            Some(detail.as_str()),
        )?;
        self.notify_progress(&task, actor_id, old_progress);
        Ok(task)
    }

    /// Logs `task_deleted`, then removes the task and its whole subtree.
    /// Returns the number of deleted tasks.
    pub(crate) fn delete(&self, task_id: i64, actor_id: i64) -> CoreResult<usize> {
        let task = self.require_task(task_id)?;
        self.require_task_mutation(&task, actor_id, "delete_task")?;

        let detail = format!("deleted task '{}'", task.title);
        self.store.audit(self.clock).record(
            actor_id,
            &ActionTag::builtin(ActionTag::TASK_DELETED),
            Some(task.project_id),
            Some(task.task_id),
            Some(detail.as_str()),
        )?;
        self.delete_subtree_rows(task.task_id)
    }

    /// Deletes every task of a project, root by root. No audit rows.
    pub(crate) fn delete_project_tasks(&self, project_id: i64) -> CoreResult<usize> {
        let mut deleted = 0;
        for root_id in self.store.tasks.list_root_ids(project_id)? {
            deleted += self.delete_subtree_rows(root_id)?;
        }
        Ok(deleted)
    }

    fn delete_subtree_rows(&self, root_id: i64) -> CoreResult<usize> {
        let order = self.collect_subtree_ids(root_id)?;
        // Reverse breadth-first order removes children before parents.
        for task_id in order.iter().rev() {
            self.store.tasks.delete_task_rows(*task_id)?;
        }
        Ok(order.len())
    }

    fn collect_subtree_ids(&self, root_id: i64) -> CoreResult<Vec<i64>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root_id]);
        while let Some(task_id) = queue.pop_front() {
            if !visited.insert(task_id) {
                continue;
            }
            order.push(task_id);
            queue.extend(self.store.tasks.list_child_ids(task_id)?);
        }
        Ok(order)
    }
}

/// Public facade of the task hierarchy engine.
///
/// Every mutating call runs in one IMMEDIATE transaction that also holds
/// the audit rows it produces.
pub struct TaskService<'conn> {
    ctx: CoreContext<'conn>,
}

impl<'conn> TaskService<'conn> {
    pub fn new(ctx: CoreContext<'conn>) -> Self {
        Self { ctx }
    }

    fn engine<'s, 'c>(&'s self, store: &'s Store<'c>) -> TaskEngine<'s, 'c> {
        TaskEngine::new(store, self.ctx.config(), self.ctx.clock())
    }

    /// Creates `node` and its nested subtasks under `project_id`, all or
    /// nothing. Writes no audit rows.
    pub fn create_task_tree(
        &self,
        project_id: i64,
        actor_id: i64,
        node: &TaskNode,
        parent_task_id: Option<i64>,
    ) -> CoreResult<TaskTree> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            self.engine(store)
                .create_tree(project_id, actor_id, node, parent_task_id)
        });
        log_outcome("task_tree_create", MODULE, started_at, &result);
        if let Ok(tree) = &result {
            info!(
                "event=task_tree_create module={MODULE} status=ok project_id={project_id} root_task_id={} task_count={}",
                tree.task.task_id,
                tree.task_count()
            );
        }
        result
    }

    /// [`Self::create_task_tree`] plus a `task_created` log for the root.
    pub fn create_task(
        &self,
        project_id: i64,
        actor_id: i64,
        node: &TaskNode,
        parent_task_id: Option<i64>,
    ) -> CoreResult<TaskTree> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let tree = self
                .engine(store)
                .create_tree(project_id, actor_id, node, parent_task_id)?;
            let detail = format!("created task '{}'", tree.task.title);
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::TASK_CREATED),
                Some(project_id),
                Some(tree.task.task_id),
                Some(detail.as_str()),
            )?;
            Ok(tree)
        });
        log_outcome("task_create", MODULE, started_at, &result);
        result
    }

    /// Members only.
    pub fn get_task(&self, task_id: i64, actor_id: i64) -> CoreResult<Task> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            let task = engine.require_task(task_id)?;
            engine.require_member(task.project_id, actor_id, "read_task")?;
            Ok(task)
        })
    }

    /// Loads a task with its materialized subtree. Members only.
    pub fn get_task_tree(&self, task_id: i64, actor_id: i64) -> CoreResult<TaskTree> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            let task = engine.require_task(task_id)?;
            engine.require_member(task.project_id, actor_id, "read_task")?;
            let rows = store.tasks.list_subtree(task_id)?;
            assemble_tree(task_id, rows).ok_or(CoreError::NotFound(NotFound::Task(task_id)))
        })
    }

    /// Flat task list of a project, parents before children. Members only.
    pub fn list_project_tasks(&self, project_id: i64, actor_id: i64) -> CoreResult<Vec<Task>> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            engine.require_project(project_id)?;
            engine.require_member(project_id, actor_id, "list_tasks")?;
            Ok(store.tasks.list_project_tasks(project_id)?)
        })
    }

    /// Applies a partial update. Allowed to the project OWNER and to
    /// current assignees.
    pub fn update_task(&self, task_id: i64, patch: TaskPatch, actor_id: i64) -> CoreResult<Task> {
        let started_at = Instant::now();
        let result = self
            .ctx
            .transact(|store| self.engine(store).update(task_id, patch, actor_id));
        log_outcome("task_update", MODULE, started_at, &result);
        result
    }

    /// Sets the status and appends one TaskHistory row plus a
    /// `status_changed` log. Any tag may follow any other.
    pub fn change_status(
        &self,
        task_id: i64,
        new_status: StatusTag,
        actor_id: i64,
    ) -> CoreResult<Task> {
        let started_at = Instant::now();
        let result = self
            .ctx
            .transact(|store| self.engine(store).change_status(task_id, new_status, actor_id));
        log_outcome("task_status_change", MODULE, started_at, &result);
        result
    }

    pub fn change_progress(
        &self,
        task_id: i64,
        new_progress: i32,
        actor_id: i64,
    ) -> CoreResult<Task> {
        let started_at = Instant::now();
        let result = self
            .ctx
            .transact(|store| self.engine(store).change_progress(task_id, new_progress, actor_id));
        log_outcome("task_progress_change", MODULE, started_at, &result);
        result
    }

    /// Deletes the task with its subtree, assignments and comments.
    /// History rows survive with a nulled task reference.
    pub fn delete_task(&self, task_id: i64, actor_id: i64) -> CoreResult<usize> {
        let started_at = Instant::now();
        let result = self
            .ctx
            .transact(|store| self.engine(store).delete(task_id, actor_id));
        log_outcome("task_delete", MODULE, started_at, &result);
        if let Ok(count) = &result {
            info!(
                "event=task_delete module={MODULE} status=ok task_id={task_id} deleted_count={count}"
            );
        }
        result
    }
}

// Bounded by `max_depth`: deeper input is rejected before recursing further.
fn validate_node(node: &TaskNode, depth: usize, max_depth: usize) -> Result<(), ValidationError> {
    if depth > max_depth {
        return Err(ValidationError::TreeTooDeep { max_depth });
    }
    if node.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if let Some(progress) = node.progress {
        validate_progress(progress)?;
    }
    validate_dates(node.start_date, node.due_date)?;
    validate_estimate(node.estimate_hours)?;
    for child in &node.subtasks {
        validate_node(child, depth + 1, max_depth)?;
    }
    Ok(())
}

fn validate_progress(value: i32) -> Result<u8, ValidationError> {
    if (0..=MAX_PROGRESS).contains(&value) {
        u8::try_from(value).map_err(|_| ValidationError::ProgressOutOfRange(i64::from(value)))
    } else {
        Err(ValidationError::ProgressOutOfRange(i64::from(value)))
    }
}

pub(crate) fn validate_dates(
    start: Option<NaiveDate>,
    due: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => {
            Err(ValidationError::DueBeforeStart { start, due })
        }
        _ => Ok(()),
    }
}

fn validate_estimate(value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(hours) if hours < 0.0 || hours.is_nan() => {
            Err(ValidationError::NegativeEstimate(hours))
        }
        _ => Ok(()),
    }
}

fn unique_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn progress_detail(old: u8, new: u8) -> String {
    format!("{old}% → {new}%")
}

/// Builds the nested tree rooted at `root_id` from flat subtree rows,
/// bottom-up over a breadth-first order.
fn assemble_tree(root_id: i64, rows: Vec<Task>) -> Option<TaskTree> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut tasks: HashMap<i64, Task> = HashMap::with_capacity(rows.len());
    for task in rows {
        if let Some(parent_id) = task.parent_task_id {
            children.entry(parent_id).or_default().push(task.task_id);
        }
        tasks.insert(task.task_id, task);
    }
    for ids in children.values_mut() {
        ids.sort_unstable();
    }

    let mut order = Vec::with_capacity(tasks.len());
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root_id]);
    while let Some(task_id) = queue.pop_front() {
        if !visited.insert(task_id) {
            continue;
        }
        order.push(task_id);
        if let Some(ids) = children.get(&task_id) {
            queue.extend(ids.iter().copied());
        }
    }

    let mut built: HashMap<i64, TaskTree> = HashMap::with_capacity(order.len());
    for task_id in order.into_iter().rev() {
        let Some(task) = tasks.remove(&task_id) else {
            continue;
        };
        let subtasks = children
            .get(&task_id)
            .map(|ids| ids.iter().filter_map(|id| built.remove(id)).collect())
            .unwrap_or_default();
        built.insert(task_id, TaskTree { task, subtasks });
    }
    built.remove(&root_id)
}
