//! Project lifecycle and membership management.
//!
//! # Responsibility
//! - Create projects together with their OWNER membership.
//! - Owner-only project updates, deletion and membership changes.
//!
//! # Invariants
//! - Exactly one OWNER row per project; it is written at creation and can
//!   be neither reassigned nor removed afterwards.
//! - Removing a member also drops that member's task assignments inside
//!   the project.

use crate::error::{ConflictError, CoreResult, NotFound, ValidationError};
use crate::model::patch::FieldPatch;
use crate::model::project::{MemberRole, NewProject, Project, ProjectMember, ProjectPatch};
use crate::model::tag::ActionTag;
use crate::model::task::{TaskNode, TaskTree};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::task_service::{validate_dates, TaskEngine};
use crate::service::{log_outcome, CoreContext, Store};
use log::info;
use std::time::Instant;

const MODULE: &str = "project_service";

/// Result of [`ProjectService::create_project_with_tasks`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectWithTasks {
    pub project: Project,
    pub tasks: Vec<TaskTree>,
}

/// Facade for project and membership operations.
pub struct ProjectService<'conn> {
    ctx: CoreContext<'conn>,
}

impl<'conn> ProjectService<'conn> {
    pub fn new(ctx: CoreContext<'conn>) -> Self {
        Self { ctx }
    }

    fn engine<'s, 'c>(&'s self, store: &'s Store<'c>) -> TaskEngine<'s, 'c> {
        TaskEngine::new(store, self.ctx.config(), self.ctx.clock())
    }

    /// Creates the project and makes `actor_id` its OWNER.
    pub fn create_project(&self, actor_id: i64, input: &NewProject) -> CoreResult<Project> {
        let started_at = Instant::now();
        let result = self
            .ctx
            .transact(|store| self.insert_project(store, actor_id, input));
        log_outcome("project_create", MODULE, started_at, &result);
        if let Ok(project) = &result {
            info!(
                "event=project_create module={MODULE} status=ok project_id={} owner_emp_id={actor_id}",
                project.project_id
            );
        }
        result
    }

    /// Creates the project, MEMBER rows for `main_assignees` and one task
    /// tree per root node, all or nothing.
    pub fn create_project_with_tasks(
        &self,
        actor_id: i64,
        input: &NewProject,
        main_assignees: &[i64],
        roots: &[TaskNode],
    ) -> CoreResult<ProjectWithTasks> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let project = self.insert_project(store, actor_id, input)?;
            let now = self.ctx.now();
            for emp_id in main_assignees {
                store
                    .projects
                    .ensure_member(project.project_id, *emp_id, MemberRole::Member, now)?;
            }
            let engine = self.engine(store);
            let mut tasks = Vec::with_capacity(roots.len());
            for root in roots {
                tasks.push(engine.create_tree(project.project_id, actor_id, root, None)?);
            }
            Ok(ProjectWithTasks { project, tasks })
        });
        log_outcome("project_create_with_tasks", MODULE, started_at, &result);
        result
    }

    fn insert_project(
        &self,
        store: &Store<'_>,
        actor_id: i64,
        input: &NewProject,
    ) -> CoreResult<Project> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName.into());
        }
        validate_dates(input.start_date, input.end_date)?;
        let normalized = NewProject {
            name: name.to_owned(),
            ..input.clone()
        };
        let status = input
            .status
            .clone()
            .unwrap_or_else(|| self.ctx.config().initial_project_status.clone());

        let now = self.ctx.now();
        let project = store
            .projects
            .create_project(&normalized, &status, actor_id, now)?;
        store
            .projects
            .insert_member(project.project_id, actor_id, MemberRole::Owner, now)?;
        let detail = format!("created project '{}'", project.name);
        store.audit(self.ctx.clock()).record(
            actor_id,
            &ActionTag::builtin(ActionTag::PROJECT_CREATED),
            Some(project.project_id),
            None,
            Some(detail.as_str()),
        )?;
        Ok(project)
    }

    /// Members only.
    pub fn get_project(&self, project_id: i64, actor_id: i64) -> CoreResult<Project> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            let project = engine.require_project(project_id)?;
            engine.require_member(project_id, actor_id, "read_project")?;
            Ok(project)
        })
    }

    /// OWNER only. Logs `project_updated` with the changed field names.
    pub fn update_project(
        &self,
        project_id: i64,
        actor_id: i64,
        patch: ProjectPatch,
    ) -> CoreResult<Project> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let engine = self.engine(store);
            let mut project = engine.require_project(project_id)?;
            engine.require_owner(project_id, actor_id, "update_project")?;

            if let Some(name) = patch.name.as_set() {
                if name.trim().is_empty() {
                    return Err(ValidationError::EmptyProjectName.into());
                }
            }
            let start_date = patch.start_date.as_set().copied().unwrap_or(project.start_date);
            let end_date = patch.end_date.as_set().copied().unwrap_or(project.end_date);
            validate_dates(start_date, end_date)?;

            let ProjectPatch {
                name,
                description,
                status,
                start_date,
                end_date,
            } = patch;
            let mut changed_fields: Vec<&'static str> = Vec::new();
            if let FieldPatch::Set(name) = name {
                let name = name.trim();
                if name != project.name {
                    project.name = name.to_owned();
                    changed_fields.push("name");
                }
            }
            if description.apply_to(&mut project.description) {
                changed_fields.push("description");
            }
            if status.apply_to(&mut project.status) {
                changed_fields.push("status");
            }
            if start_date.apply_to(&mut project.start_date) {
                changed_fields.push("start_date");
            }
            if end_date.apply_to(&mut project.end_date) {
                changed_fields.push("end_date");
            }
            if changed_fields.is_empty() {
                return Ok(project);
            }

            project.updated_at = self.ctx.now();
            store.projects.update_project(&project)?;
            let detail = changed_fields.join(", ");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::PROJECT_UPDATED),
                Some(project_id),
                None,
                Some(detail.as_str()),
            )?;
            Ok(project)
        });
        log_outcome("project_update", MODULE, started_at, &result);
        result
    }

    /// OWNER only. Logs `project_deleted`, then removes every task subtree,
    /// the memberships and the project. Returns the deleted task count.
    pub fn delete_project(&self, project_id: i64, actor_id: i64) -> CoreResult<usize> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let engine = self.engine(store);
            let project = engine.require_project(project_id)?;
            engine.require_owner(project_id, actor_id, "delete_project")?;

            let detail = format!("deleted project '{}'", project.name);
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::PROJECT_DELETED),
                Some(project_id),
                None,
                Some(detail.as_str()),
            )?;
            let deleted = engine.delete_project_tasks(project_id)?;
            store.projects.delete_project(project_id)?;
            Ok(deleted)
        });
        log_outcome("project_delete", MODULE, started_at, &result);
        if let Ok(count) = &result {
            info!(
                "event=project_delete module={MODULE} status=ok project_id={project_id} deleted_task_count={count}"
            );
        }
        result
    }

    /// Members only; ordered by join time.
    pub fn list_members(&self, project_id: i64, actor_id: i64) -> CoreResult<Vec<ProjectMember>> {
        self.ctx.read(|store| {
            let engine = self.engine(store);
            engine.require_project(project_id)?;
            engine.require_member(project_id, actor_id, "list_members")?;
            Ok(store.projects.list_members(project_id)?)
        })
    }

    /// OWNER only. Existing members are a `Conflict`; OWNER is not
    /// assignable.
    pub fn add_member(
        &self,
        project_id: i64,
        actor_id: i64,
        emp_id: i64,
        role: MemberRole,
    ) -> CoreResult<ProjectMember> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            if role == MemberRole::Owner {
                return Err(ValidationError::OwnerRoleNotAssignable.into());
            }
            let engine = self.engine(store);
            engine.require_project(project_id)?;
            engine.require_owner(project_id, actor_id, "add_member")?;
            if store.projects.member_role(project_id, emp_id)?.is_some() {
                return Err(ConflictError::DuplicateMember { project_id, emp_id }.into());
            }

            let now = self.ctx.now();
            store.projects.insert_member(project_id, emp_id, role, now)?;
            let detail = format!("added {emp_id} as {role}");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::MEMBER_ADDED),
                Some(project_id),
                None,
                Some(detail.as_str()),
            )?;
            Ok(ProjectMember {
                project_id,
                emp_id,
                role,
                joined_at: now,
            })
        });
        log_outcome("member_add", MODULE, started_at, &result);
        result
    }

    /// OWNER only. Neither promotes to nor demotes from OWNER.
    pub fn change_member_role(
        &self,
        project_id: i64,
        actor_id: i64,
        emp_id: i64,
        role: MemberRole,
    ) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            if role == MemberRole::Owner {
                return Err(ValidationError::OwnerRoleNotAssignable.into());
            }
            let engine = self.engine(store);
            engine.require_project(project_id)?;
            engine.require_owner(project_id, actor_id, "change_member_role")?;
            let current = store
                .projects
                .member_role(project_id, emp_id)?
                .ok_or(NotFound::Member { project_id, emp_id })?;
            if current == MemberRole::Owner {
                return Err(ValidationError::OwnerMembershipImmutable.into());
            }
            if current == role {
                return Ok(());
            }

            store.projects.update_member_role(project_id, emp_id, role)?;
            let detail = format!("{emp_id}: {current} → {role}");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::MEMBER_ROLE_CHANGED),
                Some(project_id),
                None,
                Some(detail.as_str()),
            )?;
            Ok(())
        });
        log_outcome("member_role_change", MODULE, started_at, &result);
        result
    }

    /// OWNER only. Also drops the member's task assignments in the project.
    pub fn remove_member(&self, project_id: i64, actor_id: i64, emp_id: i64) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.ctx.transact(|store| {
            let engine = self.engine(store);
            engine.require_project(project_id)?;
            engine.require_owner(project_id, actor_id, "remove_member")?;
            let current = store
                .projects
                .member_role(project_id, emp_id)?
                .ok_or(NotFound::Member { project_id, emp_id })?;
            if current == MemberRole::Owner {
                return Err(ValidationError::OwnerMembershipImmutable.into());
            }

            let unassigned = store
                .tasks
                .remove_assignments_in_project(project_id, emp_id)?;
            store.projects.delete_member(project_id, emp_id)?;
            let detail = format!("removed {emp_id}, unassigned from {unassigned} task(s)");
            store.audit(self.ctx.clock()).record(
                actor_id,
                &ActionTag::builtin(ActionTag::MEMBER_REMOVED),
                Some(project_id),
                None,
                Some(detail.as_str()),
            )?;
            Ok(())
        });
        log_outcome("member_remove", MODULE, started_at, &result);
        result
    }
}
