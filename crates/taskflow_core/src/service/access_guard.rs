//! Membership-based authorization checks.
//!
//! # Invariants
//! - Checks are pure reads; nothing is cached across calls.
//! - Task mutation is allowed to the project OWNER and to current assignees.

use crate::model::project::MemberRole;
use crate::model::task::Task;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::task_repo::TaskRepository;
use crate::repo::RepoResult;

/// Boolean authorization queries over the project and task stores.
pub struct AccessGuard<'r, P, T> {
    projects: &'r P,
    tasks: &'r T,
}

impl<'r, P: ProjectRepository, T: TaskRepository> AccessGuard<'r, P, T> {
    pub fn new(projects: &'r P, tasks: &'r T) -> Self {
        Self { projects, tasks }
    }

    /// Role of `emp_id` inside the project, if a member.
    pub fn role(&self, project_id: i64, emp_id: i64) -> RepoResult<Option<MemberRole>> {
        self.projects.member_role(project_id, emp_id)
    }

    pub fn is_owner(&self, project_id: i64, emp_id: i64) -> RepoResult<bool> {
        Ok(self.role(project_id, emp_id)? == Some(MemberRole::Owner))
    }

    pub fn is_member(&self, project_id: i64, emp_id: i64) -> RepoResult<bool> {
        Ok(self.role(project_id, emp_id)?.is_some())
    }

    /// Members whose role allows creating tasks; VIEWERs are excluded.
    pub fn can_contribute(&self, project_id: i64, emp_id: i64) -> RepoResult<bool> {
        Ok(self
            .role(project_id, emp_id)?
            .is_some_and(MemberRole::can_contribute))
    }

    pub fn can_mutate_task(&self, task: &Task, emp_id: i64) -> RepoResult<bool> {
        if self.is_owner(task.project_id, emp_id)? {
            return Ok(true);
        }
        self.tasks.is_assignee(task.task_id, emp_id)
    }
}
