//! Project and membership persistence.
//!
//! # Responsibility
//! - Store projects and their `(project, employee, role)` memberships.
//! - Answer the membership queries behind the access guard.
//!
//! # Invariants
//! - At most one OWNER row per project (partial unique index).
//! - `ensure_member` never changes the role of an existing row.

use crate::model::project::{MemberRole, NewProject, Project, ProjectMember};
use crate::model::tag::StatusTag;
use crate::repo::{
    date_to_db, ensure_connection_ready, parse_date, parse_tag, parse_timestamp, timestamp_to_db,
    RepoError, RepoResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROJECT_SELECT_SQL: &str = "SELECT
    project_id,
    name,
    description,
    status,
    owner_emp_id,
    start_date,
    end_date,
    created_at,
    updated_at
FROM projects";

/// Repository interface for projects and memberships.
pub trait ProjectRepository {
    /// Inserts one project row; membership rows are written separately.
    fn create_project(
        &self,
        input: &NewProject,
        status: &StatusTag,
        owner_emp_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Project>;
    fn get_project(&self, project_id: i64) -> RepoResult<Option<Project>>;
    /// Writes every mutable column of `project`.
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn delete_project(&self, project_id: i64) -> RepoResult<()>;
    fn member_role(&self, project_id: i64, emp_id: i64) -> RepoResult<Option<MemberRole>>;
    fn list_members(&self, project_id: i64) -> RepoResult<Vec<ProjectMember>>;
    /// Inserts one membership; duplicates surface as `RepoError::Constraint`.
    fn insert_member(
        &self,
        project_id: i64,
        emp_id: i64,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> RepoResult<()>;
    /// Inserts the membership when absent. Returns whether a row was added.
    fn ensure_member(
        &self,
        project_id: i64,
        emp_id: i64,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> RepoResult<bool>;
    fn update_member_role(&self, project_id: i64, emp_id: i64, role: MemberRole)
        -> RepoResult<()>;
    /// Returns whether a row was removed.
    fn delete_member(&self, project_id: i64, emp_id: i64) -> RepoResult<bool>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["projects", "project_members"])?;
        Ok(Self { conn })
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(
        &self,
        input: &NewProject,
        status: &StatusTag,
        owner_emp_id: i64,
        now: DateTime<Utc>,
    ) -> RepoResult<Project> {
        let now_ms = timestamp_to_db(now);
        self.conn.execute(
            "INSERT INTO projects (
                name,
                description,
                status,
                owner_emp_id,
                start_date,
                end_date,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7);",
            params![
                input.name.trim(),
                input.description.as_deref(),
                status.as_str(),
                owner_emp_id,
                date_to_db(input.start_date),
                date_to_db(input.end_date),
                now_ms,
            ],
        )?;
        let project_id = self.conn.last_insert_rowid();
        self.get_project(project_id)?
            .ok_or(RepoError::RowNotFound {
                table: "projects",
                id: project_id,
            })
    }

    fn get_project(&self, project_id: i64) -> RepoResult<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE project_id = ?1;"))?;
        let mut rows = stmt.query([project_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects
             SET name = ?2,
                 description = ?3,
                 status = ?4,
                 start_date = ?5,
                 end_date = ?6,
                 updated_at = ?7
             WHERE project_id = ?1;",
            params![
                project.project_id,
                project.name.as_str(),
                project.description.as_deref(),
                project.status.as_str(),
                date_to_db(project.start_date),
                date_to_db(project.end_date),
                timestamp_to_db(project.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "projects",
                id: project.project_id,
            });
        }
        Ok(())
    }

    fn delete_project(&self, project_id: i64) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE project_id = ?1;", [project_id])?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "projects",
                id: project_id,
            });
        }
        Ok(())
    }

    fn member_role(&self, project_id: i64, emp_id: i64) -> RepoResult<Option<MemberRole>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT role
                 FROM project_members
                 WHERE project_id = ?1
                   AND emp_id = ?2;",
                params![project_id, emp_id],
                |row| row.get(0),
            )
            .optional()?;
        value.as_deref().map(parse_role).transpose()
    }

    fn list_members(&self, project_id: i64) -> RepoResult<Vec<ProjectMember>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, emp_id, role, joined_at
             FROM project_members
             WHERE project_id = ?1
             ORDER BY joined_at ASC, emp_id ASC;",
        )?;
        let mut rows = stmt.query([project_id])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_member_row(row)?);
        }
        Ok(members)
    }

    fn insert_member(
        &self,
        project_id: i64,
        emp_id: i64,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO project_members (project_id, emp_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![project_id, emp_id, role.as_str(), timestamp_to_db(now)],
        )?;
        Ok(())
    }

    fn ensure_member(
        &self,
        project_id: i64,
        emp_id: i64,
        role: MemberRole,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO project_members (project_id, emp_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (project_id, emp_id) DO NOTHING;",
            params![project_id, emp_id, role.as_str(), timestamp_to_db(now)],
        )?;
        Ok(inserted == 1)
    }

    fn update_member_role(
        &self,
        project_id: i64,
        emp_id: i64,
        role: MemberRole,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE project_members
             SET role = ?3
             WHERE project_id = ?1
               AND emp_id = ?2;",
            params![project_id, emp_id, role.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: "project_members",
                id: emp_id,
            });
        }
        Ok(())
    }

    fn delete_member(&self, project_id: i64, emp_id: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM project_members
             WHERE project_id = ?1
               AND emp_id = ?2;",
            params![project_id, emp_id],
        )?;
        Ok(changed == 1)
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    Ok(Project {
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        status: parse_tag(row.get("status")?, "projects.status")?,
        owner_emp_id: row.get("owner_emp_id")?,
        start_date: parse_date(row.get("start_date")?, "projects.start_date")?,
        end_date: parse_date(row.get("end_date")?, "projects.end_date")?,
        created_at: parse_timestamp(row.get("created_at")?, "projects.created_at")?,
        updated_at: parse_timestamp(row.get("updated_at")?, "projects.updated_at")?,
    })
}

fn parse_member_row(row: &Row<'_>) -> RepoResult<ProjectMember> {
    let role_text: String = row.get("role")?;
    Ok(ProjectMember {
        project_id: row.get("project_id")?,
        emp_id: row.get("emp_id")?,
        role: parse_role(&role_text)?,
        joined_at: parse_timestamp(row.get("joined_at")?, "project_members.joined_at")?,
    })
}

fn parse_role(value: &str) -> RepoResult<MemberRole> {
    match value {
        "OWNER" => Ok(MemberRole::Owner),
        "MANAGER" => Ok(MemberRole::Manager),
        "MEMBER" => Ok(MemberRole::Member),
        "VIEWER" => Ok(MemberRole::Viewer),
        other => Err(RepoError::InvalidData(format!(
            "invalid role `{other}` in project_members.role"
        ))),
    }
}
