//! Service-level error taxonomy.
//!
//! # Responsibility
//! - Classify every failure into validation, not-found, permission,
//!   conflict or storage.
//! - Provide the status-code mapping used by the external HTTP layer.
//!
//! # Invariants
//! - Validation and permission errors are raised before any write.
//! - Storage errors always carry the underlying repository error.

use crate::repo::RepoError;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    Conflict,
    Storage,
}

impl ErrorKind {
    /// HTTP status the transport layer responds with.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Permission => 403,
            Self::Conflict => 409,
            Self::Storage => 500,
        }
    }
}

/// Bad input shape or range.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Task title is blank after trim.
    EmptyTitle,
    /// Project name is blank after trim.
    EmptyProjectName,
    /// Comment body is blank after trim.
    EmptyContent,
    /// An open tag field (status, priority, action) is blank.
    EmptyTag(&'static str),
    ProgressOutOfRange(i64),
    DueBeforeStart { start: NaiveDate, due: NaiveDate },
    NegativeEstimate(f64),
    TreeTooDeep { max_depth: usize },
    /// Parent task lives in a different project than the child.
    ParentInOtherProject {
        parent_task_id: i64,
        project_id: i64,
    },
    /// OWNER can only be granted by project creation.
    OwnerRoleNotAssignable,
    /// The OWNER membership row cannot be changed or removed.
    OwnerMembershipImmutable,
    UnknownRole(String),
    InvalidConfig(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title must not be blank"),
            Self::EmptyProjectName => write!(f, "project name must not be blank"),
            Self::EmptyContent => write!(f, "comment content must not be blank"),
            Self::EmptyTag(field) => write!(f, "{field} must not be blank"),
            Self::ProgressOutOfRange(value) => {
                write!(f, "progress must be within 0..=100, got {value}")
            }
            Self::DueBeforeStart { start, due } => {
                write!(f, "due date {due} is earlier than start date {start}")
            }
            Self::NegativeEstimate(value) => {
                write!(f, "estimate hours must not be negative, got {value}")
            }
            Self::TreeTooDeep { max_depth } => {
                write!(f, "task tree exceeds maximum depth {max_depth}")
            }
            Self::ParentInOtherProject {
                parent_task_id,
                project_id,
            } => write!(
                f,
                "parent task {parent_task_id} does not belong to project {project_id}"
            ),
            Self::OwnerRoleNotAssignable => write!(f, "OWNER role cannot be assigned"),
            Self::OwnerMembershipImmutable => {
                write!(f, "the project OWNER membership cannot be changed or removed")
            }
            Self::UnknownRole(value) => write!(f, "unknown member role `{value}`"),
            Self::InvalidConfig(details) => write!(f, "invalid engine config: {details}"),
        }
    }
}

impl Error for ValidationError {}

/// Referenced entity does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFound {
    Project(i64),
    Task(i64),
    Comment(i64),
    Member { project_id: i64, emp_id: i64 },
    /// Task exists but under another project than the one addressed.
    TaskInProject { project_id: i64, task_id: i64 },
}

impl Display for NotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project not found: {id}"),
            Self::Task(id) => write!(f, "task not found: {id}"),
            Self::Comment(id) => write!(f, "comment not found: {id}"),
            Self::Member { project_id, emp_id } => {
                write!(f, "employee {emp_id} is not a member of project {project_id}")
            }
            Self::TaskInProject {
                project_id,
                task_id,
            } => write!(f, "task {task_id} not found in project {project_id}"),
        }
    }
}

impl Error for NotFound {}

/// Authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDenied {
    pub emp_id: i64,
    /// Short name of the refused operation, e.g. `delete_task`.
    pub action: &'static str,
}

impl Display for PermissionDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "employee {} is not allowed to {}",
            self.emp_id, self.action
        )
    }
}

impl Error for PermissionDenied {}

/// Uniqueness violation where duplication is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    DuplicateMember { project_id: i64, emp_id: i64 },
    /// Store-level constraint rejected the write.
    Constraint(String),
}

impl Display for ConflictError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateMember { project_id, emp_id } => write!(
                f,
                "employee {emp_id} is already a member of project {project_id}"
            ),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
        }
    }
}

impl Error for ConflictError {}

/// Error returned by every service operation.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    NotFound(NotFound),
    Permission(PermissionDenied),
    Conflict(ConflictError),
    Storage(RepoError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn denied(emp_id: i64, action: &'static str) -> Self {
        Self::Permission(PermissionDenied { emp_id, action })
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(err) => write!(f, "{err}"),
            Self::Permission(err) => write!(f, "{err}"),
            Self::Conflict(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound(err) => Some(err),
            Self::Permission(err) => Some(err),
            Self::Conflict(err) => Some(err),
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<NotFound> for CoreError {
    fn from(value: NotFound) -> Self {
        Self::NotFound(value)
    }
}

impl From<PermissionDenied> for CoreError {
    fn from(value: PermissionDenied) -> Self {
        Self::Permission(value)
    }
}

impl From<ConflictError> for CoreError {
    fn from(value: ConflictError) -> Self {
        Self::Conflict(value)
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Constraint(message) => Self::Conflict(ConflictError::Constraint(message)),
            other => Self::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(value).into()
    }
}
