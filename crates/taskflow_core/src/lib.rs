//! Core domain logic for TaskFlow: projects, task trees, audit trail and
//! the unified activity feed.
//! This crate is the single source of truth for business invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, SameStatusPolicy};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::{
    ConflictError, CoreError, CoreResult, ErrorKind, NotFound, PermissionDenied, ValidationError,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::activity::{
    ActivityLogEntry, FeedEntry, FeedSource, TaskComment, TaskHistoryEntry,
};
pub use model::patch::FieldPatch;
pub use model::project::{MemberRole, NewProject, Project, ProjectMember, ProjectPatch};
pub use model::tag::{ActionTag, PriorityTag, StatusTag};
pub use model::task::{Task, TaskNode, TaskPatch, TaskTree};
pub use notify::{NoopNotifier, Notification, NotificationEvent, Notifier};
pub use repo::{RepoError, RepoResult};
pub use service::access_guard::AccessGuard;
pub use service::audit::AuditRecorder;
pub use service::comment_service::CommentService;
pub use service::feed_service::FeedService;
pub use service::project_service::{ProjectService, ProjectWithTasks};
pub use service::task_service::TaskService;
pub use service::CoreContext;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
