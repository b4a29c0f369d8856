//! Engine and feed tunables.
//!
//! # Invariants
//! - `max_tree_depth >= 1`.
//! - `0 < default_feed_limit <= max_feed_limit`.
//! - Initial status tags are non-empty.

use crate::error::ValidationError;
use crate::model::tag::StatusTag;

/// Behavior of `change_status` when the new status equals the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameStatusPolicy {
    /// Append TaskHistory + `status_changed` log anyway.
    #[default]
    Record,
    /// Treat the transition as a no-op that writes nothing.
    Skip,
}

/// Configuration shared by the task engine and the feed aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest nesting level accepted by recursive task-tree creation.
    pub max_tree_depth: usize,
    /// Feed limit used when the caller passes no limit (or zero).
    pub default_feed_limit: u32,
    /// Server-enforced feed limit ceiling.
    pub max_feed_limit: u32,
    /// Status of tasks created without an explicit status.
    pub initial_task_status: StatusTag,
    /// Status of projects created without an explicit status.
    pub initial_project_status: StatusTag,
    pub same_status_policy: SameStatusPolicy,
    /// When set, a status change applied through `update_task` also
    /// appends TaskHistory and a `status_changed` log.
    pub history_on_field_update: bool,
}

pub const DEFAULT_MAX_TREE_DEPTH: usize = 32;
pub const DEFAULT_FEED_LIMIT: u32 = 100;
pub const MAX_FEED_LIMIT: u32 = 300;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            default_feed_limit: DEFAULT_FEED_LIMIT,
            max_feed_limit: MAX_FEED_LIMIT,
            initial_task_status: StatusTag::planned(),
            initial_project_status: StatusTag::planned(),
            same_status_policy: SameStatusPolicy::Record,
            history_on_field_update: false,
        }
    }
}

impl EngineConfig {
    /// Checks internal consistency of the tunables.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_tree_depth == 0 {
            return Err(ValidationError::InvalidConfig(
                "max_tree_depth must be at least 1",
            ));
        }
        if self.default_feed_limit == 0 || self.max_feed_limit == 0 {
            return Err(ValidationError::InvalidConfig(
                "feed limits must be positive",
            ));
        }
        if self.default_feed_limit > self.max_feed_limit {
            return Err(ValidationError::InvalidConfig(
                "default_feed_limit must not exceed max_feed_limit",
            ));
        }
        Ok(())
    }

    /// Resolves a caller-supplied feed limit against the configured bounds.
    pub fn normalize_feed_limit(&self, limit: Option<u32>) -> u32 {
        match limit {
            Some(0) | None => self.default_feed_limit,
            Some(value) if value > self.max_feed_limit => self.max_feed_limit,
            Some(value) => value,
        }
    }
}
