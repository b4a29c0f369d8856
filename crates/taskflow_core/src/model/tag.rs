//! Open string tags for status, priority and activity action fields.
//!
//! Callers may introduce new tag values at any time, so these are
//! validated strings rather than closed enums. Each type knows its
//! recommended value set through `is_known()`.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

macro_rules! open_tag {
    ($(#[$meta:meta])* $name:ident, $field:literal, $known:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Builds a tag from caller input; blank values are rejected.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::EmptyTag($field));
                }
                if trimmed.len() == value.len() {
                    Ok(Self(value))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the value belongs to the recommended set.
            pub fn is_known(&self) -> bool {
                $known.contains(&self.0.as_str())
            }

            /// Recommended values for this field.
            pub fn known_values() -> &'static [&'static str] {
                $known
            }

            pub(crate) fn from_static(value: &'static str) -> Self {
                Self(value.to_string())
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValidationError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

const KNOWN_STATUSES: &[&str] = &[
    "PLANNED",
    "TODO",
    "IN_PROGRESS",
    "ON_HOLD",
    "REVIEW",
    "COMPLETED",
    "DONE",
];

const KNOWN_PRIORITIES: &[&str] = &["LOW", "MEDIUM", "HIGH", "URGENT"];

const KNOWN_ACTIONS: &[&str] = &[
    ActionTag::COMMENTED,
    ActionTag::COMMENT_EDITED,
    ActionTag::COMMENT_DELETED,
    ActionTag::MENTIONED,
    ActionTag::TASK_CREATED,
    ActionTag::TASK_UPDATED,
    ActionTag::TASK_DELETED,
    ActionTag::STATUS_CHANGED,
    ActionTag::ASSIGNEE_CHANGED,
    ActionTag::DUE_DATE_CHANGED,
    ActionTag::PROGRESS_CHANGED,
    ActionTag::ATTACHMENT_ADDED,
    ActionTag::ATTACHMENT_REMOVED,
    ActionTag::PROJECT_CREATED,
    ActionTag::PROJECT_UPDATED,
    ActionTag::PROJECT_DELETED,
    ActionTag::MEMBER_ADDED,
    ActionTag::MEMBER_REMOVED,
    ActionTag::MEMBER_ROLE_CHANGED,
];

open_tag!(
    /// Status label of a task or project. Transitions are unrestricted.
    StatusTag,
    "status",
    KNOWN_STATUSES
);

open_tag!(
    /// Task priority label.
    PriorityTag,
    "priority",
    KNOWN_PRIORITIES
);

open_tag!(
    /// Action label of an activity log row.
    ActionTag,
    "action",
    KNOWN_ACTIONS
);

impl StatusTag {
    pub fn planned() -> Self {
        Self::from_static("PLANNED")
    }
}

impl PriorityTag {
    /// Priority applied when a task is created without one.
    pub fn medium() -> Self {
        Self::from_static("MEDIUM")
    }
}

impl ActionTag {
    pub const COMMENTED: &'static str = "commented";
    pub const COMMENT_EDITED: &'static str = "comment_edited";
    pub const COMMENT_DELETED: &'static str = "comment_deleted";
    pub const MENTIONED: &'static str = "mentioned";
    pub const TASK_CREATED: &'static str = "task_created";
    pub const TASK_UPDATED: &'static str = "task_updated";
    pub const TASK_DELETED: &'static str = "task_deleted";
    pub const STATUS_CHANGED: &'static str = "status_changed";
    pub const ASSIGNEE_CHANGED: &'static str = "assignee_changed";
    pub const DUE_DATE_CHANGED: &'static str = "due_date_changed";
    pub const PROGRESS_CHANGED: &'static str = "progress_changed";
    pub const ATTACHMENT_ADDED: &'static str = "attachment_added";
    pub const ATTACHMENT_REMOVED: &'static str = "attachment_removed";
    pub const PROJECT_CREATED: &'static str = "project_created";
    pub const PROJECT_UPDATED: &'static str = "project_updated";
    pub const PROJECT_DELETED: &'static str = "project_deleted";
    pub const MEMBER_ADDED: &'static str = "member_added";
    pub const MEMBER_REMOVED: &'static str = "member_removed";
    pub const MEMBER_ROLE_CHANGED: &'static str = "member_role_changed";

    /// Tag for one of the built-in actions above.
    pub fn builtin(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionTag, PriorityTag, StatusTag};
    use crate::error::ValidationError;

    #[test]
    fn unknown_values_are_accepted_but_flagged() {
        let status = StatusTag::new("BLOCKED_BY_VENDOR").unwrap();
        assert_eq!(status.as_str(), "BLOCKED_BY_VENDOR");
        assert!(!status.is_known());
        assert!(StatusTag::new("DONE").unwrap().is_known());
    }

    #[test]
    fn blank_values_are_rejected_and_input_is_trimmed() {
        assert_eq!(
            PriorityTag::new("   ").unwrap_err(),
            ValidationError::EmptyTag("priority")
        );
        assert_eq!(PriorityTag::new(" HIGH ").unwrap().as_str(), "HIGH");
    }

    #[test]
    fn builtin_actions_are_known() {
        for value in ActionTag::known_values() {
            assert!(ActionTag::builtin(*value).is_known());
        }
    }
}
