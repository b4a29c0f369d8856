//! Project and membership records.
//!
//! # Invariants
//! - Exactly one member holds `MemberRole::Owner` once a project exists.
//! - `(project_id, emp_id)` is unique among members.

use crate::error::ValidationError;
use crate::model::patch::FieldPatch;
use crate::model::tag::StatusTag;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Role of an employee inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Owner,
    Manager,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Manager => "MANAGER",
            Self::Member => "MEMBER",
            Self::Viewer => "VIEWER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Ok(Self::Owner),
            "MANAGER" => Ok(Self::Manager),
            "MEMBER" => Ok(Self::Member),
            "VIEWER" => Ok(Self::Viewer),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }

    /// Whether this role may create tasks.
    pub fn can_contribute(self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

impl Display for MemberRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: StatusTag,
    pub owner_emp_id: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectMember {
    pub project_id: i64,
    pub emp_id: i64,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// Input for project creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Falls back to the configured initial project status.
    #[serde(default)]
    pub status: Option<StatusTag>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl NewProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update for project fields. Owner changes are not patchable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ProjectPatch {
    pub name: FieldPatch<String>,
    pub description: FieldPatch<Option<String>>,
    pub status: FieldPatch<StatusTag>,
    pub start_date: FieldPatch<Option<NaiveDate>>,
    pub end_date: FieldPatch<Option<NaiveDate>>,
}
