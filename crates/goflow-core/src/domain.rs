//! Application records the workflows read and write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GoflowError, Result};
use crate::workflow::BoxFuture;

/// Task status as stored by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = GoflowError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "TODO" => Self::Todo,
            "IN_PROGRESS" => Self::InProgress,
            "DONE" => Self::Done,
            other => {
                return Err(GoflowError::InvalidState(format!(
                    "unknown task status '{}'",
                    other
                )))
            }
        })
    }
}

/// The user a task is assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A task joined with its assignee and project, as read at step time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: Option<Assignee>,
    pub project_name: String,
}

/// Read access to the authoritative task state.
pub trait TaskStore: Send + Sync + 'static {
    /// Always reads committed state; never served from a cache.
    fn find_task(&self, task_id: String) -> BoxFuture<'_, Result<Option<TaskDetails>>>;
}

/// A user mirrored from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub name: String,
    pub image: Option<String>,
}

/// A workspace mirrored from an identity provider organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub owner_id: String,
    pub image_url: Option<String>,
}

/// Mutable fields of a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceUpdate {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
}

/// Membership of a user in a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub user_id: String,
    pub workspace_id: String,
    /// Upper-case role name, e.g. `ADMIN`.
    pub role: String,
}

/// Writes to the user and workspace directory.
///
/// Every method reports whether a row was affected, so callers decide
/// whether a missing entity is an error.
pub trait Directory: Send + Sync + 'static {
    /// Insert a user. Returns false if the ID already exists.
    fn create_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>>;

    fn update_user(&self, user: UserRecord) -> BoxFuture<'_, Result<bool>>;

    fn delete_user(&self, user_id: String) -> BoxFuture<'_, Result<bool>>;

    /// Insert a workspace. Returns false if the ID already exists.
    fn create_workspace(&self, workspace: WorkspaceRecord) -> BoxFuture<'_, Result<bool>>;

    fn update_workspace(&self, update: WorkspaceUpdate) -> BoxFuture<'_, Result<bool>>;

    fn delete_workspace(&self, workspace_id: String) -> BoxFuture<'_, Result<bool>>;

    /// Insert a membership. Returns false if the user is already a member.
    fn add_member(&self, member: MembershipRecord) -> BoxFuture<'_, Result<bool>>;
}
