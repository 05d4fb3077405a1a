use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::trigger::{EventType, Trigger};
use crate::error::GoflowError;

/// Workflow run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is executing or waiting to be picked up.
    Running,
    /// Run is parked on a timer.
    Suspended,
    /// Run finished all instructions.
    Completed,
    /// Run hit a terminal step error.
    Failed,
    /// Run was cancelled externally.
    Cancelled,
}

impl RunStatus {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if the run can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = GoflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => Self::Running,
            "suspended" => Self::Suspended,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => {
                return Err(GoflowError::InvalidState(format!(
                    "unknown run status '{}'",
                    other
                )))
            }
        })
    }
}

/// One execution of a workflow definition against one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Derived from the trigger ID.
    pub run_id: Uuid,
    pub trigger_id: String,
    pub definition_id: String,
    pub event_type: EventType,
    /// Trigger payload, kept so a resumed run can be rebuilt.
    pub payload: serde_json::Value,
    pub status: RunStatus,
    /// Error message if failed or cancelled.
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Create a new running record for an admitted trigger.
    pub fn new(trigger: &Trigger, definition_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: trigger.run_id(),
            trigger_id: trigger.trigger_id.clone(),
            definition_id: definition_id.into(),
            event_type: trigger.event_type,
            payload: trigger.payload.clone(),
            status: RunStatus::Running,
            last_error: None,
            received_at: trigger.received_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the trigger this run was created from.
    pub fn trigger(&self) -> Trigger {
        Trigger {
            trigger_id: self.trigger_id.clone(),
            event_type: self.event_type,
            payload: self.payload.clone(),
            received_at: self.received_at,
        }
    }
}
