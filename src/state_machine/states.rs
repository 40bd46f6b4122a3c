use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProposalError, Result};

/// Task status definitions. A task is created NEW, claimed by a user as
/// ASSIGNED, and finished as DONE. DONE is terminal for that task; a
/// repeated visit to the same node creates a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created by node activation, not yet claimed
    New,
    /// Claimed by (or auto-assigned to) a user
    Assigned,
    /// Completed; terminal
    Done,
}

impl TaskStatus {
    /// Check if this is a terminal status (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if a task in this status still blocks its node
    pub fn is_undone(&self) -> bool {
        !self.is_terminal()
    }

    /// Validate a transition, returning the target status on success.
    /// The lifecycle is linear: NEW -> ASSIGNED -> DONE.
    pub fn transition_to(self, target: TaskStatus) -> Result<TaskStatus> {
        match (self, target) {
            (Self::New, Self::Assigned) => Ok(target),
            (Self::Assigned, Self::Done) => Ok(target),
            (from, to) => Err(ProposalError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "ASSIGNED" => Ok(Self::Assigned),
            "DONE" => Ok(Self::Done),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Process instance status. ACTIVE from the Start node until the End node
/// marks it COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Active,
    Completed,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Invalid process status: {s}")),
        }
    }
}

impl Default for ProcessStatus {
    fn default() -> Self {
        Self::Active
    }
}
