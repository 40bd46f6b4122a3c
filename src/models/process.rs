//! # Process Instance Model
//!
//! One execution of a flow graph for one proposal. Created by the Start
//! node, mutated by the flow graph engine as tasks complete, terminal once
//! the End node marks it COMPLETED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::ProcessStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: i64,
    /// Registered flow name; resolves the static graph this instance runs.
    pub flow: String,
    pub proposal_id: i64,
    pub status: ProcessStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProcess {
    pub flow: String,
    pub proposal_id: i64,
}

impl ProcessInstance {
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }
}
