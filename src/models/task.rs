//! # Task Model
//!
//! One unit of work bound to a specific flow node and process instance.
//! Automatic nodes (gateways, Start, End) record their visit as an
//! immediately-DONE task, preserving a full activation history; human
//! nodes park as NEW/ASSIGNED until submitted.
//!
//! Tasks inside a parallel branch carry the branch token minted by the
//! Split that spawned them; the matching Join completes tokens, never
//! tasks directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::state_machine::TaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub process_id: i64,
    /// Symbolic flow node name, e.g. `approve_by_account_manager`.
    pub node: String,
    pub status: TaskStatus,
    pub owner: Option<UserId>,
    /// Branch token id when this task runs inside a Split branch.
    pub branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub process_id: i64,
    pub node: String,
    pub status: TaskStatus,
    pub owner: Option<UserId>,
    pub branch_id: Option<i64>,
}

impl NewTask {
    /// A freshly activated human task, unclaimed.
    pub fn new(process_id: i64, node: impl Into<String>) -> Self {
        Self {
            process_id,
            node: node.into(),
            status: TaskStatus::New,
            owner: None,
            branch_id: None,
        }
    }

    /// An auto-assigned task (e.g. the client's fix-mistakes step).
    pub fn assigned(process_id: i64, node: impl Into<String>, owner: UserId) -> Self {
        Self {
            process_id,
            node: node.into(),
            status: TaskStatus::Assigned,
            owner: Some(owner),
            branch_id: None,
        }
    }

    pub fn with_branch(mut self, branch_id: Option<i64>) -> Self {
        self.branch_id = branch_id;
        self
    }
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}
