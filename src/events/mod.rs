//! # Event System
//!
//! Fire-and-forget lifecycle observations for the notification
//! collaborator: one event per newly created task (so the assigned group
//! can be emailed) and one per completed process instance. Events are
//! published after the surrounding transaction commits and are never part
//! of it.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};

use serde_json::json;

use crate::constants::events;
use crate::models::{ProcessInstance, Task};

/// Payload for [`events::TASK_CREATED`].
pub fn task_created_context(task: &Task, proposal_id: i64) -> serde_json::Value {
    json!({
        "task_id": task.id,
        "process_id": task.process_id,
        "proposal_id": proposal_id,
        "node": task.node,
        "owner": task.owner,
        "created_at": task.created_at,
    })
}

/// Payload for [`events::PROCESS_COMPLETED`].
pub fn process_completed_context(process: &ProcessInstance) -> serde_json::Value {
    json!({
        "process_id": process.id,
        "proposal_id": process.proposal_id,
        "flow": process.flow,
        "finished_at": process.finished_at,
    })
}
