//! # Version Model
//!
//! Immutable snapshot of the proposal field map at a point in time,
//! attributed to the user and flow step that produced it. Append-only:
//! versions are never updated or destroyed, forming the audit trail that
//! correction reviews and optimistic concurrency checks run against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::FieldMap;
use super::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: i64,
    pub proposal_id: i64,
    pub author: UserId,
    /// Flow node whose completion committed this snapshot.
    pub step: String,
    pub snapshot: FieldMap,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVersion {
    pub proposal_id: i64,
    pub author: UserId,
    pub step: String,
    pub snapshot: FieldMap,
}
