//! # Signal Model
//!
//! Durable record of an external event keyed by proposal. `ExternalSignal`
//! nodes block until a matching row exists; delivery is idempotent, so a
//! signal observed before the waiting node activates still satisfies it
//! (the `allow_skip` path).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub proposal_id: i64,
    /// Signal kind, e.g. [`crate::constants::signals::CLIENT_UNBLOCKED`].
    pub kind: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSignal {
    pub proposal_id: i64,
    pub kind: String,
}
