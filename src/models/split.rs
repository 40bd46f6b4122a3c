//! # Split/Join Bookkeeping Models
//!
//! Durable AND-join accounting. Evaluating a Split node creates one
//! `SplitInstance` plus one `BranchToken` per activated edge; the required
//! join arity is therefore exactly the set of tokens minted at runtime,
//! not a static edge count. The matching Join completes tokens as branches
//! arrive and fires its outgoing edge once every token is done, consuming
//! the instance so a loop-back revisit cannot double-advance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitInstance {
    pub id: i64,
    pub process_id: i64,
    /// Name of the Split node this instance belongs to.
    pub node: String,
    /// Set once the matching Join has fired.
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSplitInstance {
    pub process_id: i64,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchToken {
    pub id: i64,
    pub split_id: i64,
    /// First node of the branch this token was minted for.
    pub target_node: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBranchToken {
    pub split_id: i64,
    pub target_node: String,
}
