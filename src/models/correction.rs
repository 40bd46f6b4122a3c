//! # Correction Model
//!
//! A reviewer's recorded request that specific fields (or the whole record
//! via the `__all__` sentinel) be changed before the process may proceed
//! past the target step.
//!
//! At most one correction may be active for a given (proposal, target
//! step) pair at any time. The storage layer carries that invariant — a
//! partial unique index on the PostgreSQL backend, an enforced insert on
//! the in-memory backend — so concurrent approval submissions cannot race
//! a second one in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;
use crate::constants::ALL_FIELDS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: i64,
    pub proposal_id: i64,
    /// The approval task whose completion raised this correction.
    pub task_id: i64,
    /// Node name the correction is addressed to; that step cannot be
    /// passed while this record is active.
    pub for_step: String,
    /// Version the reviewer was looking at when raising the correction.
    pub reviewed_version_id: i64,
    /// Field name to free-text message; may contain the `__all__` sentinel.
    pub messages: BTreeMap<String, String>,
    pub is_active: bool,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
    /// Version whose commit resolved this correction, once resolved.
    pub fixed_in_version_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCorrection {
    pub proposal_id: i64,
    pub task_id: i64,
    pub for_step: String,
    pub reviewed_version_id: i64,
    pub messages: BTreeMap<String, String>,
    pub author: UserId,
}

impl Correction {
    /// Field keys the fix submission must change, sentinel excluded.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.messages
            .keys()
            .map(String::as_str)
            .filter(|k| *k != ALL_FIELDS)
    }

    /// Whether the whole record was flagged, requiring at least one
    /// changed field regardless of which.
    pub fn requires_any_change(&self) -> bool {
        self.messages.contains_key(ALL_FIELDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields_excludes_sentinel() {
        let correction = Correction {
            id: 1,
            proposal_id: 1,
            task_id: 1,
            for_step: "fix_mistakes_after_account_manager".into(),
            reviewed_version_id: 1,
            messages: BTreeMap::from([
                ("company_name".to_string(), "use the legal name".to_string()),
                (ALL_FIELDS.to_string(), "double-check everything".to_string()),
            ]),
            is_active: true,
            author: "reviewer".into(),
            created_at: Utc::now(),
            fixed_in_version_id: None,
        };

        let required: Vec<_> = correction.required_fields().collect();
        assert_eq!(required, vec!["company_name"]);
        assert!(correction.requires_any_change());
    }
}
