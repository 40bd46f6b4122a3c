//! # Proposal Model
//!
//! The business record being approved: a corporate client-registration
//! request. Tracked fields live in a JSON field map so that versions can
//! snapshot and diff the record uniformly; see [`crate::constants::fields`]
//! for the catalog.
//!
//! Invariant: the proposal's current field values are always exactly one
//! committed version ahead of (or equal to) the latest [`super::Version`].
//! Every mutating write goes through the version store in the same
//! transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UserId;
use crate::constants::fields;

/// Field name to value mapping for all tracked proposal fields.
pub type FieldMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    /// The registering client; owner of the record and the actor whose
    /// version commits auto-resolve fix-step corrections.
    pub client: UserId,
    pub fields: FieldMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProposal {
    pub client: UserId,
    pub fields: FieldMap,
}

/// One differing field between the current record state and a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old_value: Value,
    pub new_value: Value,
}

impl Proposal {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn field_bool(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn company_name(&self) -> Option<&str> {
        self.field_str(fields::COMPANY_NAME)
    }

    pub fn is_needs_bibserve_account(&self) -> bool {
        self.field_bool(fields::IS_NEEDS_BIBSERVE_ACCOUNT)
    }

    /// One-line display summary: `"<company>" <city>, <country>`.
    pub fn summary(&self) -> String {
        format!(
            "\"{}\" {}, {}",
            self.field_str(fields::COMPANY_NAME).unwrap_or(""),
            self.field_str(fields::CITY).unwrap_or(""),
            self.field_str(fields::COUNTRY).unwrap_or(""),
        )
    }

    /// Fields whose current value differs from the snapshot's value,
    /// restricted to `field_names`. A field absent on either side compares
    /// as JSON null.
    pub fn diff_fields<'a>(
        current: &FieldMap,
        snapshot: &FieldMap,
        field_names: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, FieldDiff> {
        let mut diff = BTreeMap::new();
        for name in field_names {
            let old_value = snapshot.get(name).cloned().unwrap_or(Value::Null);
            let new_value = current.get(name).cloned().unwrap_or(Value::Null);
            if old_value != new_value {
                diff.insert(name.to_string(), FieldDiff { old_value, new_value });
            }
        }
        diff
    }

    /// Apply submitted values onto the field map, restricted to the node's
    /// editable fields. Unknown keys are ignored rather than written.
    pub fn apply_field_values(fields: &mut FieldMap, values: &FieldMap, editable: &[&str]) {
        for (name, value) in values {
            if editable.contains(&name.as_str()) {
                fields.insert(name.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_map(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_diff_restricted_to_requested_fields() {
        let snapshot = field_map(&[
            ("company_name", json!("Before LLC")),
            ("city", json!("Lyon")),
        ]);
        let current = field_map(&[
            ("company_name", json!("After LLC")),
            ("city", json!("Paris")),
        ]);

        let diff = Proposal::diff_fields(&current, &snapshot, ["company_name"]);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["company_name"].old_value, json!("Before LLC"));
        assert_eq!(diff["company_name"].new_value, json!("After LLC"));
    }

    #[test]
    fn test_diff_missing_field_compares_as_null() {
        let snapshot = field_map(&[("company_name", json!("Acme"))]);
        let current = field_map(&[("company_name", json!("Acme")), ("j_code", json!("J-1"))]);

        let diff = Proposal::diff_fields(&current, &snapshot, ["company_name", "j_code"]);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff["j_code"].old_value, Value::Null);
    }

    #[test]
    fn test_apply_field_values_respects_editable_set() {
        let mut fields = field_map(&[("company_name", json!("Acme")), ("j_code", json!("J-1"))]);
        let submitted = field_map(&[
            ("company_name", json!("Acme GmbH")),
            ("j_code", json!("J-FORGED")),
        ]);

        Proposal::apply_field_values(&mut fields, &submitted, &["company_name"]);
        assert_eq!(fields["company_name"], json!("Acme GmbH"));
        assert_eq!(fields["j_code"], json!("J-1"));
    }
}
