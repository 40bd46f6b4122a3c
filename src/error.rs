//! Structured error handling for the proposal workflow core.
//!
//! One crate-wide error enum with a `Result` alias. Validation-class errors
//! carry structured per-field messages so the submission boundary can hand
//! them back to the caller; structural errors (unmatched switch, join
//! re-entry, duplicate correction) are fatal to the surrounding transaction.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProposalError {
    /// The submission was read against a version that is no longer the
    /// latest one. The caller must reload and retry; nothing is merged.
    #[error("stale version: submission read against version {presented}, latest is {latest}")]
    StaleVersion { presented: i64, latest: i64 },

    /// A second active correction was attempted for the same
    /// (proposal, target step) pair. Rejected at the storage boundary.
    #[error("an active correction already exists for proposal {proposal_id} and step {for_step}")]
    DuplicateActiveCorrection { proposal_id: i64, for_step: String },

    /// No switch case matched and no default case exists. A flow graph
    /// configuration defect; the process must not silently stall.
    #[error("switch node '{node}' matched no case and has no default")]
    UnmatchedSwitch { node: String },

    /// A join was asked to advance a branch that was never split or was
    /// already accounted for.
    #[error("join node '{node}' re-entered: {detail}")]
    JoinReentry { node: String, detail: String },

    /// Submission did not address the active correction (or failed another
    /// form-level rule). Recoverable; carries per-field messages.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The flow graph failed to build: unresolved or duplicate node names,
    /// edge arity violations, an unpaired join.
    #[error("flow graph configuration error: {0}")]
    GraphConfig(String),

    /// Illegal task or process status change.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("event error: {0}")]
    Event(String),
}

pub type Result<T> = std::result::Result<T, ProposalError>;

impl From<sqlx::Error> for ProposalError {
    fn from(err: sqlx::Error) -> Self {
        ProposalError::Storage(err.to_string())
    }
}

/// Per-field validation messages keyed by field name. Form-level messages
/// use the `__all__` sentinel key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn messages_for(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl From<ValidationErrors> for ProposalError {
    fn from(errors: ValidationErrors) -> Self {
        ProposalError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_accumulate_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("company_name", "field must be changed");
        errors.add("company_name", "reviewer asked for the legal name");
        errors.add("__all__", "at least one field must be changed");

        assert!(!errors.is_empty());
        assert_eq!(errors.messages_for("company_name").len(), 2);
        assert_eq!(errors.messages_for("inn").len(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = ProposalError::StaleVersion {
            presented: 3,
            latest: 5,
        };
        assert!(err.to_string().contains("version 3"));

        let err = ProposalError::UnmatchedSwitch {
            node: "check_approve_by_account_manager".into(),
        };
        assert!(err.to_string().contains("no default"));
    }
}
