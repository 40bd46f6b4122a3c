//! # Orchestration
//!
//! The request-driven engine tying the pieces together. Each inbound human
//! action — starting a process, assigning a task, submitting a task,
//! delivering an external signal — runs as one storage transaction
//! spanning task status, proposal mutation, version creation, correction
//! writes, split/join bookkeeping and next-task creation. Lifecycle events
//! are published only after the transaction commits.

pub mod engine;
pub mod submission;
pub mod versioning;

pub use engine::{ProcessEngine, StartOutcome};
pub use submission::{CorrectionRequest, SubmissionOutcome, SubmissionRequest};
pub use versioning::{commit_version, CommitHook};
