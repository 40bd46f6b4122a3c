//! # Proposal Core
//!
//! Workflow core for corporate client-registration proposals: a directed
//! graph of human approval steps with branching, parallel splits/joins,
//! and a correction/feedback loop that lets reviewers send field-level
//! correction requests backward through the process and resume forward
//! once resolved.
//!
//! ## Architecture
//!
//! - [`flow`] — typed flow graphs built with a two-phase builder (specs
//!   with symbolic names, then a resolver pass into an arena), plus pure
//!   guard predicates over an activation snapshot.
//! - [`flows`] — the hard-coded process family: proposal confirmation and
//!   its two dependent sub-processes (BibServe activation, paper docs).
//! - [`orchestration`] — the request-driven engine: one transaction per
//!   human action spanning task status, proposal mutation, version
//!   creation, correction writes, split/join bookkeeping and next-task
//!   creation.
//! - [`models`] / [`storage`] — durable rows behind a storage trait with
//!   in-memory and PostgreSQL (sqlx) backends; the
//!   at-most-one-active-correction invariant is a storage-level
//!   constraint.
//! - [`events`] — fire-and-forget lifecycle events (task created, process
//!   completed) for the notification collaborator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use proposal_core::events::EventPublisher;
//! use proposal_core::flows::{FlowRegistry, PROPOSAL_CONFIRMATION};
//! use proposal_core::orchestration::ProcessEngine;
//! use proposal_core::storage::MemoryStorage;
//!
//! # async fn example() -> proposal_core::Result<()> {
//! let engine = ProcessEngine::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(FlowRegistry::standard()?),
//!     EventPublisher::default(),
//! );
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("company_name".to_string(), "Acme LLC".into());
//! let outcome = engine
//!     .start_process(PROPOSAL_CONFIRMATION, "client@acme".to_string(), fields)
//!     .await?;
//! println!("first task: {}", outcome.created_tasks[0].node);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod flow;
pub mod flows;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod storage;

pub use config::{ConfigLoader, CoreConfig, DatabaseConfig, EventConfig};
pub use error::{ProposalError, Result, ValidationErrors};
pub use orchestration::{
    CorrectionRequest, ProcessEngine, StartOutcome, SubmissionOutcome, SubmissionRequest,
};
pub use state_machine::{ProcessStatus, TaskStatus};
