//! # Storage Layer
//!
//! Every durable entity sits behind the [`Storage`]/[`StorageTx`] trait
//! pair. A transaction spans one submitted human action: task status,
//! proposal mutation, version creation, correction writes, split/join
//! bookkeeping and next-task creation commit or roll back together.
//!
//! Two backends ship: [`memory::MemoryStorage`] (serializable transactions
//! over a tokio mutex with snapshot rollback; used by tests and
//! embeddings) and [`postgres::PgStorage`] (sqlx, one SQL transaction per
//! [`StorageTx`]). The at-most-one-active-correction invariant lives in
//! both backends' `insert_correction`, not in caller code.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BranchToken, Correction, FieldMap, NewBranchToken, NewCorrection, NewProcess, NewProposal,
    NewSignal, NewSplitInstance, NewTask, NewVersion, ProcessInstance, Proposal, Signal,
    SplitInstance, Task, UserId, Version,
};
use crate::state_machine::{ProcessStatus, TaskStatus};

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a transaction. All mutation happens inside one; dropping an
    /// uncommitted transaction rolls it back.
    async fn begin(&self) -> Result<Box<dyn StorageTx>>;
}

#[async_trait]
pub trait StorageTx: Send {
    // -- process instances --
    async fn insert_process(&mut self, new: NewProcess) -> Result<ProcessInstance>;
    async fn get_process(&mut self, id: i64) -> Result<ProcessInstance>;
    async fn update_process_status(
        &mut self,
        id: i64,
        status: ProcessStatus,
    ) -> Result<ProcessInstance>;
    async fn processes_for_proposal(&mut self, proposal_id: i64) -> Result<Vec<ProcessInstance>>;

    // -- proposals --
    async fn insert_proposal(&mut self, new: NewProposal) -> Result<Proposal>;
    async fn get_proposal(&mut self, id: i64) -> Result<Proposal>;
    async fn update_proposal_fields(&mut self, id: i64, fields: FieldMap) -> Result<Proposal>;

    // -- tasks --
    async fn insert_task(&mut self, new: NewTask) -> Result<Task>;
    async fn get_task(&mut self, id: i64) -> Result<Task>;
    /// Write the given status (and owner, when provided); stamps
    /// `finished_at` on DONE. Transition legality is the runtime's job.
    async fn update_task_status(
        &mut self,
        id: i64,
        status: TaskStatus,
        owner: Option<UserId>,
    ) -> Result<Task>;
    async fn tasks_for(
        &mut self,
        process_id: i64,
        node: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>>;

    // -- versions --
    async fn insert_version(&mut self, new: NewVersion) -> Result<Version>;
    async fn get_version(&mut self, id: i64) -> Result<Version>;
    /// Most recently created version, id as tiebreaker.
    async fn latest_version(&mut self, proposal_id: i64) -> Result<Option<Version>>;

    // -- corrections --
    /// Inserts with active=true. Fails with `DuplicateActiveCorrection`
    /// when an active correction already exists for the same
    /// (proposal, for_step) pair; this is the storage-level invariant.
    async fn insert_correction(&mut self, new: NewCorrection) -> Result<Correction>;
    async fn active_corrections(
        &mut self,
        proposal_id: i64,
        for_step: Option<&str>,
    ) -> Result<Vec<Correction>>;
    /// Most recent correction for the step, active or not.
    async fn latest_correction(
        &mut self,
        proposal_id: i64,
        for_step: &str,
    ) -> Result<Option<Correction>>;
    /// Deactivates and records the resolving version. Idempotent: a
    /// resolved correction is returned unchanged.
    async fn resolve_correction(&mut self, id: i64, fixed_in_version_id: i64)
        -> Result<Correction>;

    // -- split/join bookkeeping --
    async fn insert_split(&mut self, new: NewSplitInstance) -> Result<SplitInstance>;
    async fn open_split(&mut self, process_id: i64, node: &str) -> Result<Option<SplitInstance>>;
    async fn consume_split(&mut self, id: i64) -> Result<()>;
    async fn insert_branch(&mut self, new: NewBranchToken) -> Result<BranchToken>;
    async fn get_branch(&mut self, id: i64) -> Result<BranchToken>;
    async fn complete_branch(&mut self, id: i64) -> Result<BranchToken>;
    async fn branches_for_split(&mut self, split_id: i64) -> Result<Vec<BranchToken>>;

    // -- signals --
    async fn insert_signal(&mut self, new: NewSignal) -> Result<Signal>;
    async fn has_signal(&mut self, proposal_id: i64, kind: &str) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
