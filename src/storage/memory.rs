//! In-memory storage backend.
//!
//! Transactions are serializable by construction: `begin` takes the state
//! mutex and holds it until commit or rollback, and a snapshot taken at
//! begin restores the state when the transaction is dropped uncommitted.
//! That gives the engine the same atomicity guarantees as the SQL backend,
//! which is what the concurrency properties in the test suite exercise.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Storage, StorageTx};
use crate::error::{ProposalError, Result};
use crate::models::{
    BranchToken, Correction, FieldMap, NewBranchToken, NewCorrection, NewProcess, NewProposal,
    NewSignal, NewSplitInstance, NewTask, NewVersion, ProcessInstance, Proposal, Signal,
    SplitInstance, Task, UserId, Version,
};
use crate::state_machine::{ProcessStatus, TaskStatus};

#[derive(Debug, Default, Clone)]
struct MemState {
    seq: i64,
    proposals: BTreeMap<i64, Proposal>,
    processes: BTreeMap<i64, ProcessInstance>,
    tasks: BTreeMap<i64, Task>,
    versions: BTreeMap<i64, Version>,
    corrections: BTreeMap<i64, Correction>,
    splits: BTreeMap<i64, SplitInstance>,
    branches: BTreeMap<i64, BranchToken>,
    signals: Vec<Signal>,
}

impl MemState {
    fn next_id(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemState>,
    /// Present until commit; restored on drop, making uncommitted
    /// transactions roll back.
    snapshot: Option<MemState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn insert_process(&mut self, new: NewProcess) -> Result<ProcessInstance> {
        let id = self.guard.next_id();
        let process = ProcessInstance {
            id,
            flow: new.flow,
            proposal_id: new.proposal_id,
            status: ProcessStatus::Active,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.guard.processes.insert(id, process.clone());
        Ok(process)
    }

    async fn get_process(&mut self, id: i64) -> Result<ProcessInstance> {
        self.guard
            .processes
            .get(&id)
            .cloned()
            .ok_or(ProposalError::NotFound {
                entity: "process",
                id,
            })
    }

    async fn update_process_status(
        &mut self,
        id: i64,
        status: ProcessStatus,
    ) -> Result<ProcessInstance> {
        let process = self
            .guard
            .processes
            .get_mut(&id)
            .ok_or(ProposalError::NotFound {
                entity: "process",
                id,
            })?;
        process.status = status;
        if status.is_terminal() {
            process.finished_at = Some(Utc::now());
        }
        Ok(process.clone())
    }

    async fn processes_for_proposal(&mut self, proposal_id: i64) -> Result<Vec<ProcessInstance>> {
        Ok(self
            .guard
            .processes
            .values()
            .filter(|p| p.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    async fn insert_proposal(&mut self, new: NewProposal) -> Result<Proposal> {
        let id = self.guard.next_id();
        let now = Utc::now();
        let proposal = Proposal {
            id,
            client: new.client,
            fields: new.fields,
            created_at: now,
            updated_at: now,
        };
        self.guard.proposals.insert(id, proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(&mut self, id: i64) -> Result<Proposal> {
        self.guard
            .proposals
            .get(&id)
            .cloned()
            .ok_or(ProposalError::NotFound {
                entity: "proposal",
                id,
            })
    }

    async fn update_proposal_fields(&mut self, id: i64, fields: FieldMap) -> Result<Proposal> {
        let proposal = self
            .guard
            .proposals
            .get_mut(&id)
            .ok_or(ProposalError::NotFound {
                entity: "proposal",
                id,
            })?;
        proposal.fields = fields;
        proposal.updated_at = Utc::now();
        Ok(proposal.clone())
    }

    async fn insert_task(&mut self, new: NewTask) -> Result<Task> {
        let id = self.guard.next_id();
        let task = Task {
            id,
            process_id: new.process_id,
            node: new.node,
            status: new.status,
            owner: new.owner,
            branch_id: new.branch_id,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.guard.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get_task(&mut self, id: i64) -> Result<Task> {
        self.guard
            .tasks
            .get(&id)
            .cloned()
            .ok_or(ProposalError::NotFound { entity: "task", id })
    }

    async fn update_task_status(
        &mut self,
        id: i64,
        status: TaskStatus,
        owner: Option<UserId>,
    ) -> Result<Task> {
        let task = self
            .guard
            .tasks
            .get_mut(&id)
            .ok_or(ProposalError::NotFound { entity: "task", id })?;
        task.status = status;
        if let Some(owner) = owner {
            task.owner = Some(owner);
        }
        if status.is_terminal() {
            task.finished_at = Some(Utc::now());
        }
        Ok(task.clone())
    }

    async fn tasks_for(
        &mut self,
        process_id: i64,
        node: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        Ok(self
            .guard
            .tasks
            .values()
            .filter(|t| t.process_id == process_id)
            .filter(|t| node.map_or(true, |n| t.node == n))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn insert_version(&mut self, new: NewVersion) -> Result<Version> {
        let id = self.guard.next_id();
        let version = Version {
            id,
            proposal_id: new.proposal_id,
            author: new.author,
            step: new.step,
            snapshot: new.snapshot,
            created_at: Utc::now(),
        };
        self.guard.versions.insert(id, version.clone());
        Ok(version)
    }

    async fn get_version(&mut self, id: i64) -> Result<Version> {
        self.guard
            .versions
            .get(&id)
            .cloned()
            .ok_or(ProposalError::NotFound {
                entity: "version",
                id,
            })
    }

    async fn latest_version(&mut self, proposal_id: i64) -> Result<Option<Version>> {
        Ok(self
            .guard
            .versions
            .values()
            .filter(|v| v.proposal_id == proposal_id)
            .max_by_key(|v| (v.created_at, v.id))
            .cloned())
    }

    async fn insert_correction(&mut self, new: NewCorrection) -> Result<Correction> {
        let duplicate = self
            .guard
            .corrections
            .values()
            .any(|c| c.proposal_id == new.proposal_id && c.for_step == new.for_step && c.is_active);
        if duplicate {
            return Err(ProposalError::DuplicateActiveCorrection {
                proposal_id: new.proposal_id,
                for_step: new.for_step,
            });
        }

        let id = self.guard.next_id();
        let correction = Correction {
            id,
            proposal_id: new.proposal_id,
            task_id: new.task_id,
            for_step: new.for_step,
            reviewed_version_id: new.reviewed_version_id,
            messages: new.messages,
            is_active: true,
            author: new.author,
            created_at: Utc::now(),
            fixed_in_version_id: None,
        };
        self.guard.corrections.insert(id, correction.clone());
        Ok(correction)
    }

    async fn active_corrections(
        &mut self,
        proposal_id: i64,
        for_step: Option<&str>,
    ) -> Result<Vec<Correction>> {
        Ok(self
            .guard
            .corrections
            .values()
            .filter(|c| c.proposal_id == proposal_id && c.is_active)
            .filter(|c| for_step.map_or(true, |s| c.for_step == s))
            .cloned()
            .collect())
    }

    async fn latest_correction(
        &mut self,
        proposal_id: i64,
        for_step: &str,
    ) -> Result<Option<Correction>> {
        Ok(self
            .guard
            .corrections
            .values()
            .filter(|c| c.proposal_id == proposal_id && c.for_step == for_step)
            .max_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn resolve_correction(
        &mut self,
        id: i64,
        fixed_in_version_id: i64,
    ) -> Result<Correction> {
        let correction = self
            .guard
            .corrections
            .get_mut(&id)
            .ok_or(ProposalError::NotFound {
                entity: "correction",
                id,
            })?;
        if correction.is_active {
            correction.is_active = false;
            correction.fixed_in_version_id = Some(fixed_in_version_id);
        }
        Ok(correction.clone())
    }

    async fn insert_split(&mut self, new: NewSplitInstance) -> Result<SplitInstance> {
        let id = self.guard.next_id();
        let split = SplitInstance {
            id,
            process_id: new.process_id,
            node: new.node,
            consumed: false,
            created_at: Utc::now(),
        };
        self.guard.splits.insert(id, split.clone());
        Ok(split)
    }

    async fn open_split(&mut self, process_id: i64, node: &str) -> Result<Option<SplitInstance>> {
        Ok(self
            .guard
            .splits
            .values()
            .find(|s| s.process_id == process_id && s.node == node && !s.consumed)
            .cloned())
    }

    async fn consume_split(&mut self, id: i64) -> Result<()> {
        let split = self
            .guard
            .splits
            .get_mut(&id)
            .ok_or(ProposalError::NotFound { entity: "split", id })?;
        split.consumed = true;
        Ok(())
    }

    async fn insert_branch(&mut self, new: NewBranchToken) -> Result<BranchToken> {
        let id = self.guard.next_id();
        let branch = BranchToken {
            id,
            split_id: new.split_id,
            target_node: new.target_node,
            done: false,
            created_at: Utc::now(),
        };
        self.guard.branches.insert(id, branch.clone());
        Ok(branch)
    }

    async fn get_branch(&mut self, id: i64) -> Result<BranchToken> {
        self.guard
            .branches
            .get(&id)
            .cloned()
            .ok_or(ProposalError::NotFound {
                entity: "branch",
                id,
            })
    }

    async fn complete_branch(&mut self, id: i64) -> Result<BranchToken> {
        let branch = self
            .guard
            .branches
            .get_mut(&id)
            .ok_or(ProposalError::NotFound {
                entity: "branch",
                id,
            })?;
        branch.done = true;
        Ok(branch.clone())
    }

    async fn branches_for_split(&mut self, split_id: i64) -> Result<Vec<BranchToken>> {
        Ok(self
            .guard
            .branches
            .values()
            .filter(|b| b.split_id == split_id)
            .cloned()
            .collect())
    }

    async fn insert_signal(&mut self, new: NewSignal) -> Result<Signal> {
        let id = self.guard.next_id();
        let signal = Signal {
            id,
            proposal_id: new.proposal_id,
            kind: new.kind,
            received_at: Utc::now(),
        };
        self.guard.signals.push(signal.clone());
        Ok(signal)
    }

    async fn has_signal(&mut self, proposal_id: i64, kind: &str) -> Result<bool> {
        Ok(self
            .guard
            .signals
            .iter()
            .any(|s| s.proposal_id == proposal_id && s.kind == kind))
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}
