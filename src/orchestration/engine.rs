//! Flow graph engine.
//!
//! Traversal is a work queue over node ids: completing a task enqueues its
//! node's successor, and automatic nodes (If, Switch, Split, Join, End)
//! evaluate and keep the queue moving until the process parks on human or
//! signal tasks. Every visited node leaves a task row, so the activation
//! history is complete even across loop-backs.
//!
//! Join accounting is durable: a Split evaluation mints one branch token
//! per activated edge and tasks carry their token downstream; the paired
//! Join completes tokens and fires exactly once, when none remain open.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::events as event_names;
use crate::error::{ProposalError, Result};
use crate::events::{process_completed_context, task_created_context, EventPublisher};
use crate::flow::{FlowGraph, GuardContext, NodeId, NodeKind};
use crate::flows::FlowRegistry;
use crate::models::{
    FieldMap, NewProcess, NewProposal, NewSignal, NewSplitInstance, NewTask, NewVersion,
    ProcessInstance, Proposal, Task, UserId,
};
use crate::state_machine::{ProcessStatus, TaskStatus};
use crate::storage::{Storage, StorageTx};

/// One queued activation: a node to enter, carrying the branch token of
/// the task line it belongs to.
type QueueEntry = (NodeId, Option<i64>);

/// Request-driven engine over a storage backend and a flow registry.
pub struct ProcessEngine {
    storage: Arc<dyn Storage>,
    registry: Arc<FlowRegistry>,
    publisher: EventPublisher,
}

/// Result of starting a process instance.
#[derive(Debug)]
pub struct StartOutcome {
    pub process: ProcessInstance,
    pub proposal: Proposal,
    pub created_tasks: Vec<Task>,
}

/// Accumulated effects of one advance pass, published after commit.
#[derive(Default)]
pub(crate) struct AdvanceLog {
    pub created_tasks: Vec<(Task, i64)>,
    pub completed_processes: Vec<ProcessInstance>,
    pending_subflows: Vec<(String, i64, UserId)>,
    pending_signals: Vec<(i64, String)>,
}

impl AdvanceLog {
    pub(crate) fn push_subflow(&mut self, flow: &str, proposal_id: i64, actor: &UserId) {
        self.pending_subflows
            .push((flow.to_string(), proposal_id, actor.clone()));
    }

    pub(crate) fn push_signal(&mut self, proposal_id: i64, kind: &str) {
        self.pending_signals.push((proposal_id, kind.to_string()));
    }
}

impl ProcessEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<FlowRegistry>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            storage,
            registry,
            publisher,
        }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub(crate) fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    /// Create the proposal, its first version, the process instance and
    /// the DONE start task, then advance to the first human task. One
    /// transaction.
    pub async fn start_process(
        &self,
        flow_name: &str,
        client: UserId,
        initial_fields: FieldMap,
    ) -> Result<StartOutcome> {
        let graph = self.registry.get(flow_name)?;
        let mut tx = self.storage.begin().await?;

        let proposal = tx
            .insert_proposal(NewProposal {
                client: client.clone(),
                fields: initial_fields,
            })
            .await?;
        let process = tx
            .insert_process(NewProcess {
                flow: flow_name.to_string(),
                proposal_id: proposal.id,
            })
            .await?;

        let start_node = graph.node(graph.start());
        // The first version exists from the moment the record does.
        tx.insert_version(NewVersion {
            proposal_id: proposal.id,
            author: client.clone(),
            step: start_node.name.clone(),
            snapshot: proposal.fields.clone(),
        })
        .await?;

        tx.insert_task(NewTask {
            process_id: process.id,
            node: start_node.name.clone(),
            status: TaskStatus::Done,
            owner: Some(client),
            branch_id: None,
        })
        .await?;

        let NodeKind::Start { next } = start_node.kind else {
            return Err(ProposalError::GraphConfig(format!(
                "flow '{flow_name}': start node is not a Start"
            )));
        };

        let mut log = AdvanceLog::default();
        self.run_node_queue(
            tx.as_mut(),
            &graph,
            &process,
            VecDeque::from([(next, None)]),
            &mut log,
        )
        .await?;
        self.drain_pending(tx.as_mut(), &mut log).await?;

        let process = tx.get_process(process.id).await?;
        tx.commit().await?;

        info!(
            process_id = process.id,
            proposal_id = proposal.id,
            flow = flow_name,
            "process started"
        );
        let created_tasks = self.publish_log(&log);
        Ok(StartOutcome {
            process,
            proposal,
            created_tasks,
        })
    }

    /// Claim a NEW task for a user.
    pub async fn assign_task(&self, task_id: i64, user: UserId) -> Result<Task> {
        let mut tx = self.storage.begin().await?;
        let task = tx.get_task(task_id).await?;
        let status = task.status.transition_to(TaskStatus::Assigned)?;
        let task = tx.update_task_status(task.id, status, Some(user)).await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Record an external signal for the proposal and advance every
    /// process parked on a matching signal node. Returns the tasks the
    /// advance created.
    pub async fn deliver_signal(&self, proposal_id: i64, kind: &str) -> Result<Vec<Task>> {
        let mut tx = self.storage.begin().await?;
        let mut log = AdvanceLog::default();

        self.record_signal(tx.as_mut(), proposal_id, kind, &mut log)
            .await?;
        self.drain_pending(tx.as_mut(), &mut log).await?;

        tx.commit().await?;
        info!(proposal_id, kind, "external signal delivered");
        Ok(self.publish_log(&log))
    }

    /// Insert the signal row and wake parked waiters, inside the caller's
    /// transaction.
    pub(crate) async fn record_signal(
        &self,
        tx: &mut dyn StorageTx,
        proposal_id: i64,
        kind: &str,
        log: &mut AdvanceLog,
    ) -> Result<()> {
        tx.insert_signal(NewSignal {
            proposal_id,
            kind: kind.to_string(),
        })
        .await?;

        let processes = tx.processes_for_proposal(proposal_id).await?;
        for process in processes {
            if process.status.is_terminal() {
                continue;
            }
            let graph = self.registry.get(&process.flow)?;
            let mut queue = VecDeque::new();
            for task in tx.tasks_for(process.id, None, None).await? {
                if task.status.is_terminal() {
                    continue;
                }
                let Some(node) = graph.node_by_name(&task.node) else {
                    continue;
                };
                if let NodeKind::ExternalSignal {
                    kind: wanted, next, ..
                } = &node.kind
                {
                    if wanted.as_str() == kind {
                        tx.update_task_status(task.id, TaskStatus::Done, None).await?;
                        debug!(task_id = task.id, node = %task.node, "signal wait satisfied");
                        queue.push_back((*next, task.branch_id));
                    }
                }
            }
            if !queue.is_empty() {
                self.run_node_queue(tx, &graph, &process, queue, log).await?;
            }
        }
        Ok(())
    }

    /// Start a sub-process for an existing proposal, inside the caller's
    /// transaction.
    pub(crate) async fn start_subprocess(
        &self,
        tx: &mut dyn StorageTx,
        flow_name: &str,
        proposal_id: i64,
        actor: &UserId,
        log: &mut AdvanceLog,
    ) -> Result<ProcessInstance> {
        let graph = self.registry.get(flow_name)?;
        let process = tx
            .insert_process(NewProcess {
                flow: flow_name.to_string(),
                proposal_id,
            })
            .await?;

        let start_node = graph.node(graph.start());
        tx.insert_task(NewTask {
            process_id: process.id,
            node: start_node.name.clone(),
            status: TaskStatus::Done,
            owner: Some(actor.clone()),
            branch_id: None,
        })
        .await?;

        let NodeKind::Start { next } = start_node.kind else {
            return Err(ProposalError::GraphConfig(format!(
                "flow '{flow_name}': start node is not a Start"
            )));
        };

        info!(
            process_id = process.id,
            proposal_id,
            flow = flow_name,
            "sub-process started"
        );
        self.run_node_queue(tx, &graph, &process, VecDeque::from([(next, None)]), log)
            .await?;
        Ok(process)
    }

    /// Work through deferred cross-process effects (sub-process starts,
    /// emitted signals) until none remain. Same transaction throughout.
    pub(crate) async fn drain_pending(
        &self,
        tx: &mut dyn StorageTx,
        log: &mut AdvanceLog,
    ) -> Result<()> {
        loop {
            let subflows = std::mem::take(&mut log.pending_subflows);
            let signals = std::mem::take(&mut log.pending_signals);
            if subflows.is_empty() && signals.is_empty() {
                return Ok(());
            }
            for (flow, proposal_id, actor) in subflows {
                self.start_subprocess(tx, &flow, proposal_id, &actor, log)
                    .await?;
            }
            for (proposal_id, kind) in signals {
                self.record_signal(tx, proposal_id, &kind, log).await?;
            }
        }
    }

    /// Snapshot the activation state guard predicates evaluate over.
    pub(crate) async fn guard_context(
        &self,
        tx: &mut dyn StorageTx,
        process: &ProcessInstance,
    ) -> Result<GuardContext> {
        let proposal = tx.get_proposal(process.proposal_id).await?;
        let active_correction_steps = tx
            .active_corrections(process.proposal_id, None)
            .await?
            .into_iter()
            .map(|c| c.for_step)
            .collect();
        let undone_task_nodes = tx
            .tasks_for(process.id, None, None)
            .await?
            .into_iter()
            .filter(|t| t.status.is_undone())
            .map(|t| t.node)
            .collect();
        Ok(GuardContext {
            proposal,
            active_correction_steps,
            undone_task_nodes,
        })
    }

    /// Drive the traversal queue until every line of work has parked on a
    /// human task, a signal wait, or the End node.
    pub(crate) async fn run_node_queue(
        &self,
        tx: &mut dyn StorageTx,
        graph: &FlowGraph,
        process: &ProcessInstance,
        mut queue: VecDeque<QueueEntry>,
        log: &mut AdvanceLog,
    ) -> Result<()> {
        let proposal = tx.get_proposal(process.proposal_id).await?;

        while let Some((node_id, branch_id)) = queue.pop_front() {
            let node = graph.node(node_id);
            debug!(
                process_id = process.id,
                node = %node.name,
                branch_id,
                "entering node"
            );

            match &node.kind {
                NodeKind::Start { .. } => {
                    return Err(ProposalError::GraphConfig(format!(
                        "flow '{}': start node '{}' re-entered",
                        graph.name(),
                        node.name
                    )));
                }

                NodeKind::View { config, .. } => {
                    let new_task = if config.assign_to_client {
                        NewTask::assigned(process.id, node.name.clone(), proposal.client.clone())
                    } else {
                        NewTask::new(process.id, node.name.clone())
                    };
                    let task = tx.insert_task(new_task.with_branch(branch_id)).await?;
                    info!(
                        process_id = process.id,
                        task_id = task.id,
                        node = %node.name,
                        owner = task.owner.as_deref(),
                        "task activated"
                    );
                    log.created_tasks.push((task, process.proposal_id));
                }

                NodeKind::If {
                    predicate,
                    then_next,
                    else_next,
                } => {
                    self.record_automatic_task(tx, process, &node.name, branch_id)
                        .await?;
                    let ctx = self.guard_context(tx, process).await?;
                    let target = if predicate(&ctx) { *then_next } else { *else_next };
                    queue.push_back((target, branch_id));
                }

                NodeKind::Switch { cases, default } => {
                    self.record_automatic_task(tx, process, &node.name, branch_id)
                        .await?;
                    let ctx = self.guard_context(tx, process).await?;
                    let target = cases
                        .iter()
                        .find(|case| (case.predicate)(&ctx))
                        .map(|case| case.target)
                        .or(*default)
                        .ok_or_else(|| ProposalError::UnmatchedSwitch {
                            node: node.name.clone(),
                        })?;
                    queue.push_back((target, branch_id));
                }

                NodeKind::Split { branches } => {
                    self.record_automatic_task(tx, process, &node.name, branch_id)
                        .await?;
                    let ctx = self.guard_context(tx, process).await?;
                    let activated: Vec<NodeId> = branches
                        .iter()
                        .filter(|b| b.guard.as_ref().map_or(true, |g| g(&ctx)))
                        .map(|b| b.target)
                        .collect();

                    self.enter_split(tx, graph, process, &node.name, activated, &mut queue)
                        .await?;
                }

                NodeKind::Join { split, next } => {
                    if self
                        .enter_join(tx, graph, process, &node.name, *split, branch_id)
                        .await?
                    {
                        self.record_automatic_task(tx, process, &node.name, None).await?;
                        queue.push_back((*next, None));
                    }
                }

                NodeKind::ExternalSignal {
                    kind,
                    allow_skip,
                    next,
                } => {
                    if *allow_skip && tx.has_signal(process.proposal_id, kind).await? {
                        debug!(
                            process_id = process.id,
                            node = %node.name,
                            kind = %kind,
                            "signal already observed, skipping wait"
                        );
                        self.record_automatic_task(tx, process, &node.name, branch_id)
                            .await?;
                        queue.push_back((*next, branch_id));
                    } else {
                        let task = tx
                            .insert_task(
                                NewTask::new(process.id, node.name.clone()).with_branch(branch_id),
                            )
                            .await?;
                        info!(
                            process_id = process.id,
                            task_id = task.id,
                            node = %node.name,
                            kind = %kind,
                            "parked awaiting signal"
                        );
                        log.created_tasks.push((task, process.proposal_id));
                    }
                }

                NodeKind::End => {
                    self.record_automatic_task(tx, process, &node.name, branch_id)
                        .await?;
                    let completed = tx
                        .update_process_status(process.id, ProcessStatus::Completed)
                        .await?;
                    info!(
                        process_id = process.id,
                        flow = %graph.name(),
                        "process completed"
                    );
                    log.completed_processes.push(completed);
                }
            }
        }
        Ok(())
    }

    /// Evaluate split activation against the durable bookkeeping. A fresh
    /// evaluation mints a split instance and one token per activated
    /// branch; a re-entry while an instance is still open only adds the
    /// branches that are not already running.
    async fn enter_split(
        &self,
        tx: &mut dyn StorageTx,
        graph: &FlowGraph,
        process: &ProcessInstance,
        node_name: &str,
        activated: Vec<NodeId>,
        queue: &mut VecDeque<QueueEntry>,
    ) -> Result<()> {
        let open = tx.open_split(process.id, node_name).await?;

        match open {
            Some(split) => {
                let existing = tx.branches_for_split(split.id).await?;
                for target in activated {
                    let target_name = &graph.node(target).name;
                    let running = existing
                        .iter()
                        .any(|b| &b.target_node == target_name && !b.done);
                    if running {
                        continue;
                    }
                    let token = tx
                        .insert_branch(crate::models::NewBranchToken {
                            split_id: split.id,
                            target_node: target_name.clone(),
                        })
                        .await?;
                    queue.push_back((target, Some(token.id)));
                }
            }
            None => {
                if activated.is_empty() {
                    return Err(ProposalError::GraphConfig(format!(
                        "flow '{}': split node '{node_name}' activated no branches",
                        graph.name()
                    )));
                }
                let split = tx
                    .insert_split(NewSplitInstance {
                        process_id: process.id,
                        node: node_name.to_string(),
                    })
                    .await?;
                for target in activated {
                    let token = tx
                        .insert_branch(crate::models::NewBranchToken {
                            split_id: split.id,
                            target_node: graph.node(target).name.clone(),
                        })
                        .await?;
                    debug!(
                        process_id = process.id,
                        split_id = split.id,
                        branch_id = token.id,
                        target = %token.target_node,
                        "branch activated"
                    );
                    queue.push_back((target, Some(token.id)));
                }
            }
        }
        Ok(())
    }

    /// AND-join arrival. Completes the arriving branch token and reports
    /// whether the join fires (all tokens done). Fatal on arrivals the
    /// split never minted.
    async fn enter_join(
        &self,
        tx: &mut dyn StorageTx,
        graph: &FlowGraph,
        process: &ProcessInstance,
        node_name: &str,
        split_node: NodeId,
        branch_id: Option<i64>,
    ) -> Result<bool> {
        let split_name = &graph.node(split_node).name;
        let open = tx
            .open_split(process.id, split_name)
            .await?
            .ok_or_else(|| ProposalError::JoinReentry {
                node: node_name.to_string(),
                detail: format!("no open split instance for '{split_name}'"),
            })?;

        let branch_id = branch_id.ok_or_else(|| ProposalError::JoinReentry {
            node: node_name.to_string(),
            detail: "arrival without a branch token".to_string(),
        })?;
        let branch = tx.get_branch(branch_id).await?;
        if branch.split_id != open.id {
            return Err(ProposalError::JoinReentry {
                node: node_name.to_string(),
                detail: format!("branch {branch_id} belongs to another split instance"),
            });
        }
        if branch.done {
            return Err(ProposalError::JoinReentry {
                node: node_name.to_string(),
                detail: format!("branch {branch_id} already joined"),
            });
        }

        tx.complete_branch(branch_id).await?;
        let remaining = tx
            .branches_for_split(open.id)
            .await?
            .into_iter()
            .filter(|b| !b.done)
            .count();
        debug!(
            process_id = process.id,
            join = node_name,
            remaining,
            "branch arrived at join"
        );

        if remaining == 0 {
            tx.consume_split(open.id).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Record the visit of an automatic node as an immediately-DONE task.
    async fn record_automatic_task(
        &self,
        tx: &mut dyn StorageTx,
        process: &ProcessInstance,
        node_name: &str,
        branch_id: Option<i64>,
    ) -> Result<Task> {
        tx.insert_task(NewTask {
            process_id: process.id,
            node: node_name.to_string(),
            status: TaskStatus::Done,
            owner: None,
            branch_id,
        })
        .await
    }

    /// Publish accumulated events; called only after commit. Returns the
    /// created tasks for the caller's convenience.
    pub(crate) fn publish_log(&self, log: &AdvanceLog) -> Vec<Task> {
        for (task, proposal_id) in &log.created_tasks {
            if let Err(err) = self.publisher.publish(
                event_names::TASK_CREATED,
                task_created_context(task, *proposal_id),
            ) {
                warn!(task_id = task.id, error = %err, "failed to publish task event");
            }
        }
        for process in &log.completed_processes {
            if let Err(err) = self
                .publisher
                .publish(event_names::PROCESS_COMPLETED, process_completed_context(process))
            {
                warn!(process_id = process.id, error = %err, "failed to publish completion event");
            }
        }
        log.created_tasks.iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Read-side queries for callers presenting tasks and forms. Each opens a
/// short read transaction of its own.
impl ProcessEngine {
    pub async fn get_task(&self, id: i64) -> Result<Task> {
        let mut tx = self.storage.begin().await?;
        let task = tx.get_task(id).await?;
        tx.rollback().await?;
        Ok(task)
    }

    pub async fn get_process(&self, id: i64) -> Result<ProcessInstance> {
        let mut tx = self.storage.begin().await?;
        let process = tx.get_process(id).await?;
        tx.rollback().await?;
        Ok(process)
    }

    pub async fn get_proposal(&self, id: i64) -> Result<Proposal> {
        let mut tx = self.storage.begin().await?;
        let proposal = tx.get_proposal(id).await?;
        tx.rollback().await?;
        Ok(proposal)
    }

    pub async fn processes_for_proposal(&self, proposal_id: i64) -> Result<Vec<ProcessInstance>> {
        let mut tx = self.storage.begin().await?;
        let processes = tx.processes_for_proposal(proposal_id).await?;
        tx.rollback().await?;
        Ok(processes)
    }

    /// Tasks of a process, optionally filtered by node and status.
    pub async fn tasks_for(
        &self,
        process_id: i64,
        node: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let mut tx = self.storage.begin().await?;
        let tasks = tx.tasks_for(process_id, node, status).await?;
        tx.rollback().await?;
        Ok(tasks)
    }

    pub async fn active_corrections(
        &self,
        proposal_id: i64,
        for_step: Option<&str>,
    ) -> Result<Vec<crate::models::Correction>> {
        let mut tx = self.storage.begin().await?;
        let corrections = tx.active_corrections(proposal_id, for_step).await?;
        tx.rollback().await?;
        Ok(corrections)
    }

    /// Latest committed version; the token a form presents back on submit.
    pub async fn latest_version(&self, proposal_id: i64) -> Result<crate::models::Version> {
        let mut tx = self.storage.begin().await?;
        let version =
            tx.latest_version(proposal_id)
                .await?
                .ok_or(ProposalError::NotFound {
                    entity: "version",
                    id: proposal_id,
                })?;
        tx.rollback().await?;
        Ok(version)
    }
}
