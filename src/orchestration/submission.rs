//! The "submit task" boundary.
//!
//! One inbound operation per human action: the actor, the task, the field
//! values, the version token the form was read against, and any
//! correction messages keyed by target step. Everything it triggers —
//! stale-version check, fix validation, proposal mutation, version
//! commit, correction raising and consumption, task completion and the
//! next advance — runs in one transaction; validation failures return
//! structured per-field messages and leave no trace.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::info;

use super::engine::{AdvanceLog, ProcessEngine};
use super::versioning::{commit_version, CommitHook};
use crate::constants::ALL_FIELDS;
use crate::error::{ProposalError, Result, ValidationErrors};
use crate::flow::{NodeKind, ViewConfig};
use crate::models::{
    Correction, FieldMap, NewCorrection, ProcessInstance, Proposal, Task, UserId, Version,
};
use crate::state_machine::TaskStatus;
use crate::storage::StorageTx;

/// Correction messages addressed to one target step.
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub for_step: String,
    /// Field name (or `__all__`) to free-text message. An empty map means
    /// nothing is raised.
    pub messages: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub task_id: i64,
    pub actor: UserId,
    pub field_values: FieldMap,
    /// Version id the submitted form was read against. Required whenever
    /// the submission mutates fields or raises corrections.
    pub expected_version: Option<i64>,
    pub corrections: Vec<CorrectionRequest>,
}

impl SubmissionRequest {
    /// Plain completion: no field changes, no corrections.
    pub fn approve(task_id: i64, actor: impl Into<UserId>, expected_version: i64) -> Self {
        Self {
            task_id,
            actor: actor.into(),
            field_values: FieldMap::new(),
            expected_version: Some(expected_version),
            corrections: Vec::new(),
        }
    }

    pub fn with_fields(mut self, field_values: FieldMap) -> Self {
        self.field_values = field_values;
        self
    }

    pub fn with_correction(
        mut self,
        for_step: impl Into<String>,
        messages: BTreeMap<String, String>,
    ) -> Self {
        self.corrections.push(CorrectionRequest {
            for_step: for_step.into(),
            messages,
        });
        self
    }
}

#[derive(Debug)]
pub struct SubmissionOutcome {
    pub task: Task,
    pub raised_corrections: Vec<Correction>,
    pub created_tasks: Vec<Task>,
    pub completed_processes: Vec<ProcessInstance>,
}

impl ProcessEngine {
    /// Complete a human task. See module docs for the transaction scope.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome> {
        let mut tx = self.storage().begin().await?;

        let task = tx.get_task(request.task_id).await?;
        if task.status.is_terminal() {
            return Err(ProposalError::InvalidTransition {
                from: task.status.to_string(),
                to: TaskStatus::Done.to_string(),
            });
        }
        let process = tx.get_process(task.process_id).await?;
        let graph = self.registry().get(&process.flow)?;
        let node = graph
            .node_by_name(&task.node)
            .ok_or_else(|| ProposalError::GraphConfig(format!("unknown node '{}'", task.node)))?;
        let NodeKind::View { next, config } = &node.kind else {
            return Err(ProposalError::GraphConfig(format!(
                "node '{}' does not take submissions",
                task.node
            )));
        };

        let proposal = tx.get_proposal(process.proposal_id).await?;
        let latest = tx
            .latest_version(proposal.id)
            .await?
            .ok_or(ProposalError::NotFound {
                entity: "version",
                id: proposal.id,
            })?;

        let requested_corrections: Vec<&CorrectionRequest> = request
            .corrections
            .iter()
            .filter(|c| !c.messages.is_empty())
            .collect();

        check_version_token(&request, &requested_corrections, &latest)?;
        check_correction_targets(config, &task, &requested_corrections)?;

        // A step addressed by an active correction must actually act on it.
        if config.validate_against_correction {
            if let Some(active) = tx
                .active_corrections(proposal.id, Some(&task.node))
                .await?
                .into_iter()
                .next()
            {
                let reviewed = tx.get_version(active.reviewed_version_id).await?;
                validate_correction_addressed(
                    config,
                    &proposal,
                    &request.field_values,
                    &active,
                    &reviewed,
                )?;
            }
        }

        // Field mutation and version commit; auto-resolves corrections
        // addressed to this step when it is the client fix shape.
        let committed = if !config.editable_fields.is_empty() && !request.field_values.is_empty() {
            let mut fields = proposal.fields.clone();
            Proposal::apply_field_values(&mut fields, &request.field_values, &config.editable_fields);
            let hooks = if config.validate_against_correction {
                vec![CommitHook::AutoResolveCorrections {
                    for_step: &task.node,
                }]
            } else {
                Vec::new()
            };
            Some(
                commit_version(
                    tx.as_mut(),
                    proposal.id,
                    fields,
                    &request.actor,
                    &task.node,
                    &hooks,
                )
                .await?,
            )
        } else {
            None
        };
        let resolving_version_id = committed.as_ref().map_or(latest.id, |v| v.id);

        // Completing the step this correction was addressed to consumes it
        // (clarifications answered in place, and the belt-and-braces pass
        // after the commit hook above).
        for correction in tx.active_corrections(proposal.id, Some(&task.node)).await? {
            tx.resolve_correction(correction.id, resolving_version_id)
                .await?;
        }

        // Raise the reviewer's corrections against the version they saw.
        let reviewed_version_id = request.expected_version.unwrap_or(latest.id);
        let mut raised = Vec::new();
        for correction_request in &requested_corrections {
            let correction = tx
                .insert_correction(NewCorrection {
                    proposal_id: proposal.id,
                    task_id: task.id,
                    for_step: correction_request.for_step.clone(),
                    reviewed_version_id,
                    messages: correction_request.messages.clone(),
                    author: request.actor.clone(),
                })
                .await?;
            info!(
                correction_id = correction.id,
                for_step = %correction.for_step,
                proposal_id = proposal.id,
                "correction raised"
            );
            raised.push(correction);
        }

        // NEW tasks are claimed by the submitting actor on the way through.
        let mut status = task.status;
        if status == TaskStatus::New {
            status = status.transition_to(TaskStatus::Assigned)?;
            tx.update_task_status(task.id, status, Some(request.actor.clone()))
                .await?;
        }
        let status = status.transition_to(TaskStatus::Done)?;
        let task = tx.update_task_status(task.id, status, None).await?;
        info!(
            task_id = task.id,
            node = %task.node,
            process_id = process.id,
            actor = %request.actor,
            "task completed"
        );

        let mut log = AdvanceLog::default();
        if let Some(flow) = &config.starts_subprocess {
            log.push_subflow(flow, proposal.id, &request.actor);
        }
        if let Some(kind) = &config.emits_signal {
            log.push_signal(proposal.id, kind);
        }

        self.run_node_queue(
            tx.as_mut(),
            &graph,
            &process,
            VecDeque::from([(*next, task.branch_id)]),
            &mut log,
        )
        .await?;
        self.drain_pending(tx.as_mut(), &mut log).await?;

        tx.commit().await?;
        let created_tasks = self.publish_log(&log);
        Ok(SubmissionOutcome {
            task,
            raised_corrections: raised,
            created_tasks,
            completed_processes: log.completed_processes.clone(),
        })
    }
}

/// Optimistic concurrency: a mutating submission must carry the version it
/// was read against, and that version must still be the latest.
fn check_version_token(
    request: &SubmissionRequest,
    requested_corrections: &[&CorrectionRequest],
    latest: &Version,
) -> Result<()> {
    let mutating = !request.field_values.is_empty() || !requested_corrections.is_empty();
    match request.expected_version {
        Some(presented) if presented != latest.id => Err(ProposalError::StaleVersion {
            presented,
            latest: latest.id,
        }),
        Some(_) => Ok(()),
        None if mutating => {
            let mut errors = ValidationErrors::new();
            errors.add(
                ALL_FIELDS,
                "submission must carry the version it was read against",
            );
            Err(errors.into())
        }
        None => Ok(()),
    }
}

/// A step may only raise corrections its node declares, and at most one
/// message map per target step per submission.
fn check_correction_targets(
    config: &ViewConfig,
    task: &Task,
    requested: &[&CorrectionRequest],
) -> Result<()> {
    let mut errors = ValidationErrors::new();
    let mut seen = BTreeSet::new();
    for correction in requested {
        if config.correction_spec_for(&correction.for_step).is_none() {
            errors.add(
                ALL_FIELDS,
                format!(
                    "step '{}' cannot raise a correction for '{}'",
                    task.node, correction.for_step
                ),
            );
        }
        if !seen.insert(correction.for_step.as_str()) {
            errors.add(
                ALL_FIELDS,
                format!(
                    "only one correction per target step per submission: '{}'",
                    correction.for_step
                ),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

/// The fix submission must change every field the active correction
/// names, relative to the version the correction was raised against; the
/// `__all__` sentinel requires at least one change.
fn validate_correction_addressed(
    config: &ViewConfig,
    proposal: &Proposal,
    submitted: &FieldMap,
    active: &Correction,
    reviewed: &Version,
) -> Result<()> {
    let mut candidate = proposal.fields.clone();
    Proposal::apply_field_values(&mut candidate, submitted, &config.editable_fields);
    let changed: BTreeSet<String> = Proposal::diff_fields(
        &candidate,
        &reviewed.snapshot,
        config.editable_fields.iter().copied(),
    )
    .into_keys()
    .collect();

    let mut errors = ValidationErrors::new();
    for field in active.required_fields() {
        if !changed.contains(field) {
            errors.add(field, "the field must be changed");
            if let Some(message) = active.messages.get(field) {
                errors.add(field, message.clone());
            }
        }
    }
    if active.requires_any_change() && changed.is_empty() {
        errors.add(ALL_FIELDS, "at least one field must be changed");
        if let Some(message) = active.messages.get(ALL_FIELDS) {
            errors.add(ALL_FIELDS, message.clone());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}
