//! End-to-end scenarios over the proposal confirmation flow on the
//! in-memory backend.

mod common;

use common::*;
use serde_json::json;

use proposal_core::constants::events;
use proposal_core::flows::{steps, PAPER_DOCS};
use proposal_core::orchestration::SubmissionRequest;
use proposal_core::{ProcessStatus, ProposalError, TaskStatus};

/// Clean approval with no corrections: the process walks through the
/// review split, provisioning, paper-docs approval and unblocking to
/// COMPLETED, with the join firing exactly once.
#[tokio::test]
async fn test_scenario_clean_approval_runs_to_completion() {
    let engine = engine();
    let mut events_rx = engine.publisher().subscribe();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    // Client submission parks on the account manager.
    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let created = approve(&engine, am_task, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();

    // Both review branches activate.
    let credit_task = find_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    let region_task = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();

    // First branch alone does not fire the join.
    let created = approve(&engine, &credit_task, CREDIT_MANAGER, proposal_id)
        .await
        .unwrap();
    assert!(created.is_empty());

    // Second branch arrives, join fires, back office takes over.
    let created = approve(&engine, &region_task, REGION_CHIEF, proposal_id)
        .await
        .unwrap();
    let j_code_task = find_task(&created, steps::ADD_J_CODE_BY_ADV).clone();

    let created = submit_fields(
        &engine,
        &j_code_task,
        ADV,
        proposal_id,
        &[("j_code", json!("J-001122"))],
    )
    .await
    .unwrap();

    // BibServe not requested: the guarded branch stays inactive, and the
    // paper-docs sub-process spawned its first task for the client.
    assert!(maybe_task(&created, steps::ADD_BIBSERVE_DATA).is_none());
    let d_code_task = find_task(&created, steps::ADD_D_CODE_BY_LOGIST).clone();
    let fill_docs_task = find_task(&created, steps::FILL_DELIVERY_DATA).clone();
    assert_eq!(fill_docs_task.owner.as_deref(), Some(CLIENT));

    // The lone activated branch satisfies the join on its own.
    let created = submit_fields(
        &engine,
        &d_code_task,
        LOGIST,
        proposal_id,
        &[("d_code", json!("D-556677"))],
    )
    .await
    .unwrap();
    let credit_limit_task = find_task(&created, steps::SET_CREDIT_LIMIT).clone();

    let created = submit_fields(
        &engine,
        &credit_limit_task,
        CREDIT_MANAGER,
        proposal_id,
        &[("credit_limit", json!("1000000"))],
    )
    .await
    .unwrap();
    let paper_task = find_task(&created, steps::APPROVE_PAPER_DOCS).clone();

    let created = approve(&engine, &paper_task, SALES_ADMIN, proposal_id)
        .await
        .unwrap();
    let unblock_task = find_task(&created, steps::UNBLOCK_CLIENT).clone();

    let created = approve(&engine, &unblock_task, ADV, proposal_id)
        .await
        .unwrap();
    let acs_task = find_task(&created, steps::ADD_ACS).clone();

    let version = engine.latest_version(proposal_id).await.unwrap();
    let outcome = engine
        .submit(
            SubmissionRequest::approve(acs_task.id, ADV, version.id).with_fields(
                [
                    ("acs_name".to_string(), json!("Anna Petrova")),
                    ("acs_email".to_string(), json!("anna@corp.example")),
                ]
                .into(),
            ),
        )
        .await
        .unwrap();

    assert_eq!(outcome.completed_processes.len(), 1);
    let process = engine.get_process(start.process.id).await.unwrap();
    assert_eq!(process.status, ProcessStatus::Completed);
    assert!(process.finished_at.is_some());
    assert!(engine
        .active_corrections(proposal_id, None)
        .await
        .unwrap()
        .is_empty());

    // The join fired exactly once per split.
    for join in [
        steps::JOIN_CREDIT_MANAGER_AND_REGION_CHIEF,
        steps::JOIN_D_CODE_AND_BIBSERVE,
    ] {
        let join_tasks = engine
            .tasks_for(process.id, Some(join), None)
            .await
            .unwrap();
        assert_eq!(join_tasks.len(), 1, "join '{join}' should fire once");
        assert_eq!(join_tasks[0].status, TaskStatus::Done);
    }

    // Lifecycle events went out for the first activation and completion.
    let first = events_rx.recv().await.unwrap();
    assert_eq!(first.name, events::TASK_CREATED);
    assert_eq!(
        first.context["node"],
        json!(steps::APPROVE_BY_ACCOUNT_MANAGER)
    );
    let mut saw_completion = false;
    while let Ok(event) = events_rx.try_recv() {
        if event.name == events::PROCESS_COMPLETED
            && event.context["process_id"] == json!(process.id)
        {
            saw_completion = true;
        }
    }
    assert!(saw_completion);
}

/// Correction loop: a blocking correction routes to the client's fix step
/// instead of the split; an unchanged resubmit is rejected with per-field
/// messages and keeps the correction active; a real fix auto-resolves it
/// and routes back to the account manager.
#[tokio::test]
async fn test_scenario_correction_loop() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let version = engine.latest_version(proposal_id).await.unwrap();
    let outcome = engine
        .submit(
            SubmissionRequest::approve(am_task.id, ACCOUNT_MANAGER, version.id).with_correction(
                steps::FIX_MISTAKES_AFTER_ACCOUNT_MANAGER,
                correction_messages("company_name", "use the registered legal name"),
            ),
        )
        .await
        .unwrap();

    // Routed to the fix step, not the split; auto-assigned to the client.
    assert!(maybe_task(&outcome.created_tasks, steps::APPROVE_BY_CREDIT_MANAGER).is_none());
    let fix_task = find_task(&outcome.created_tasks, steps::FIX_MISTAKES_AFTER_ACCOUNT_MANAGER);
    assert_eq!(fix_task.status, TaskStatus::Assigned);
    assert_eq!(fix_task.owner.as_deref(), Some(CLIENT));

    // Resubmitting the same value does not address the correction.
    let version = engine.latest_version(proposal_id).await.unwrap();
    let err = engine
        .submit(
            SubmissionRequest::approve(fix_task.id, CLIENT, version.id)
                .with_fields([("company_name".to_string(), json!("Acme LLC"))].into()),
        )
        .await
        .unwrap_err();
    match err {
        ProposalError::Validation(errors) => {
            assert!(!errors.messages_for("company_name").is_empty());
        }
        other => panic!("expected validation error, got {other}"),
    }
    assert_eq!(
        engine
            .active_corrections(proposal_id, None)
            .await
            .unwrap()
            .len(),
        1
    );

    // A real change resolves the correction and loops back to the
    // account manager with a fresh task.
    let outcome = engine
        .submit(
            SubmissionRequest::approve(fix_task.id, CLIENT, version.id)
                .with_fields([("company_name".to_string(), json!("Acme Holding LLC"))].into()),
        )
        .await
        .unwrap();

    assert!(engine
        .active_corrections(proposal_id, None)
        .await
        .unwrap()
        .is_empty());
    let new_am_task = find_task(&outcome.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    assert_ne!(new_am_task.id, am_task.id, "a revisit creates a fresh task");

    // The resolved correction records the fixing version.
    let latest = engine.latest_version(proposal_id).await.unwrap();
    assert_eq!(latest.snapshot["company_name"], json!("Acme Holding LLC"));
}

/// A clarification addressed to one branch reviewer re-activates only
/// that branch; the join's arity follows the evaluated guards.
#[tokio::test]
async fn test_scenario_single_branch_clarification() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let version = engine.latest_version(proposal_id).await.unwrap();
    let outcome = engine
        .submit(
            SubmissionRequest::approve(am_task.id, ACCOUNT_MANAGER, version.id).with_correction(
                steps::APPROVE_BY_CREDIT_MANAGER,
                correction_messages("account_number", "is this settlement account confirmed?"),
            ),
        )
        .await
        .unwrap();

    // Only the credit branch has work.
    let credit_task = find_task(&outcome.created_tasks, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    assert!(maybe_task(&outcome.created_tasks, steps::APPROVE_BY_REGION_CHIEF).is_none());

    // Answering consumes the clarification; the single-token join fires
    // and the process moves on to provisioning.
    let created = approve(&engine, &credit_task, CREDIT_MANAGER, proposal_id)
        .await
        .unwrap();
    assert!(maybe_task(&created, steps::ADD_J_CODE_BY_ADV).is_some());
    assert!(engine
        .active_corrections(proposal_id, None)
        .await
        .unwrap()
        .is_empty());
}

/// The region chief pulls in the logist; the comment loop stays inside
/// the region branch and the join still fires exactly once.
#[tokio::test]
async fn test_scenario_logist_comment_loop() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let created = approve(&engine, am_task, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();
    let credit_task = find_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    let region_task = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();

    let created = approve(&engine, &credit_task, CREDIT_MANAGER, proposal_id)
        .await
        .unwrap();
    assert!(created.is_empty());

    // Region chief asks the logist instead of approving.
    let version = engine.latest_version(proposal_id).await.unwrap();
    let outcome = engine
        .submit(
            SubmissionRequest::approve(region_task.id, REGION_CHIEF, version.id).with_correction(
                steps::GET_COMMENTS_FROM_LOGIST,
                correction_messages("city", "which warehouse serves this city?"),
            ),
        )
        .await
        .unwrap();
    let logist_task = find_task(&outcome.created_tasks, steps::GET_COMMENTS_FROM_LOGIST).clone();

    // The logist answers; the region chief gets a fresh approval task.
    let created = approve(&engine, &logist_task, LOGIST, proposal_id)
        .await
        .unwrap();
    let region_again = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();
    assert_ne!(region_again.id, region_task.id);

    // Now the region chief approves and the join fires.
    let created = approve(&engine, &region_again, REGION_CHIEF, proposal_id)
        .await
        .unwrap();
    assert!(maybe_task(&created, steps::ADD_J_CODE_BY_ADV).is_some());

    let join_tasks = engine
        .tasks_for(
            start.process.id,
            Some(steps::JOIN_CREDIT_MANAGER_AND_REGION_CHIEF),
            None,
        )
        .await
        .unwrap();
    assert_eq!(join_tasks.len(), 1);
}

/// A reviewer correction raised from inside the split loops the whole
/// review back to the account manager after the join.
#[tokio::test]
async fn test_scenario_reviewer_correction_loops_to_account_manager() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let created = approve(&engine, am_task, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();
    let credit_task = find_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    let region_task = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();

    // Credit manager blocks the account manager's step.
    let version = engine.latest_version(proposal_id).await.unwrap();
    let outcome = engine
        .submit(
            SubmissionRequest::approve(credit_task.id, CREDIT_MANAGER, version.id)
                .with_correction(
                    steps::APPROVE_BY_ACCOUNT_MANAGER,
                    correction_messages("bank_name", "bank fails the sanctions screen"),
                ),
        )
        .await
        .unwrap();
    assert!(outcome.created_tasks.is_empty(), "join still waiting");

    // Region chief approves cleanly; join fires; the If routes back to
    // the account manager because a correction is outstanding.
    let created = approve(&engine, &region_task, REGION_CHIEF, proposal_id)
        .await
        .unwrap();
    let am_again = find_task(&created, steps::APPROVE_BY_ACCOUNT_MANAGER);
    assert_ne!(am_again.id, am_task.id);
    assert!(maybe_task(&created, steps::ADD_J_CODE_BY_ADV).is_none());

    // Completing the account manager's step consumes the correction
    // addressed to it.
    let created = approve(&engine, am_again, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();
    assert!(engine
        .active_corrections(proposal_id, None)
        .await
        .unwrap()
        .is_empty());
    // Clean pass: both branches re-activate with fresh tasks.
    assert!(maybe_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).is_some());
    assert!(maybe_task(&created, steps::APPROVE_BY_REGION_CHIEF).is_some());
}

/// The paper-docs sub-process runs independently of the primary flow.
#[tokio::test]
async fn test_scenario_paper_docs_subprocess_completes() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let created = approve(&engine, am_task, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();
    let credit_task = find_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    let region_task = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();
    approve(&engine, &credit_task, CREDIT_MANAGER, proposal_id)
        .await
        .unwrap();
    let created = approve(&engine, &region_task, REGION_CHIEF, proposal_id)
        .await
        .unwrap();
    let j_code_task = find_task(&created, steps::ADD_J_CODE_BY_ADV).clone();
    let created = submit_fields(
        &engine,
        &j_code_task,
        ADV,
        proposal_id,
        &[("j_code", json!("J-1"))],
    )
    .await
    .unwrap();

    let fill_task = find_task(&created, steps::FILL_DELIVERY_DATA).clone();
    let paper_process_id = fill_task.process_id;
    assert_ne!(paper_process_id, start.process.id);
    let paper_process = engine.get_process(paper_process_id).await.unwrap();
    assert_eq!(paper_process.flow, PAPER_DOCS);

    let created = submit_fields(
        &engine,
        &fill_task,
        CLIENT,
        proposal_id,
        &[
            ("delivery_address", json!("Warehouse 4, Industrial Lane 9")),
            ("delivery_city", json!("Moscow")),
        ],
    )
    .await
    .unwrap();
    let confirm_task = find_task(&created, steps::CONFIRM_DELIVERY_DATA).clone();
    approve(&engine, &confirm_task, LOGIST, proposal_id)
        .await
        .unwrap();

    let paper_process = engine.get_process(paper_process_id).await.unwrap();
    assert_eq!(paper_process.status, ProcessStatus::Completed);
}
