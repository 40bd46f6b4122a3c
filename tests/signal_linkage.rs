//! Cross-process linkage: the BibServe activation sub-process and its
//! external unblock signal.

mod common;

use common::*;
use serde_json::json;

use proposal_core::constants::signals;
use proposal_core::flows::{steps, BIBSERVE_ACTIVATION};
use proposal_core::models::Task;
use proposal_core::orchestration::ProcessEngine;
use proposal_core::{ProcessStatus, TaskStatus};

/// Walk the primary flow (with BibServe requested) up to the point where
/// both codes are being added. Returns (proposal_id, d-code task,
/// bibserve-data task).
async fn walk_to_provisioning(engine: &ProcessEngine) -> (i64, Task, Task) {
    let start = start_confirmation(engine, true).await;
    let proposal_id = start.proposal.id;

    let am_task = find_task(&start.created_tasks, steps::APPROVE_BY_ACCOUNT_MANAGER);
    let created = approve(engine, am_task, ACCOUNT_MANAGER, proposal_id)
        .await
        .unwrap();
    let credit_task = find_task(&created, steps::APPROVE_BY_CREDIT_MANAGER).clone();
    let region_task = find_task(&created, steps::APPROVE_BY_REGION_CHIEF).clone();
    approve(engine, &credit_task, CREDIT_MANAGER, proposal_id)
        .await
        .unwrap();
    let created = approve(engine, &region_task, REGION_CHIEF, proposal_id)
        .await
        .unwrap();
    let j_code_task = find_task(&created, steps::ADD_J_CODE_BY_ADV).clone();
    let created = submit_fields(
        engine,
        &j_code_task,
        ADV,
        proposal_id,
        &[("j_code", json!("J-1"))],
    )
    .await
    .unwrap();

    let d_code_task = find_task(&created, steps::ADD_D_CODE_BY_LOGIST).clone();
    let bibserve_task = find_task(&created, steps::ADD_BIBSERVE_DATA).clone();
    (proposal_id, d_code_task, bibserve_task)
}

/// Completing `add_bibserve_data` starts the activation sub-process,
/// which parks on the unblock signal until the primary flow's
/// `unblock_client` emits it.
#[tokio::test]
async fn test_bibserve_subprocess_waits_for_unblock_signal() {
    let engine = engine();
    let (proposal_id, d_code_task, bibserve_task) = walk_to_provisioning(&engine).await;

    let created = submit_fields(
        &engine,
        &bibserve_task,
        ADV,
        proposal_id,
        &[
            ("bibserve_login", json!("acme-bib")),
            ("bibserve_email", json!("bib@acme.example")),
        ],
    )
    .await
    .unwrap();

    // The sub-process exists and is parked on the signal wait.
    let wait_task = find_task(&created, steps::AWAIT_CLIENT_UNBLOCKED).clone();
    let bibserve_process = engine.get_process(wait_task.process_id).await.unwrap();
    assert_eq!(bibserve_process.flow, BIBSERVE_ACTIVATION);
    assert_eq!(wait_task.status, TaskStatus::New);

    // Finish provisioning on the primary flow.
    let created = submit_fields(
        &engine,
        &d_code_task,
        LOGIST,
        proposal_id,
        &[("d_code", json!("D-1"))],
    )
    .await
    .unwrap();
    let credit_limit_task = find_task(&created, steps::SET_CREDIT_LIMIT).clone();
    let created = submit_fields(
        &engine,
        &credit_limit_task,
        CREDIT_MANAGER,
        proposal_id,
        &[("credit_limit", json!("500000"))],
    )
    .await
    .unwrap();
    let paper_task = find_task(&created, steps::APPROVE_PAPER_DOCS).clone();
    let created = approve(&engine, &paper_task, SALES_ADMIN, proposal_id)
        .await
        .unwrap();
    let unblock_task = find_task(&created, steps::UNBLOCK_CLIENT).clone();

    // Unblocking emits the signal inside the same submission: the parked
    // wait completes and the activation task appears.
    let created = approve(&engine, &unblock_task, ADV, proposal_id)
        .await
        .unwrap();
    let activate_task = find_task(&created, steps::ACTIVATE_BIBSERVE_ACCOUNT).clone();
    assert_eq!(activate_task.process_id, bibserve_process.id);

    let wait_task = engine.get_task(wait_task.id).await.unwrap();
    assert_eq!(wait_task.status, TaskStatus::Done);

    // Activating closes the sub-process.
    approve(&engine, &activate_task, ADV, proposal_id)
        .await
        .unwrap();
    let bibserve_process = engine.get_process(bibserve_process.id).await.unwrap();
    assert_eq!(bibserve_process.status, ProcessStatus::Completed);
}

/// `allow_skip`: when the signal is already on record before the wait
/// node activates, the sub-process passes straight through to activation.
#[tokio::test]
async fn test_signal_already_observed_skips_the_wait() {
    let engine = engine();
    let (proposal_id, _d_code_task, bibserve_task) = walk_to_provisioning(&engine).await;

    // The client was unblocked out-of-band before the account data was
    // even recorded.
    engine
        .deliver_signal(proposal_id, signals::CLIENT_UNBLOCKED)
        .await
        .unwrap();

    let created = submit_fields(
        &engine,
        &bibserve_task,
        ADV,
        proposal_id,
        &[("bibserve_login", json!("acme-bib"))],
    )
    .await
    .unwrap();

    assert!(maybe_task(&created, steps::AWAIT_CLIENT_UNBLOCKED).is_none());
    let activate_task = find_task(&created, steps::ACTIVATE_BIBSERVE_ACCOUNT);

    // The skipped wait still left its DONE task in the activation history.
    let wait_tasks = engine
        .tasks_for(
            activate_task.process_id,
            Some(steps::AWAIT_CLIENT_UNBLOCKED),
            None,
        )
        .await
        .unwrap();
    assert_eq!(wait_tasks.len(), 1);
    assert_eq!(wait_tasks[0].status, TaskStatus::Done);
}

/// Delivering a signal nobody waits on is recorded and harmless.
#[tokio::test]
async fn test_signal_without_waiters_is_recorded() {
    let engine = engine();
    let start = start_confirmation(&engine, false).await;
    let created = engine
        .deliver_signal(start.proposal.id, signals::CLIENT_UNBLOCKED)
        .await
        .unwrap();
    assert!(created.is_empty());
}
