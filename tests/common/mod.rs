//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use proposal_core::events::EventPublisher;
use proposal_core::flows::{FlowRegistry, PROPOSAL_CONFIRMATION};
use proposal_core::models::{FieldMap, Task};
use proposal_core::orchestration::{ProcessEngine, StartOutcome, SubmissionRequest};
use proposal_core::storage::MemoryStorage;
use proposal_core::Result;

pub const CLIENT: &str = "client@acme.example";
pub const ACCOUNT_MANAGER: &str = "account.manager@corp.example";
pub const CREDIT_MANAGER: &str = "credit.manager@corp.example";
pub const REGION_CHIEF: &str = "region.chief@corp.example";
pub const LOGIST: &str = "logist@corp.example";
pub const ADV: &str = "adv@corp.example";
pub const SALES_ADMIN: &str = "sales.admin@corp.example";

pub fn engine() -> ProcessEngine {
    ProcessEngine::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(FlowRegistry::standard().unwrap()),
        EventPublisher::default(),
    )
}

pub fn engine_with_registry(registry: FlowRegistry) -> ProcessEngine {
    ProcessEngine::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(registry),
        EventPublisher::default(),
    )
}

/// Initial client form values for the registration proposal.
pub fn client_fields(needs_bibserve: bool) -> FieldMap {
    BTreeMap::from([
        ("country".to_string(), json!("Russia")),
        ("city".to_string(), json!("Moscow")),
        ("company_name".to_string(), json!("Acme LLC")),
        ("inn".to_string(), json!("7701234567")),
        ("bank_name".to_string(), json!("First Bank")),
        ("account_number".to_string(), json!("40702810900000000001")),
        (
            "is_needs_bibserve_account".to_string(),
            json!(needs_bibserve),
        ),
    ])
}

pub async fn start_confirmation(engine: &ProcessEngine, needs_bibserve: bool) -> StartOutcome {
    engine
        .start_process(
            PROPOSAL_CONFIRMATION,
            CLIENT.to_string(),
            client_fields(needs_bibserve),
        )
        .await
        .unwrap()
}

pub fn find_task<'a>(tasks: &'a [Task], node: &str) -> &'a Task {
    tasks
        .iter()
        .find(|t| t.node == node)
        .unwrap_or_else(|| panic!("no task for node '{node}' in {tasks:?}"))
}

pub fn maybe_task<'a>(tasks: &'a [Task], node: &str) -> Option<&'a Task> {
    tasks.iter().find(|t| t.node == node)
}

/// Complete a review task with no field changes and no corrections.
pub async fn approve(
    engine: &ProcessEngine,
    task: &Task,
    actor: &str,
    proposal_id: i64,
) -> Result<Vec<Task>> {
    let version = engine.latest_version(proposal_id).await?;
    let outcome = engine
        .submit(SubmissionRequest::approve(task.id, actor, version.id))
        .await?;
    Ok(outcome.created_tasks)
}

/// Complete a data-entry task, writing the given fields.
pub async fn submit_fields(
    engine: &ProcessEngine,
    task: &Task,
    actor: &str,
    proposal_id: i64,
    values: &[(&str, serde_json::Value)],
) -> Result<Vec<Task>> {
    let version = engine.latest_version(proposal_id).await?;
    let fields: FieldMap = values
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let outcome = engine
        .submit(SubmissionRequest::approve(task.id, actor, version.id).with_fields(fields))
        .await?;
    Ok(outcome.created_tasks)
}

/// Messages map for a single-field correction.
pub fn correction_messages(field: &str, message: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(field.to_string(), message.to_string())])
}
