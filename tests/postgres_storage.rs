//! PostgreSQL backend integration tests.
//!
//! These need a running PostgreSQL pointed to by `DATABASE_URL` and are
//! ignored by default:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/proposal_test cargo test -- --ignored
//! ```

mod common;

use std::collections::BTreeMap;

use common::{client_fields, CLIENT};

use proposal_core::models::{NewCorrection, NewProposal, NewVersion};
use proposal_core::storage::{PgStorage, Storage};
use proposal_core::ProposalError;

async fn pg() -> PgStorage {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let storage = PgStorage::connect(&url, 5).await.unwrap();
    storage.migrate().await.unwrap();
    storage
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_proposal_and_version_roundtrip() {
    let storage = pg().await;
    let mut tx = storage.begin().await.unwrap();

    let proposal = tx
        .insert_proposal(NewProposal {
            client: CLIENT.into(),
            fields: client_fields(false),
        })
        .await
        .unwrap();
    let version = tx
        .insert_version(NewVersion {
            proposal_id: proposal.id,
            author: CLIENT.into(),
            step: "start".into(),
            snapshot: proposal.fields.clone(),
        })
        .await
        .unwrap();

    let latest = tx.latest_version(proposal.id).await.unwrap().unwrap();
    assert_eq!(latest.id, version.id);
    assert_eq!(latest.snapshot, proposal.fields);

    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL"]
async fn test_partial_unique_index_rejects_second_active_correction() {
    let storage = pg().await;
    let mut tx = storage.begin().await.unwrap();

    let proposal = tx
        .insert_proposal(NewProposal {
            client: CLIENT.into(),
            fields: client_fields(false),
        })
        .await
        .unwrap();
    let version = tx
        .insert_version(NewVersion {
            proposal_id: proposal.id,
            author: CLIENT.into(),
            step: "start".into(),
            snapshot: proposal.fields.clone(),
        })
        .await
        .unwrap();
    let process = tx
        .insert_process(proposal_core::models::NewProcess {
            flow: "proposal_confirmation".into(),
            proposal_id: proposal.id,
        })
        .await
        .unwrap();
    let task = tx
        .insert_task(proposal_core::models::NewTask::new(
            process.id,
            "approve_by_account_manager",
        ))
        .await
        .unwrap();

    let raise = |author: &str| NewCorrection {
        proposal_id: proposal.id,
        task_id: task.id,
        for_step: "fix_mistakes_after_account_manager".into(),
        reviewed_version_id: version.id,
        messages: BTreeMap::from([("company_name".to_string(), "fix".to_string())]),
        author: author.into(),
    };

    let first = tx.insert_correction(raise("credit")).await.unwrap();
    assert!(first.is_active);
    let err = tx.insert_correction(raise("region")).await.unwrap_err();
    assert!(matches!(
        err,
        ProposalError::DuplicateActiveCorrection { .. }
    ));

    tx.rollback().await.unwrap();
}
