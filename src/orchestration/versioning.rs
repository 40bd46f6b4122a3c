//! Version commit operation and its transactional hooks.
//!
//! Every proposal mutation funnels through [`commit_version`]: the field
//! write and the snapshot insert happen in the caller's transaction, and
//! the supplied hooks run synchronously inside it. Correction
//! auto-resolution is a hook here, not a subscriber on an event bus, so a
//! rolled-back commit never leaves a half-resolved ledger.

use tracing::debug;

use crate::error::Result;
use crate::models::{FieldMap, NewVersion, UserId, Version};
use crate::storage::StorageTx;

/// Side effects invoked inside the commit transaction, in order.
#[derive(Debug, Clone)]
pub enum CommitHook<'a> {
    /// Resolve every active correction addressed to `for_step`, recording
    /// the just-committed version as the fix. The standard hook for the
    /// client's fix-mistakes step.
    AutoResolveCorrections { for_step: &'a str },
}

/// Write the new field state and its immutable snapshot, then run hooks.
/// The snapshot is taken from the updated record, so the proposal's
/// current values and the latest version coincide at commit.
pub async fn commit_version(
    tx: &mut dyn StorageTx,
    proposal_id: i64,
    fields: FieldMap,
    author: &UserId,
    step: &str,
    hooks: &[CommitHook<'_>],
) -> Result<Version> {
    let proposal = tx.update_proposal_fields(proposal_id, fields).await?;
    let version = tx
        .insert_version(NewVersion {
            proposal_id: proposal.id,
            author: author.clone(),
            step: step.to_string(),
            snapshot: proposal.fields.clone(),
        })
        .await?;

    for hook in hooks {
        match hook {
            CommitHook::AutoResolveCorrections { for_step } => {
                let corrections = tx.active_corrections(proposal_id, Some(for_step)).await?;
                for correction in corrections {
                    debug!(
                        correction_id = correction.id,
                        for_step,
                        fixed_in_version = version.id,
                        "auto-resolving correction on version commit"
                    );
                    tx.resolve_correction(correction.id, version.id).await?;
                }
            }
        }
    }

    Ok(version)
}

/// The version the most recent correction for `for_step` was raised
/// against; the baseline a fix submission is diffed from.
pub async fn last_reviewed_version(
    tx: &mut dyn StorageTx,
    proposal_id: i64,
    for_step: &str,
) -> Result<Option<Version>> {
    match tx.latest_correction(proposal_id, for_step).await? {
        Some(correction) => Ok(Some(tx.get_version(correction.reviewed_version_id).await?)),
        None => Ok(None),
    }
}
