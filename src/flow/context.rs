//! Activation snapshot consumed by guard predicates.
//!
//! The engine reads proposal state, active corrections, and undone tasks
//! once per advance, inside the surrounding transaction; predicates then
//! evaluate purely over that snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::Proposal;

/// Pure guard predicate over the activation snapshot.
pub type Predicate = Arc<dyn Fn(&GuardContext) -> bool + Send + Sync>;

/// Transactionally-consistent view of a process instance at the moment an
/// automatic node evaluates its outgoing edges.
#[derive(Debug, Clone)]
pub struct GuardContext {
    pub proposal: Proposal,
    /// Target steps of currently-active corrections on this proposal.
    pub active_correction_steps: Vec<String>,
    /// Nodes of this process that still have an undone (NEW or ASSIGNED) task.
    pub undone_task_nodes: HashSet<String>,
}

impl GuardContext {
    /// True if the proposal has any active correction, or — with
    /// `for_step` — one addressed to that specific step.
    pub fn has_active_correction(&self, for_step: Option<&str>) -> bool {
        match for_step {
            None => !self.active_correction_steps.is_empty(),
            Some(step) => self.active_correction_steps.iter().any(|s| s == step),
        }
    }

    /// True if an undone task already exists for the node.
    pub fn has_undone_task(&self, node: &str) -> bool {
        self.undone_task_nodes.contains(node)
    }
}

/// Convenience constructor for the common predicate shapes used by the
/// hard-coded flows.
pub mod predicates {
    use super::{GuardContext, Predicate};
    use std::sync::Arc;

    /// No active correction for any step.
    pub fn no_active_corrections() -> Predicate {
        Arc::new(|ctx: &GuardContext| !ctx.has_active_correction(None))
    }

    /// An active correction addressed to `step` exists.
    pub fn active_correction_for(step: &'static str) -> Predicate {
        Arc::new(move |ctx: &GuardContext| ctx.has_active_correction(Some(step)))
    }

    /// Either `step` has an active correction addressed to it, or nothing
    /// is outstanding at all. The guard shape for re-entrant split edges:
    /// on a clean (re-)approval pass every branch activates, on a
    /// clarification pass only the branches with work do.
    pub fn needs_branch(step: &'static str) -> Predicate {
        Arc::new(move |ctx: &GuardContext| {
            ctx.has_active_correction(Some(step)) || !ctx.has_active_correction(None)
        })
    }

    /// Boolean proposal field is set.
    pub fn proposal_flag(field: &'static str) -> Predicate {
        Arc::new(move |ctx: &GuardContext| ctx.proposal.field_bool(field))
    }
}
