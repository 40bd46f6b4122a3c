//! # Hard-coded Business Flows
//!
//! Exactly one process family: the client-registration proposal
//! confirmation flow plus its two dependent sub-processes (BibServe
//! account activation, paper-docs handling). Graphs are assembled with the
//! two-phase builder; a build failure here is a programming error and is
//! surfaced, never deferred to traversal time.

pub mod bibserve;
pub mod paper_docs;
pub mod proposal_confirmation;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ProposalError, Result};
use crate::flow::FlowGraph;

/// Registered flow names.
pub const PROPOSAL_CONFIRMATION: &str = "proposal_confirmation";
pub const BIBSERVE_ACTIVATION: &str = "bibserve_activation";
pub const PAPER_DOCS: &str = "paper_docs";

/// Symbolic step names, shared by flow definitions, correction targets and
/// tests.
pub mod steps {
    // proposal_confirmation
    pub const START: &str = "start";
    pub const APPROVE_BY_ACCOUNT_MANAGER: &str = "approve_by_account_manager";
    pub const CHECK_APPROVE_BY_ACCOUNT_MANAGER: &str = "check_approve_by_account_manager";
    pub const FIX_MISTAKES_AFTER_ACCOUNT_MANAGER: &str = "fix_mistakes_after_account_manager";
    pub const SPLIT_FLOW: &str = "split_flow";
    pub const APPROVE_BY_CREDIT_MANAGER: &str = "approve_by_credit_manager";
    pub const APPROVE_BY_REGION_CHIEF: &str = "approve_by_region_chief";
    pub const CHECK_APPROVE_BY_REGION_CHIEF: &str = "check_approve_by_region_chief";
    pub const GET_COMMENTS_FROM_LOGIST: &str = "get_comments_from_logist";
    pub const JOIN_CREDIT_MANAGER_AND_REGION_CHIEF: &str = "join_credit_manager_and_region_chief";
    pub const PROCESS_TO_END_OR_ACCOUNT_MANAGER: &str = "process_to_end_or_account_manager";
    pub const ADD_J_CODE_BY_ADV: &str = "add_j_code_by_adv";
    pub const SPLIT_FLOW_FOR_D_CODE_AND_BIBSERVE: &str =
        "split_flow_for_adding_d_code_and_bibserve_data";
    pub const ADD_D_CODE_BY_LOGIST: &str = "add_d_code_by_logist";
    pub const ADD_BIBSERVE_DATA: &str = "add_bibserve_data";
    pub const JOIN_D_CODE_AND_BIBSERVE: &str = "join_adding_d_code_and_bibserve_data";
    pub const SET_CREDIT_LIMIT: &str = "set_credit_limit";
    pub const APPROVE_PAPER_DOCS: &str = "approve_paper_docs";
    pub const CHECK_APPROVE_PAPER_DOCS: &str = "check_approve_paper_docs";
    pub const UNBLOCK_CLIENT: &str = "unblock_client";
    pub const ADD_ACS: &str = "add_acs";
    pub const END: &str = "end";

    // bibserve_activation
    pub const AWAIT_CLIENT_UNBLOCKED: &str = "await_client_unblocked";
    pub const ACTIVATE_BIBSERVE_ACCOUNT: &str = "activate_bibserve_account";

    // paper_docs
    pub const FILL_DELIVERY_DATA: &str = "fill_delivery_data";
    pub const CONFIRM_DELIVERY_DATA: &str = "confirm_delivery_data";
}

/// Name-indexed set of built flow graphs. Static configuration; the lock
/// only guards registration order at startup.
pub struct FlowRegistry {
    flows: RwLock<HashMap<String, Arc<FlowGraph>>>,
}

impl FlowRegistry {
    pub fn empty() -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the standard process family.
    pub fn standard() -> Result<Self> {
        let registry = Self::empty();
        registry.register(proposal_confirmation::flow()?);
        registry.register(bibserve::flow()?);
        registry.register(paper_docs::flow()?);
        Ok(registry)
    }

    pub fn register(&self, graph: FlowGraph) {
        self.flows
            .write()
            .insert(graph.name().to_string(), Arc::new(graph));
    }

    pub fn get(&self, name: &str) -> Result<Arc<FlowGraph>> {
        self.flows.read().get(name).cloned().ok_or_else(|| {
            ProposalError::GraphConfig(format!("unknown flow '{name}'"))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.flows.read().keys().cloned().collect()
    }
}
