//! The primary proposal confirmation flow.
//!
//! A client-submitted registration proposal is reviewed by the account
//! manager, then in parallel by the credit manager and the regional chief
//! (who may pull in the logist for comments), then provisioned by the
//! back office (J-code, D-code, optional BibServe data, credit limit),
//! checked against the paper documents by the sales admin, unblocked, and
//! finished with ACS attachment.
//!
//! Reviewers gate progress with corrections: a blocking field correction
//! routes the process back to the client's fix-mistakes step, while
//! clarifications addressed to another reviewer route only the affected
//! branch. Split edges carry guards so a re-entry pass activates exactly
//! the branches with outstanding work, and the join's arity follows the
//! guards evaluated on that pass.

use super::steps::*;
use super::PROPOSAL_CONFIRMATION;
use crate::constants::{fields, signals};
use crate::error::Result;
use crate::flow::context::predicates::{
    active_correction_for, needs_branch, no_active_corrections, proposal_flag,
};
use crate::flow::{CorrectionKind, FlowGraph, GraphBuilder, ViewConfig};

pub fn flow() -> Result<FlowGraph> {
    GraphBuilder::new(PROPOSAL_CONFIRMATION)
        .start(START, "Start", APPROVE_BY_ACCOUNT_MANAGER)
        .view(
            APPROVE_BY_ACCOUNT_MANAGER,
            "Approve by account manager",
            CHECK_APPROVE_BY_ACCOUNT_MANAGER,
            ViewConfig::review()
                .with_correction(
                    FIX_MISTAKES_AFTER_ACCOUNT_MANAGER,
                    CorrectionKind::Correction,
                    false,
                )
                .with_correction(
                    APPROVE_BY_CREDIT_MANAGER,
                    CorrectionKind::Clarification,
                    true,
                )
                .with_correction(APPROVE_BY_REGION_CHIEF, CorrectionKind::Clarification, true)
                .with_correction(APPROVE_PAPER_DOCS, CorrectionKind::Clarification, true),
        )
        .switch(
            CHECK_APPROVE_BY_ACCOUNT_MANAGER,
            "Check approve by account manager",
            vec![
                (no_active_corrections(), SPLIT_FLOW),
                (
                    active_correction_for(FIX_MISTAKES_AFTER_ACCOUNT_MANAGER),
                    FIX_MISTAKES_AFTER_ACCOUNT_MANAGER,
                ),
                (active_correction_for(APPROVE_BY_CREDIT_MANAGER), SPLIT_FLOW),
                (active_correction_for(APPROVE_BY_REGION_CHIEF), SPLIT_FLOW),
                (active_correction_for(APPROVE_PAPER_DOCS), APPROVE_PAPER_DOCS),
            ],
            None,
        )
        .view(
            FIX_MISTAKES_AFTER_ACCOUNT_MANAGER,
            "Fix mistakes after account manager",
            APPROVE_BY_ACCOUNT_MANAGER,
            ViewConfig::editable(&[
                fields::COUNTRY,
                fields::CITY,
                fields::COMPANY_NAME,
                fields::INN,
                fields::BANK_NAME,
                fields::ACCOUNT_NUMBER,
            ])
            .validating_corrections()
            .assigned_to_client(),
        )
        .split(
            SPLIT_FLOW,
            "Split flow",
            vec![
                (
                    APPROVE_BY_CREDIT_MANAGER,
                    Some(needs_branch(APPROVE_BY_CREDIT_MANAGER)),
                ),
                (
                    APPROVE_BY_REGION_CHIEF,
                    Some(needs_branch(APPROVE_BY_REGION_CHIEF)),
                ),
            ],
        )
        .view(
            APPROVE_BY_CREDIT_MANAGER,
            "Approve by credit manager",
            JOIN_CREDIT_MANAGER_AND_REGION_CHIEF,
            ViewConfig::review().with_correction(
                APPROVE_BY_ACCOUNT_MANAGER,
                CorrectionKind::Correction,
                false,
            ),
        )
        .view(
            APPROVE_BY_REGION_CHIEF,
            "Approve by region chief",
            CHECK_APPROVE_BY_REGION_CHIEF,
            ViewConfig::review()
                .with_correction(
                    APPROVE_BY_ACCOUNT_MANAGER,
                    CorrectionKind::Correction,
                    false,
                )
                .with_correction(GET_COMMENTS_FROM_LOGIST, CorrectionKind::Clarification, false),
        )
        .switch(
            CHECK_APPROVE_BY_REGION_CHIEF,
            "Check approve by region chief",
            vec![(
                active_correction_for(GET_COMMENTS_FROM_LOGIST),
                GET_COMMENTS_FROM_LOGIST,
            )],
            Some(JOIN_CREDIT_MANAGER_AND_REGION_CHIEF),
        )
        .view(
            GET_COMMENTS_FROM_LOGIST,
            "Get comments from logist",
            APPROVE_BY_REGION_CHIEF,
            ViewConfig::review().with_correction(
                APPROVE_BY_REGION_CHIEF,
                CorrectionKind::Clarification,
                true,
            ),
        )
        .join(
            JOIN_CREDIT_MANAGER_AND_REGION_CHIEF,
            "Join credit manager and region chief",
            SPLIT_FLOW,
            PROCESS_TO_END_OR_ACCOUNT_MANAGER,
        )
        .cond(
            PROCESS_TO_END_OR_ACCOUNT_MANAGER,
            "Process to end or account manager",
            no_active_corrections(),
            ADD_J_CODE_BY_ADV,
            APPROVE_BY_ACCOUNT_MANAGER,
        )
        .view(
            ADD_J_CODE_BY_ADV,
            "Add J-code by ADV",
            SPLIT_FLOW_FOR_D_CODE_AND_BIBSERVE,
            ViewConfig::editable(&[fields::J_CODE]).starting_subprocess(super::PAPER_DOCS),
        )
        .split(
            SPLIT_FLOW_FOR_D_CODE_AND_BIBSERVE,
            "Split flow for ADV and BibServe admin",
            vec![
                (ADD_D_CODE_BY_LOGIST, None),
                (
                    ADD_BIBSERVE_DATA,
                    Some(proposal_flag(fields::IS_NEEDS_BIBSERVE_ACCOUNT)),
                ),
            ],
        )
        .view(
            ADD_D_CODE_BY_LOGIST,
            "Add D-code by logist",
            JOIN_D_CODE_AND_BIBSERVE,
            ViewConfig::editable(&[fields::D_CODE]),
        )
        .view(
            ADD_BIBSERVE_DATA,
            "Add BibServe data",
            JOIN_D_CODE_AND_BIBSERVE,
            ViewConfig::editable(&[fields::BIBSERVE_LOGIN, fields::BIBSERVE_EMAIL])
                .starting_subprocess(super::BIBSERVE_ACTIVATION),
        )
        .join(
            JOIN_D_CODE_AND_BIBSERVE,
            "Join after adding D-code and conditionally adding BibServe data",
            SPLIT_FLOW_FOR_D_CODE_AND_BIBSERVE,
            SET_CREDIT_LIMIT,
        )
        .view(
            SET_CREDIT_LIMIT,
            "Set credit limit",
            APPROVE_PAPER_DOCS,
            ViewConfig::editable(&[fields::CREDIT_LIMIT]),
        )
        .view(
            APPROVE_PAPER_DOCS,
            "Approve paper docs",
            CHECK_APPROVE_PAPER_DOCS,
            ViewConfig::review().with_correction(
                APPROVE_BY_ACCOUNT_MANAGER,
                CorrectionKind::Correction,
                false,
            ),
        )
        .cond(
            CHECK_APPROVE_PAPER_DOCS,
            "Check approve paper docs",
            no_active_corrections(),
            UNBLOCK_CLIENT,
            APPROVE_BY_ACCOUNT_MANAGER,
        )
        .view(
            UNBLOCK_CLIENT,
            "Unblock client by ADV",
            ADD_ACS,
            ViewConfig::review().emitting_signal(signals::CLIENT_UNBLOCKED),
        )
        .view(ADD_ACS, "Adding ACS", END, ViewConfig::editable(&[
            fields::ACS_NAME,
            fields::ACS_EMAIL,
        ]))
        .end(END, "End")
        .build()
}
