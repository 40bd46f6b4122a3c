//! Paper-docs sub-process.
//!
//! Started for the owning proposal when the primary flow's
//! `add_j_code_by_adv` task completes. The client records delivery and
//! warehouse data; the logist confirms it. The primary flow's
//! `approve_paper_docs` review runs against the data collected here.

use super::steps::*;
use super::PAPER_DOCS;
use crate::constants::fields;
use crate::error::Result;
use crate::flow::{FlowGraph, GraphBuilder, ViewConfig};

pub fn flow() -> Result<FlowGraph> {
    GraphBuilder::new(PAPER_DOCS)
        .start(START, "Start", FILL_DELIVERY_DATA)
        .view(
            FILL_DELIVERY_DATA,
            "Fill delivery data",
            CONFIRM_DELIVERY_DATA,
            ViewConfig::editable(&[
                fields::DELIVERY_ADDRESS,
                fields::DELIVERY_CITY,
                fields::DELIVERY_CONTACT,
                fields::WAREHOUSE_CONSIGNEE_CODE,
                fields::WAREHOUSE_WORKING_HOURS,
            ])
            .assigned_to_client(),
        )
        .view(
            CONFIRM_DELIVERY_DATA,
            "Confirm delivery data by logist",
            END,
            ViewConfig::review(),
        )
        .end(END, "End")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_builds() {
        let graph = flow().unwrap();
        assert_eq!(graph.len(), 4);
        assert!(graph.node_by_name(FILL_DELIVERY_DATA).is_some());
    }
}
