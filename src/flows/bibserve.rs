//! BibServe account activation sub-process.
//!
//! Started for the owning proposal when the primary flow's
//! `add_bibserve_data` task completes. Activation is gated on the
//! `client_unblocked` signal emitted by the primary flow's
//! `unblock_client` step; `allow_skip` lets the wait pass immediately when
//! the client was already unblocked before this process reached it.

use super::steps::*;
use super::BIBSERVE_ACTIVATION;
use crate::constants::signals;
use crate::error::Result;
use crate::flow::{FlowGraph, GraphBuilder, ViewConfig};

pub fn flow() -> Result<FlowGraph> {
    GraphBuilder::new(BIBSERVE_ACTIVATION)
        .start(START, "Start", AWAIT_CLIENT_UNBLOCKED)
        .signal_wait(
            AWAIT_CLIENT_UNBLOCKED,
            "Await client unblock",
            signals::CLIENT_UNBLOCKED,
            true,
            ACTIVATE_BIBSERVE_ACCOUNT,
        )
        .view(
            ACTIVATE_BIBSERVE_ACCOUNT,
            "Activating BibServe account",
            END,
            ViewConfig::review(),
        )
        .end(END, "End")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::NodeKind;

    #[test]
    fn test_flow_builds_with_skippable_wait() {
        let graph = flow().unwrap();
        let node = graph.node_by_name(AWAIT_CLIENT_UNBLOCKED).unwrap();
        match &node.kind {
            NodeKind::ExternalSignal {
                kind, allow_skip, ..
            } => {
                assert_eq!(kind, signals::CLIENT_UNBLOCKED);
                assert!(*allow_skip);
            }
            other => panic!("expected signal wait, got {other:?}"),
        }
    }
}
