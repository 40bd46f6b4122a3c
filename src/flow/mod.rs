//! # Flow Graph
//!
//! Static, typed process graphs. A graph is built in two phases: node
//! specs are declared with symbolic name references (plain data, no live
//! object references), then [`builder::GraphBuilder::build`] resolves every
//! name against the finished node set and wires edges as arena indices.
//! Unresolved references, duplicate names, and arity violations are
//! rejected at build time rather than surfacing mid-traversal.
//!
//! Guard predicates are pure functions over a pre-read activation snapshot
//! ([`context::GuardContext`]), so evaluating them is deterministic and
//! side-effect-free and may be repeated on retry.

pub mod builder;
pub mod context;
pub mod graph;

pub use builder::GraphBuilder;
pub use context::{GuardContext, Predicate};
pub use graph::{
    CorrectionKind, CorrectionSpec, FlowGraph, FlowNode, NodeId, NodeKind, SplitBranch,
    SwitchCase, ViewConfig,
};
