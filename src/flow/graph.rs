//! Resolved flow graph: an arena of typed nodes wired by index.

use std::collections::HashMap;
use std::fmt;

use super::context::Predicate;

/// Index of a node in its graph's arena. Edges hold these instead of live
/// references, so cyclic graphs need no construction-time back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A fully resolved flow graph. Static configuration shared by every
/// process instance of the flow; never mutated after build.
pub struct FlowGraph {
    name: String,
    nodes: Vec<FlowNode>,
    by_name: HashMap<String, NodeId>,
    start: NodeId,
}

pub struct FlowNode {
    pub name: String,
    pub description: String,
    pub kind: NodeKind,
}

pub enum NodeKind {
    /// Single outgoing edge, always taken; the only node type that may
    /// create the process instance itself.
    Start { next: NodeId },
    /// Human task. One outgoing edge, taken automatically once the bound
    /// task completes; where record mutation and correction issuance and
    /// consumption happen.
    View { next: NodeId, config: ViewConfig },
    /// Two mutually exclusive edges selected by one boolean predicate.
    If {
        predicate: Predicate,
        then_next: NodeId,
        else_next: NodeId,
    },
    /// Ordered cases evaluated top-to-bottom, first match wins; missing
    /// match with no default is a loud failure, never a silent no-op.
    Switch {
        cases: Vec<SwitchCase>,
        default: Option<NodeId>,
    },
    /// Fires each outgoing edge whose guard holds; unguarded edges always
    /// activate. Each activated edge spawns an independent task line.
    Split { branches: Vec<SplitBranch> },
    /// AND-join over the branch tokens minted by the paired Split. Fires
    /// its single outgoing edge exactly once.
    Join { split: NodeId, next: NodeId },
    /// Blocks until a signal of `kind` is observed for the owning
    /// proposal. With `allow_skip`, a signal already on record lets the
    /// engine pass through without parking a task.
    ExternalSignal {
        kind: String,
        allow_skip: bool,
        next: NodeId,
    },
    /// Terminal; marks the process instance completed.
    End,
}

pub struct SwitchCase {
    pub predicate: Predicate,
    pub target: NodeId,
}

pub struct SplitBranch {
    pub target: NodeId,
    pub guard: Option<Predicate>,
}

/// Behavior configuration for a View node.
#[derive(Clone, Default)]
pub struct ViewConfig {
    /// Fields the submission may write. Empty for review-only steps.
    pub editable_fields: Vec<&'static str>,
    /// Correction targets a reviewer on this step may raise.
    pub correction_specs: Vec<CorrectionSpec>,
    /// Enforce the changed-fields rule against the active correction
    /// addressed to this step (the client fix-mistakes shape).
    pub validate_against_correction: bool,
    /// Auto-assign the activated task to the proposal's client.
    pub assign_to_client: bool,
    /// Flow to start (for the same proposal) when this task completes.
    pub starts_subprocess: Option<String>,
    /// Signal recorded for the proposal when this task completes.
    pub emits_signal: Option<String>,
}

impl ViewConfig {
    /// Review-only step: no field writes.
    pub fn review() -> Self {
        Self::default()
    }

    /// Step that writes the given fields.
    pub fn editable(fields: &[&'static str]) -> Self {
        Self {
            editable_fields: fields.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_correction(
        mut self,
        for_step: impl Into<String>,
        kind: CorrectionKind,
        answer_only: bool,
    ) -> Self {
        self.correction_specs.push(CorrectionSpec {
            for_step: for_step.into(),
            kind,
            answer_only,
        });
        self
    }

    pub fn validating_corrections(mut self) -> Self {
        self.validate_against_correction = true;
        self
    }

    pub fn assigned_to_client(mut self) -> Self {
        self.assign_to_client = true;
        self
    }

    pub fn starting_subprocess(mut self, flow: impl Into<String>) -> Self {
        self.starts_subprocess = Some(flow.into());
        self
    }

    pub fn emitting_signal(mut self, kind: impl Into<String>) -> Self {
        self.emits_signal = Some(kind.into());
        self
    }

    /// Correction spec addressed to `step`, if this view may raise one.
    pub fn correction_spec_for(&self, step: &str) -> Option<&CorrectionSpec> {
        self.correction_specs.iter().find(|s| s.for_step == step)
    }
}

#[derive(Debug, Clone)]
pub struct CorrectionSpec {
    /// Step the correction is addressed to.
    pub for_step: String,
    pub kind: CorrectionKind,
    /// Clarification the target step answers in place, as opposed to a
    /// blocking field correction the client must act on.
    pub answer_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionKind {
    /// Blocking request for field changes.
    Correction,
    /// Question or comment for another reviewer.
    Clarification,
}

impl FlowGraph {
    pub(super) fn new(
        name: String,
        nodes: Vec<FlowNode>,
        by_name: HashMap<String, NodeId>,
        start: NodeId,
    ) -> Self {
        Self {
            name,
            nodes,
            by_name,
            start,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&FlowNode> {
        self.node_id(name).map(|id| self.node(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter()
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start { .. } => write!(f, "Start"),
            Self::View { .. } => write!(f, "View"),
            Self::If { .. } => write!(f, "If"),
            Self::Switch { .. } => write!(f, "Switch"),
            Self::Split { .. } => write!(f, "Split"),
            Self::Join { .. } => write!(f, "Join"),
            Self::ExternalSignal { kind, .. } => write!(f, "ExternalSignal({kind})"),
            Self::End => write!(f, "End"),
        }
    }
}

impl fmt::Debug for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGraph")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .finish()
    }
}
