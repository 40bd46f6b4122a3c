//! Two-phase graph builder.
//!
//! Phase one collects declarative node specs whose edges are symbolic name
//! strings. Phase two ([`GraphBuilder::build`]) indexes the names, resolves
//! every reference, checks arity and pairing rules, and produces the
//! immutable arena-backed [`FlowGraph`]. All configuration defects surface
//! here as [`ProposalError::GraphConfig`].

use std::collections::HashMap;

use super::context::Predicate;
use super::graph::{
    FlowGraph, FlowNode, NodeId, NodeKind, SplitBranch, SwitchCase, ViewConfig,
};
use crate::error::{ProposalError, Result};

pub struct GraphBuilder {
    name: String,
    specs: Vec<NodeSpec>,
}

struct NodeSpec {
    name: String,
    description: String,
    kind: SpecKind,
}

enum SpecKind {
    Start {
        next: String,
    },
    View {
        next: String,
        config: ViewConfig,
    },
    If {
        predicate: Predicate,
        then_next: String,
        else_next: String,
    },
    Switch {
        cases: Vec<(Predicate, String)>,
        default: Option<String>,
    },
    Split {
        branches: Vec<(String, Option<Predicate>)>,
    },
    Join {
        split: String,
        next: String,
    },
    ExternalSignal {
        kind: String,
        allow_skip: bool,
        next: String,
    },
    End,
}

impl GraphBuilder {
    pub fn new(flow_name: impl Into<String>) -> Self {
        Self {
            name: flow_name.into(),
            specs: Vec::new(),
        }
    }

    fn push(mut self, name: impl Into<String>, description: impl Into<String>, kind: SpecKind) -> Self {
        self.specs.push(NodeSpec {
            name: name.into(),
            description: description.into(),
            kind,
        });
        self
    }

    pub fn start(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        next: impl Into<String>,
    ) -> Self {
        self.push(name, description, SpecKind::Start { next: next.into() })
    }

    pub fn view(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        next: impl Into<String>,
        config: ViewConfig,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::View {
                next: next.into(),
                config,
            },
        )
    }

    pub fn cond(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        predicate: Predicate,
        then_next: impl Into<String>,
        else_next: impl Into<String>,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::If {
                predicate,
                then_next: then_next.into(),
                else_next: else_next.into(),
            },
        )
    }

    pub fn switch(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        cases: Vec<(Predicate, &str)>,
        default: Option<&str>,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::Switch {
                cases: cases
                    .into_iter()
                    .map(|(p, target)| (p, target.to_string()))
                    .collect(),
                default: default.map(str::to_string),
            },
        )
    }

    pub fn split(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        branches: Vec<(&str, Option<Predicate>)>,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::Split {
                branches: branches
                    .into_iter()
                    .map(|(target, guard)| (target.to_string(), guard))
                    .collect(),
            },
        )
    }

    pub fn join(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        split: impl Into<String>,
        next: impl Into<String>,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::Join {
                split: split.into(),
                next: next.into(),
            },
        )
    }

    pub fn signal_wait(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: impl Into<String>,
        allow_skip: bool,
        next: impl Into<String>,
    ) -> Self {
        self.push(
            name,
            description,
            SpecKind::ExternalSignal {
                kind: kind.into(),
                allow_skip,
                next: next.into(),
            },
        )
    }

    pub fn end(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.push(name, description, SpecKind::End)
    }

    /// Resolve all symbolic references and produce the immutable graph.
    pub fn build(self) -> Result<FlowGraph> {
        let flow = self.name;

        // Index names first so forward and backward references resolve alike.
        let mut by_name: HashMap<String, NodeId> = HashMap::new();
        for (idx, spec) in self.specs.iter().enumerate() {
            if by_name.insert(spec.name.clone(), NodeId(idx)).is_some() {
                return Err(ProposalError::GraphConfig(format!(
                    "flow '{flow}': duplicate node name '{}'",
                    spec.name
                )));
            }
        }

        let resolve = |from: &str, target: &str| -> Result<NodeId> {
            by_name.get(target).copied().ok_or_else(|| {
                ProposalError::GraphConfig(format!(
                    "flow '{flow}': node '{from}' references unknown node '{target}'"
                ))
            })
        };

        let mut starts = Vec::new();
        let mut has_end = false;
        let mut nodes = Vec::with_capacity(self.specs.len());

        for spec in self.specs {
            let NodeSpec {
                name,
                description,
                kind,
            } = spec;

            let kind = match kind {
                SpecKind::Start { next } => {
                    starts.push(name.clone());
                    NodeKind::Start {
                        next: resolve(&name, &next)?,
                    }
                }
                SpecKind::View { next, config } => {
                    for correction_spec in &config.correction_specs {
                        resolve(&name, &correction_spec.for_step)?;
                    }
                    if let Some(signal) = &config.emits_signal {
                        if signal.is_empty() {
                            return Err(ProposalError::GraphConfig(format!(
                                "flow '{flow}': node '{name}' emits an empty signal kind"
                            )));
                        }
                    }
                    NodeKind::View {
                        next: resolve(&name, &next)?,
                        config,
                    }
                }
                SpecKind::If {
                    predicate,
                    then_next,
                    else_next,
                } => NodeKind::If {
                    predicate,
                    then_next: resolve(&name, &then_next)?,
                    else_next: resolve(&name, &else_next)?,
                },
                SpecKind::Switch { cases, default } => {
                    if cases.is_empty() && default.is_none() {
                        return Err(ProposalError::GraphConfig(format!(
                            "flow '{flow}': switch node '{name}' has no cases and no default"
                        )));
                    }
                    NodeKind::Switch {
                        cases: cases
                            .into_iter()
                            .map(|(predicate, target)| {
                                Ok(SwitchCase {
                                    predicate,
                                    target: resolve(&name, &target)?,
                                })
                            })
                            .collect::<Result<Vec<_>>>()?,
                        default: default.map(|target| resolve(&name, &target)).transpose()?,
                    }
                }
                SpecKind::Split { branches } => {
                    if branches.is_empty() {
                        return Err(ProposalError::GraphConfig(format!(
                            "flow '{flow}': split node '{name}' has no branches"
                        )));
                    }
                    NodeKind::Split {
                        branches: branches
                            .into_iter()
                            .map(|(target, guard)| {
                                Ok(SplitBranch {
                                    target: resolve(&name, &target)?,
                                    guard,
                                })
                            })
                            .collect::<Result<Vec<_>>>()?,
                    }
                }
                SpecKind::Join { split, next } => NodeKind::Join {
                    split: resolve(&name, &split)?,
                    next: resolve(&name, &next)?,
                },
                SpecKind::ExternalSignal {
                    kind,
                    allow_skip,
                    next,
                } => NodeKind::ExternalSignal {
                    kind,
                    allow_skip,
                    next: resolve(&name, &next)?,
                },
                SpecKind::End => {
                    has_end = true;
                    NodeKind::End
                }
            };

            nodes.push(FlowNode {
                name,
                description,
                kind,
            });
        }

        if starts.len() != 1 {
            return Err(ProposalError::GraphConfig(format!(
                "flow '{flow}': expected exactly one start node, found {}",
                starts.len()
            )));
        }
        if !has_end {
            return Err(ProposalError::GraphConfig(format!(
                "flow '{flow}': no end node"
            )));
        }

        // Joins must pair with Split nodes, and each Split with exactly one Join.
        let mut joins_per_split: HashMap<usize, usize> = HashMap::new();
        for node in &nodes {
            if let NodeKind::Join { split, .. } = &node.kind {
                match nodes[split.0].kind {
                    NodeKind::Split { .. } => {
                        *joins_per_split.entry(split.0).or_insert(0) += 1;
                    }
                    _ => {
                        return Err(ProposalError::GraphConfig(format!(
                            "flow '{flow}': join node '{}' pairs with non-split node '{}'",
                            node.name, nodes[split.0].name
                        )))
                    }
                }
            }
        }
        for (idx, node) in nodes.iter().enumerate() {
            if matches!(node.kind, NodeKind::Split { .. })
                && joins_per_split.get(&idx).copied().unwrap_or(0) != 1
            {
                return Err(ProposalError::GraphConfig(format!(
                    "flow '{flow}': split node '{}' must pair with exactly one join",
                    node.name
                )));
            }
        }

        let start = by_name[&starts[0]];
        Ok(FlowGraph::new(flow, nodes, by_name, start))
    }
}
