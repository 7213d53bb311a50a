//! Ordering and execution constraints derived from ATG topology.

use std::collections::BTreeMap;

use itertools::Itertools;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::atg::{AtContent, AtEdgeKind, AtGraph, AtNodeKind, OperatorKind};
use crate::decomposer::{dfs_normal, generate_trimmed_at_graph, normal_children};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `b` must occur after `a`.
    Sequential,
    /// `a` is attempted before `b`; `b` runs only if `a` fails.
    Fallback,
    /// Execution-constraint pair; carries the sharing flags.
    NonCoop,
}

/// One constraint over two abstract-task nodes of the full ATG.
#[derive(Debug, Clone, Copy)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub a: NodeIndex,
    pub b: NodeIndex,
    pub group: bool,
    pub divisible: bool,
}

/// All mission constraints, with the successor map used by ordering
/// enumeration.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// Derive SEQ/FB constraints from the trimmed operator topology and NC
    /// constraints from the NONCOOP edges.
    ///
    /// Ordering constraints are generated between every pair of tasks in
    /// distinct child subtrees of a sequential or fallback operator, which
    /// closes them transitively by construction; the tie kind always comes
    /// from the operator actually relating the pair.
    pub fn generate(graph: &AtGraph, root: NodeIndex) -> Self {
        let mut constraints = Vec::new();

        let (trimmed, _, reverse) = generate_trimmed_at_graph(graph, root);
        for op in trimmed.node_indices() {
            let kind = match &trimmed[op].content {
                AtContent::Operator(OperatorKind::Sequential) => ConstraintKind::Sequential,
                AtContent::Operator(OperatorKind::Fallback) => ConstraintKind::Fallback,
                _ => continue,
            };

            let child_task_sets: Vec<Vec<NodeIndex>> = normal_children(&trimmed, op)
                .into_iter()
                .map(|child| {
                    dfs_normal(&trimmed, child)
                        .into_iter()
                        .filter(|&n| trimmed[n].kind == AtNodeKind::AbstractTask)
                        .map(|n| reverse[&n])
                        .collect()
                })
                .collect();

            for (earlier, later) in child_task_sets.iter().tuple_combinations() {
                for &a in earlier {
                    for &b in later {
                        constraints.push(Constraint {
                            kind,
                            a,
                            b,
                            group: true,
                            divisible: true,
                        });
                    }
                }
            }
        }

        // NONCOOP edges are symmetric; keep one constraint per unordered
        // pair.
        for edge in graph.edge_references() {
            if edge.weight().kind != AtEdgeKind::NonCoop {
                continue;
            }
            let (a, b) = (edge.source(), edge.target());
            if a >= b {
                continue;
            }
            constraints.push(Constraint {
                kind: ConstraintKind::NonCoop,
                a,
                b,
                group: edge.weight().group,
                divisible: edge.weight().divisible,
            });
        }

        Self { constraints }
    }

    /// Successor map for ordering enumeration: task -> tasks that must come
    /// after it (SEQ and FB ties both constrain attempt order).
    pub fn successors(&self) -> BTreeMap<NodeIndex, Vec<NodeIndex>> {
        let mut map: BTreeMap<NodeIndex, Vec<NodeIndex>> = BTreeMap::new();
        for c in &self.constraints {
            if matches!(c.kind, ConstraintKind::Sequential | ConstraintKind::Fallback) {
                map.entry(c.a).or_default().push(c.b);
            }
        }
        map
    }

    /// Non-coop partners per task, with each pair's sharing flags.
    pub fn non_coop_partners(&self) -> BTreeMap<NodeIndex, Vec<(NodeIndex, bool, bool)>> {
        let mut map: BTreeMap<NodeIndex, Vec<(NodeIndex, bool, bool)>> = BTreeMap::new();
        for c in &self.constraints {
            if c.kind == ConstraintKind::NonCoop {
                map.entry(c.a).or_default().push((c.b, c.group, c.divisible));
                map.entry(c.b).or_default().push((c.a, c.group, c.divisible));
            }
        }
        map
    }

    /// Whether a SEQ tie (direct or transitive) orders `a` before `b`.
    pub fn seq_before(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.constraints
            .iter()
            .any(|c| c.kind == ConstraintKind::Sequential && c.a == a && c.b == b)
    }

    /// Whether two tasks are non-coop partners at all.
    pub fn non_coop_pair(&self, a: NodeIndex, b: NodeIndex) -> Option<&Constraint> {
        self.constraints.iter().find(|c| {
            c.kind == ConstraintKind::NonCoop
                && ((c.a == a && c.b == b) || (c.a == b && c.b == a))
        })
    }
}
