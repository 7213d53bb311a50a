//! ATG assembly: superimposes the runtime annotation onto the planning
//! domain, instantiating abstract tasks and their decompositions and wiring
//! context and execution-constraint edges.

use std::collections::BTreeMap;

use itertools::Itertools;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use mission_gm::condition::{check_context, context_literal, context_predicate, Context};
use mission_gm::{AnnotKind, GmNode, GoalModel, NodeKind, RuntimeAnnot};
use mission_model::{
    ArgValue, Domain, GmVariableMap, PlanError, Result, SemanticMapping, TypedVar,
    VariableMapping, WorldState,
};

use crate::atg::{
    instantiate_decomposition_predicates, AbstractTask, ArgBinding, AtContent, AtEdge, AtEdgeKind,
    AtGraph, AtNode, AtNodeKind, DecompEff, Decomposition, OperatorKind,
};
use crate::tdg::{CompleteDecompositionPath, DecompositionPath};

/// Decomposition paths per domain task name.
pub type PathTable = BTreeMap<String, Vec<(DecompositionPath, CompleteDecompositionPath)>>;

/// Builds the abstract-task graph from the runtime annotation.
pub struct MissionDecomposer<'a> {
    pub gm: &'a GoalModel,
    pub domain: &'a Domain,
    pub paths: &'a PathTable,
    pub var_mappings: &'a [VariableMapping],
    pub var_map: &'a GmVariableMap,
    pub semantic_mappings: &'a [SemanticMapping],
    pub world_state: &'a WorldState,
}

impl MissionDecomposer<'_> {
    /// Assemble the ATG: one DFS insertion pass over the annotation, then
    /// the execution-constraint pass and the context-dependency rewrite.
    pub fn build(&self, annot: &RuntimeAnnot) -> Result<(AtGraph, NodeIndex)> {
        let mut graph = AtGraph::new();
        let forall_iterations = self.forall_iteration_vars();

        let root = self.insert(&mut graph, annot, None, &forall_iterations)?;
        self.create_non_coop_edges(&mut graph);
        final_context_dependency_links(&mut graph);
        Ok((graph, root))
    }

    /// Iteration variable -> iterated collection variable, from every forAll
    /// achieve condition in the goal model.
    fn forall_iteration_vars(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (_, node) in self.gm.nodes() {
            if let Some(condition) = &node.achieve_condition {
                if let Some(forall) = &condition.forall {
                    out.insert(forall.iteration_var.clone(), forall.iterated_var.clone());
                }
            }
        }
        out
    }

    fn insert(
        &self,
        graph: &mut AtGraph,
        annot: &RuntimeAnnot,
        parent: Option<NodeIndex>,
        forall_iterations: &BTreeMap<String, String>,
    ) -> Result<NodeIndex> {
        match annot.kind {
            AnnotKind::Operator => {
                let kind = operator_kind(&annot.content)?;
                let index = graph.add_node(AtNode {
                    kind: AtNodeKind::Operator,
                    content: AtContent::Operator(kind),
                    non_coop: annot.non_coop,
                    group: annot.group,
                    divisible: annot.divisible,
                    is_achieve: false,
                    parent,
                });
                link(graph, parent, index);
                for child in &annot.children {
                    self.insert(graph, child, Some(index), forall_iterations)?;
                }
                Ok(index)
            }
            AnnotKind::Goal | AnnotKind::MeansEnd => {
                let index = graph.add_node(AtNode {
                    kind: AtNodeKind::Goal,
                    content: AtContent::Goal(annot.content.clone()),
                    non_coop: annot.non_coop,
                    group: annot.group,
                    divisible: annot.divisible,
                    is_achieve: self.is_achieve_goal(&annot.content),
                    parent,
                });
                link(graph, parent, index);
                for child in &annot.children {
                    self.insert(graph, child, Some(index), forall_iterations)?;
                }
                Ok(index)
            }
            AnnotKind::Task => self.insert_task(graph, annot, parent, forall_iterations),
            AnnotKind::Empty => Err(PlanError::MalformedGoalModel {
                node: annot.content.clone(),
                detail: "unresolved annotation node".into(),
            }),
        }
    }

    fn is_achieve_goal(&self, name: &str) -> bool {
        self.gm
            .find_by_name(name)
            .map(|id| self.gm.node(id).achieve_condition.is_some())
            .unwrap_or(false)
    }

    fn insert_task(
        &self,
        graph: &mut AtGraph,
        annot: &RuntimeAnnot,
        parent: Option<NodeIndex>,
        forall_iterations: &BTreeMap<String, String>,
    ) -> Result<NodeIndex> {
        let instance_id = annot.content.clone();
        let at = self.instantiate_at(&instance_id, forall_iterations)?;
        let gm_node = self.gm_task_node(&instance_id)?;

        let index = graph.add_node(AtNode {
            kind: AtNodeKind::AbstractTask,
            content: AtContent::Task(at.clone()),
            non_coop: annot.non_coop,
            group: annot.group,
            divisible: annot.divisible,
            is_achieve: false,
            parent,
        });
        link(graph, parent, index);

        let paths = self.paths.get(&at.name).ok_or_else(|| {
            PlanError::DomainInconsistency {
                node: instance_id.clone(),
                detail: format!("no decomposition paths for task [{}]", at.name),
            }
        })?;

        for (path_index, (path, complete)) in paths.iter().enumerate() {
            let mut d = Decomposition {
                id: format!("{}|{}", at.id, path_index + 1),
                at: at.clone(),
                path: path.clone(),
                complete_path: complete.clone(),
                prec: Vec::new(),
                eff: Vec::new(),
                func_eff: Vec::new(),
                arguments: decomposition_arguments(&at, path),
            };
            instantiate_decomposition_predicates(&at, &mut d);

            let d_index = graph.add_node(AtNode {
                kind: AtNodeKind::Decomposition,
                content: AtContent::Decomposition(d),
                non_coop: annot.non_coop,
                group: annot.group,
                divisible: annot.divisible,
                is_achieve: false,
                parent: Some(index),
            });
            graph.add_edge(index, d_index, AtEdge::normal());
        }

        // Context handling: trigger contexts record events on the instance;
        // condition contexts inactive in the current state search for an
        // enabling decomposition.
        if let Some(context) = &gm_node.context {
            if let Context::Condition(_) = context {
                let active = check_context(
                    context,
                    &self.world_state.facts,
                    self.semantic_mappings,
                    self.var_map,
                )?;
                if !active {
                    let found = self.check_context_dependency(graph, parent, index, context)?;
                    if !found {
                        return Err(PlanError::NoValidMission {
                            detail: format!(
                                "context [{}] of [{}] is neither active nor enabled by any earlier decomposition",
                                context.render(),
                                instance_id
                            ),
                        });
                    }
                }
            }
        }

        Ok(index)
    }

    fn gm_task_node(&self, instance_id: &str) -> Result<&GmNode> {
        let base = base_id(instance_id);
        let node_id = self.gm.find_by_name(base).ok_or_else(|| {
            PlanError::MalformedGoalModel {
                node: instance_id.to_string(),
                detail: "task instance has no goal-model node".into(),
            }
        })?;
        let node = self.gm.node(node_id);
        if node.node_kind != NodeKind::Task {
            return Err(PlanError::MalformedGoalModel {
                node: instance_id.to_string(),
                detail: "annotation task refers to a goal node".into(),
            });
        }
        Ok(node)
    }

    /// Build the abstract-task instance for an annotation task leaf: the
    /// domain task, the config-mapped variable bindings, location, and robot
    /// requirements.
    fn instantiate_at(
        &self,
        instance_id: &str,
        forall_iterations: &BTreeMap<String, String>,
    ) -> Result<AbstractTask> {
        let gm_node = self.gm_task_node(instance_id)?;
        let base = base_id(instance_id);
        let (_, task_name) = gm_node.task_id_and_name();

        let task = self
            .domain
            .abstract_task(&task_name)
            .ok_or_else(|| PlanError::DomainInconsistency {
                node: instance_id.to_string(),
                detail: format!("goal model references undefined task [{task_name}]"),
            })?
            .clone();

        let instance_index = instance_suffix(instance_id);

        let mut arguments = Vec::with_capacity(task.vars.len());
        for var in &task.vars {
            let value = self
                .var_mappings
                .iter()
                .find(|m| m.task_id == base && m.domain_var == var.name)
                .map(|m| self.resolve_gm_var(&m.gm_var, instance_index, forall_iterations))
                .transpose()?;
            arguments.push(ArgBinding {
                value,
                var: var.clone(),
            });
        }

        let (location_values, location_var) = match &gm_node.location {
            Some(location_gm_var) => {
                let values =
                    self.resolve_gm_var(location_gm_var, instance_index, forall_iterations)?;
                let domain_var: Option<TypedVar> = self
                    .var_mappings
                    .iter()
                    .find(|m| m.task_id == base && &m.gm_var == location_gm_var)
                    .and_then(|m| task.vars.iter().find(|v| v.name == m.domain_var))
                    .cloned();
                (Some(values), domain_var)
            }
            None => (None, None),
        };

        let triggering_events = match &gm_node.context {
            Some(Context::Trigger(events)) => events.clone(),
            _ => Vec::new(),
        };

        Ok(AbstractTask {
            id: instance_id.to_string(),
            name: task_name,
            task,
            arguments,
            location_values,
            location_var,
            triggering_events,
            fixed_robot_num: gm_node.fixed_robot_num,
            robot_num: gm_node.robot_num,
        })
    }

    /// The value of a goal-model variable for a given task instance. forAll
    /// iteration variables select the instance's element of the iterated
    /// collection; everything else reads the bound variable map.
    fn resolve_gm_var(
        &self,
        gm_var: &str,
        instance_index: Option<usize>,
        forall_iterations: &BTreeMap<String, String>,
    ) -> Result<ArgValue> {
        if let Some(binding) = self.var_map.get(gm_var) {
            return Ok(binding.value.clone());
        }

        if let Some(collection_var) = forall_iterations.get(gm_var) {
            let binding = self.var_map.get(collection_var).ok_or_else(|| {
                PlanError::MalformedGoalModel {
                    node: gm_var.to_string(),
                    detail: format!("forAll collection [{collection_var}] is unbound"),
                }
            })?;
            let ArgValue::Collection(values) = &binding.value else {
                return Err(PlanError::MalformedGoalModel {
                    node: gm_var.to_string(),
                    detail: format!("forAll collection [{collection_var}] is not collection-typed"),
                });
            };
            let index = instance_index.unwrap_or(1);
            let value = values.get(index - 1).ok_or_else(|| {
                PlanError::MalformedGoalModel {
                    node: gm_var.to_string(),
                    detail: format!(
                        "instance {index} exceeds collection [{collection_var}] of size {}",
                        values.len()
                    ),
                }
            })?;
            return Ok(ArgValue::Single(value.clone()));
        }

        Err(PlanError::MalformedGoalModel {
            node: gm_var.to_string(),
            detail: "variable mapping references an unbound goal-model variable".into(),
        })
    }

    /// Search, in DFS order from `parent`, for an already-inserted
    /// decomposition whose effects make the context active; the first hit
    /// gets a CDEPEND edge onto `current`.
    fn check_context_dependency(
        &self,
        graph: &mut AtGraph,
        parent: Option<NodeIndex>,
        current: NodeIndex,
        context: &Context,
    ) -> Result<bool> {
        let Some(parent) = parent else {
            return Ok(false);
        };

        let resolved = context_predicate(context, self.semantic_mappings)?;
        let wanted = context_literal(&resolved, self.var_map)?;

        for v in dfs_normal(graph, parent) {
            if v == current || graph[v].kind != AtNodeKind::AbstractTask {
                continue;
            }
            let decompositions: Vec<NodeIndex> = normal_children(graph, v)
                .into_iter()
                .filter(|&d| graph[d].kind == AtNodeKind::Decomposition)
                .collect();

            for d_index in decompositions {
                let AtContent::Decomposition(d) = &graph[d_index].content else {
                    continue;
                };
                let mut facts = self.world_state.facts.clone();
                for eff in &d.eff {
                    if let DecompEff::Ground(e) = eff {
                        match facts.iter_mut().find(|f| f.same_fact(e)) {
                            Some(fact) => fact.positive = e.positive,
                            None => facts.push(e.clone()),
                        }
                    }
                }

                let satisfied = facts
                    .iter()
                    .any(|f| f.same_fact(&wanted) && f.positive == wanted.positive);
                if satisfied {
                    let d_id = d.id.clone();
                    graph.add_edge(d_index, current, AtEdge::context_dependency());
                    tracing::debug!(
                        decomposition = %d_id,
                        context = %context.render(),
                        "context dependency resolved"
                    );
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// For each non-coop subtree root, add symmetric NONCOOP edges between
    /// every pair of its abstract-task descendants, tagged with the root's
    /// sharing flags.
    fn create_non_coop_edges(&self, graph: &mut AtGraph) {
        let roots: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|&n| {
                graph[n].non_coop
                    && graph[n]
                        .parent
                        .map(|p| !graph[p].non_coop)
                        .unwrap_or(true)
            })
            .collect();

        for root in roots {
            let group = graph[root].group;
            let divisible = graph[root].divisible;
            let tasks: Vec<NodeIndex> = dfs_normal(graph, root)
                .into_iter()
                .filter(|&n| graph[n].kind == AtNodeKind::AbstractTask)
                .collect();

            for (&a, &b) in tasks.iter().tuple_combinations() {
                if !has_edge_of_kind(graph, a, b, AtEdgeKind::NonCoop) {
                    graph.add_edge(a, b, AtEdge::non_coop(group, divisible));
                }
                if !has_edge_of_kind(graph, b, a, AtEdgeKind::NonCoop) {
                    graph.add_edge(b, a, AtEdge::non_coop(group, divisible));
                }
            }
        }
    }
}

fn operator_kind(symbol: &str) -> Result<OperatorKind> {
    match symbol {
        mission_gm::OP_SEQ => Ok(OperatorKind::Sequential),
        mission_gm::OP_PAR => Ok(OperatorKind::Parallel),
        mission_gm::OP_FALLBACK => Ok(OperatorKind::Fallback),
        mission_gm::OP_OPT => Ok(OperatorKind::Opt),
        other => Err(PlanError::InvalidExpression {
            node: String::new(),
            detail: format!("unknown runtime operator [{other}]"),
        }),
    }
}

fn link(graph: &mut AtGraph, parent: Option<NodeIndex>, child: NodeIndex) {
    if let Some(parent) = parent {
        graph.add_edge(parent, child, AtEdge::normal());
    }
}

/// The instance id without its forAll replication suffix: `AT1_2` -> `AT1`.
pub fn base_id(instance_id: &str) -> &str {
    match instance_id.find('_') {
        Some(pos) => &instance_id[..pos],
        None => instance_id,
    }
}

/// The replication index of an instance id, when present.
fn instance_suffix(instance_id: &str) -> Option<usize> {
    instance_id
        .split_once('_')
        .and_then(|(_, suffix)| suffix.parse().ok())
}

/// Bindings for every variable a decomposition path mentions: the task's
/// config-mapped arguments plus one open binding per method-introduced
/// variable.
fn decomposition_arguments(at: &AbstractTask, path: &DecompositionPath) -> Vec<ArgBinding> {
    let mut arguments = at.arguments.clone();
    for task in &path.tasks {
        for var in task.original_vars() {
            if !arguments.iter().any(|b| b.var.name == var.name) {
                arguments.push(ArgBinding {
                    value: None,
                    var: var.clone(),
                });
            }
        }
    }
    arguments
}

/// Outgoing NORMAL-edge children, in insertion order.
pub fn normal_children(graph: &AtGraph, node: NodeIndex) -> Vec<NodeIndex> {
    let mut children: Vec<NodeIndex> = graph
        .edges_directed(node, Direction::Outgoing)
        .filter(|e| e.weight().kind == AtEdgeKind::Normal)
        .map(|e| e.target())
        .collect();
    children.reverse();
    children
}

/// Pre-order DFS over NORMAL edges from `start`.
pub fn dfs_normal(graph: &AtGraph, start: NodeIndex) -> Vec<NodeIndex> {
    let mut order = Vec::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        order.push(node);
        for child in normal_children(graph, node).into_iter().rev() {
            stack.push(child);
        }
    }
    order
}

fn has_edge_of_kind(graph: &AtGraph, a: NodeIndex, b: NodeIndex, kind: AtEdgeKind) -> bool {
    graph
        .edges_directed(a, Direction::Outgoing)
        .any(|e| e.target() == b && e.weight().kind == kind)
}

/// Rewrite CDEPEND edges that target non-task nodes into one edge per
/// reachable abstract-task descendant of the target, removing the original.
pub fn final_context_dependency_links(graph: &mut AtGraph) {
    loop {
        let candidate = graph.edge_indices().find(|&e| {
            graph[e].kind == AtEdgeKind::ContextDependency
                && graph
                    .edge_endpoints(e)
                    .map(|(_, target)| graph[target].kind != AtNodeKind::AbstractTask)
                    .unwrap_or(false)
        });
        let Some(edge) = candidate else {
            break;
        };
        let (source, target) = graph.edge_endpoints(edge).expect("edge exists");
        graph.remove_edge(edge);

        let tasks: Vec<NodeIndex> = dfs_normal(graph, target)
            .into_iter()
            .filter(|&n| graph[n].kind == AtNodeKind::AbstractTask)
            .collect();
        for task in tasks {
            if !has_edge_of_kind(graph, source, task, AtEdgeKind::ContextDependency) {
                graph.add_edge(source, task, AtEdge::context_dependency());
            }
        }
    }
}

/// The trimmed view of an ATG: abstract-task nodes plus the operator nodes
/// with more than one normal child, re-parented transitively. Returns the
/// trimmed graph, its root, and the mapping back to full-graph indices.
pub fn generate_trimmed_at_graph(
    graph: &AtGraph,
    root: NodeIndex,
) -> (AtGraph, Option<NodeIndex>, BTreeMap<NodeIndex, NodeIndex>) {
    let mut trimmed = AtGraph::new();
    let mut reverse: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();

    fn keep(graph: &AtGraph, node: NodeIndex) -> bool {
        match graph[node].kind {
            AtNodeKind::AbstractTask => true,
            AtNodeKind::Operator => normal_children(graph, node).len() > 1,
            _ => false,
        }
    }

    fn visit(
        graph: &AtGraph,
        node: NodeIndex,
        trimmed_parent: Option<NodeIndex>,
        trimmed: &mut AtGraph,
        reverse: &mut BTreeMap<NodeIndex, NodeIndex>,
        trimmed_root: &mut Option<NodeIndex>,
    ) {
        let next_parent = if keep(graph, node) {
            let mut data = graph[node].clone();
            data.parent = trimmed_parent;
            let index = trimmed.add_node(data);
            reverse.insert(index, node);
            if let Some(parent) = trimmed_parent {
                trimmed.add_edge(parent, index, AtEdge::normal());
            } else if trimmed_root.is_none() {
                *trimmed_root = Some(index);
            }
            Some(index)
        } else {
            trimmed_parent
        };

        // Decomposition children stay behind in the full graph.
        if graph[node].kind == AtNodeKind::AbstractTask {
            return;
        }
        for child in normal_children(graph, node) {
            visit(graph, child, next_parent, trimmed, reverse, trimmed_root);
        }
    }

    let mut trimmed_root = None;
    visit(graph, root, None, &mut trimmed, &mut reverse, &mut trimmed_root);
    (trimmed, trimmed_root, reverse)
}
