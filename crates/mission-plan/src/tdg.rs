//! Task-decomposition graphs: one per top-level abstract task.
//!
//! An abstract-task node's method children are OR choices; a method node's
//! subtask children are AND, in declaration order. Path enumeration explores
//! each OR choice while threading variable unification from parent args into
//! method vars and child args, pruning branches whose primitive
//! preconditions are falsified by the locally simulated state.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use mission_model::{
    ComparisonOp, Domain, Effect, FunctionComparison, Literal, Method, PlanError, Precondition,
    Result, Task,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdgNodeKind {
    AbstractTask,
    PrimitiveTask,
    Method,
}

#[derive(Debug, Clone)]
pub enum TdgContent {
    Task(Task),
    Method(Method),
}

impl TdgContent {
    pub fn name(&self) -> &str {
        match self {
            Self::Task(t) => &t.name,
            Self::Method(m) => &m.name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TdgNode {
    pub kind: TdgNodeKind,
    pub content: TdgContent,
    /// Set on method nodes that close a recursion back to an ancestor
    /// abstract task; such edges are not followed during enumeration.
    pub belongs_to_cycles: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdgEdge {
    /// Abstract task to method: a choice.
    Or,
    /// Method to subtask: all, in order.
    And,
    /// Back-edge closing a recursion.
    Cycle,
}

/// One fully primitive decomposition of an abstract task, with any deferred
/// expansion fragments.
#[derive(Debug, Clone, Default)]
pub struct DecompositionPath {
    pub tasks: Vec<Task>,
    pub needs_expansion: bool,
    pub fragments: Vec<ExpansionFragment>,
}

/// A contiguous task range whose repetition count is fixed only once the
/// controlling function predicate is ground: `tasks[start..=end]` repeats
/// according to the function value against the comparison threshold.
#[derive(Debug, Clone)]
pub struct ExpansionFragment {
    pub start: usize,
    pub end: usize,
    pub comparison: FunctionComparison,
}

/// A decomposition path that retains the interior method and abstract-task
/// nodes, for iHTN reconstruction.
#[derive(Debug, Clone, Default)]
pub struct CompleteDecompositionPath {
    pub nodes: Vec<DecompositionNode>,
}

#[derive(Debug, Clone)]
pub struct DecompositionNode {
    pub content: TdgContent,
    pub id: usize,
    pub parent: Option<usize>,
    pub is_primitive: bool,
}

/// The task-decomposition graph of one top-level abstract task.
#[derive(Debug)]
pub struct Tdg {
    graph: DiGraph<TdgNode, TdgEdge>,
    root: NodeIndex,
    domain: Domain,
}

impl Tdg {
    /// Build the TDG for `root_task` by depth-first method expansion.
    /// Recursions are recorded as cycle back-edges and not expanded further.
    pub fn build(root_task: &Task, domain: &Domain) -> Result<Self> {
        let mut graph = DiGraph::new();
        let root = graph.add_node(TdgNode {
            kind: TdgNodeKind::AbstractTask,
            content: TdgContent::Task(root_task.clone()),
            belongs_to_cycles: false,
        });

        let mut builder = TdgBuilder {
            graph: &mut graph,
            domain,
            open: vec![(root_task.name.clone(), root)],
        };
        builder.expand_abstract(root, &root_task.name)?;

        let tdg = Self {
            graph,
            root,
            domain: domain.clone(),
        };
        Ok(tdg)
    }

    pub fn root_task(&self) -> &Task {
        match &self.graph[self.root].content {
            TdgContent::Task(t) => t,
            TdgContent::Method(_) => unreachable!("root is always an abstract task"),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Enumerate every decomposition path of the root task, threading
    /// variable mappings and pruning against `initial_state` plus prior
    /// effects. Fails with [`PlanError::DomainInconsistency`] when every
    /// branch is pruned.
    pub fn paths(
        &self,
        initial_state: &[Literal],
    ) -> Result<Vec<(DecompositionPath, CompleteDecompositionPath)>> {
        let root = self.root_task();
        let identity: Vec<(String, String)> = root
            .vars
            .iter()
            .map(|v| (v.name.clone(), v.name.clone()))
            .collect();

        let mut enumerator = PathEnumerator {
            tdg: self,
            rename_counter: 0,
            seen_tasks: Vec::new(),
        };
        let builds = enumerator.expand_task(self.root, &identity, initial_state.to_vec())?;

        if builds.is_empty() {
            return Err(PlanError::DomainInconsistency {
                node: root.name.clone(),
                detail: "no decomposition path survives precondition pruning".into(),
            });
        }

        let mut out = Vec::with_capacity(builds.len());
        for build in builds {
            let needs_expansion = !build.fragments.is_empty();
            let path = DecompositionPath {
                tasks: build.tasks,
                needs_expansion,
                fragments: build.fragments,
            };
            out.push((path, CompleteDecompositionPath { nodes: build.nodes }));
        }
        Ok(out)
    }

    fn methods_of(&self, at: NodeIndex) -> Vec<NodeIndex> {
        let mut methods: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(at, Direction::Outgoing)
            .collect();
        // petgraph returns neighbors newest-first; enumeration order is
        // declaration order.
        methods.reverse();
        methods
    }

    fn subtasks_of(&self, method: NodeIndex) -> Vec<(NodeIndex, TdgEdge)> {
        let mut subtasks: Vec<(NodeIndex, TdgEdge)> = self
            .graph
            .edges(method)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        subtasks.reverse();
        subtasks
    }
}

struct TdgBuilder<'a> {
    graph: &'a mut DiGraph<TdgNode, TdgEdge>,
    domain: &'a Domain,
    /// Abstract tasks on the current expansion stack, for cycle detection.
    open: Vec<(String, NodeIndex)>,
}

impl TdgBuilder<'_> {
    fn expand_abstract(&mut self, at_index: NodeIndex, task_name: &str) -> Result<()> {
        let methods: Vec<Method> = self
            .domain
            .methods_for(task_name)
            .into_iter()
            .cloned()
            .collect();

        for method in methods {
            let m_index = self.graph.add_node(TdgNode {
                kind: TdgNodeKind::Method,
                content: TdgContent::Method(method.clone()),
                belongs_to_cycles: false,
            });
            self.graph.add_edge(at_index, m_index, TdgEdge::Or);

            for subtask in &method.subtasks {
                if let Some(primitive) = self.domain.primitive(&subtask.task) {
                    let p_index = self.graph.add_node(TdgNode {
                        kind: TdgNodeKind::PrimitiveTask,
                        content: TdgContent::Task(primitive.clone()),
                        belongs_to_cycles: false,
                    });
                    self.graph.add_edge(m_index, p_index, TdgEdge::And);
                } else if let Some(abstract_task) = self.domain.abstract_task(&subtask.task) {
                    if let Some(&(_, ancestor)) =
                        self.open.iter().find(|(name, _)| name == &subtask.task)
                    {
                        // Recursion: tag the method and close the cycle.
                        self.graph[m_index].belongs_to_cycles = true;
                        self.graph.add_edge(m_index, ancestor, TdgEdge::Cycle);
                        continue;
                    }
                    let a_index = self.graph.add_node(TdgNode {
                        kind: TdgNodeKind::AbstractTask,
                        content: TdgContent::Task(abstract_task.clone()),
                        belongs_to_cycles: false,
                    });
                    self.graph.add_edge(m_index, a_index, TdgEdge::And);
                    self.open.push((subtask.task.clone(), a_index));
                    self.expand_abstract(a_index, &subtask.task)?;
                    self.open.pop();
                } else {
                    return Err(PlanError::DomainInconsistency {
                        node: method.name.clone(),
                        detail: format!("subtask [{}] is not defined in the domain", subtask.task),
                    });
                }
            }
        }
        Ok(())
    }
}

/// One branch under construction during enumeration.
#[derive(Debug, Clone, Default)]
struct PathBuild {
    tasks: Vec<Task>,
    nodes: Vec<DecompositionNode>,
    fragments: Vec<ExpansionFragment>,
    state: Vec<Literal>,
    next_node_id: usize,
}

struct PathEnumerator<'a> {
    tdg: &'a Tdg,
    rename_counter: usize,
    seen_tasks: Vec<String>,
}

impl PathEnumerator<'_> {
    /// Expand an abstract-task node under a variable mapping
    /// (task var -> resolved name), returning one build per OR choice chain.
    fn expand_task(
        &mut self,
        at_index: NodeIndex,
        mapping: &[(String, String)],
        state: Vec<Literal>,
    ) -> Result<Vec<PathBuild>> {
        let at_node = &self.tdg.graph[at_index];
        let TdgContent::Task(at_task) = &at_node.content else {
            unreachable!("expand_task called on a method node");
        };

        let mut seed = PathBuild {
            state,
            ..PathBuild::default()
        };
        let renamed_root = rename_task(at_task, mapping);
        seed.nodes.push(DecompositionNode {
            content: TdgContent::Task(renamed_root),
            id: 0,
            parent: None,
            is_primitive: false,
        });
        seed.next_node_id = 1;

        self.expand_choices(at_index, 0, mapping, seed)
    }

    /// Expand the OR choices of an abstract task already present in the
    /// build at node id `at_id`.
    fn expand_choices(
        &mut self,
        at_index: NodeIndex,
        at_id: usize,
        mapping: &[(String, String)],
        seed: PathBuild,
    ) -> Result<Vec<PathBuild>> {
        let methods = self.tdg.methods_of(at_index);
        let mut out = Vec::new();

        for m_index in methods {
            let m_node = &self.tdg.graph[m_index];
            if m_node.belongs_to_cycles {
                // Cycle-closing methods are not enumerated.
                continue;
            }
            let TdgContent::Method(method) = m_node.content.clone() else {
                continue;
            };

            let method_mapping = self.unify_method(&method, mapping, at_id)?;
            let mut build = seed.clone();

            let renamed_method = rename_method(&method, &method_mapping);
            let method_node_id = build.next_node_id;
            build.nodes.push(DecompositionNode {
                content: TdgContent::Method(renamed_method),
                id: method_node_id,
                parent: Some(at_id),
                is_primitive: false,
            });
            build.next_node_id += 1;

            let method_span_start = build.tasks.len();
            let mut branch_builds = vec![build];
            let mut span_comparison: Option<FunctionComparison> = None;

            for (subtask_index, (child_index, edge)) in
                self.tdg.subtasks_of(m_index).into_iter().enumerate()
            {
                if edge == TdgEdge::Cycle {
                    continue;
                }
                let child_node = &self.tdg.graph[child_index];
                let TdgContent::Task(child_task) = child_node.content.clone() else {
                    continue;
                };
                let subtask = method.subtasks.get(subtask_index).ok_or_else(|| {
                    PlanError::DomainInconsistency {
                        node: method.name.clone(),
                        detail: "method subtask arity mismatch".into(),
                    }
                })?;
                let child_mapping =
                    self.unify_subtask(&child_task, subtask, &method, &method_mapping)?;

                let mut next_builds = Vec::new();
                for mut branch in branch_builds {
                    match child_node.kind {
                        TdgNodeKind::PrimitiveTask => {
                            let renamed = rename_task(&child_task, &child_mapping);
                            match self.check_primitive(&renamed, &mut branch) {
                                PrimitiveOutcome::Pruned => {}
                                PrimitiveOutcome::Kept(comparison) => {
                                    if let Some(c) = comparison {
                                        span_comparison = Some(c);
                                    }
                                    let id = branch.next_node_id;
                                    branch.nodes.push(DecompositionNode {
                                        content: TdgContent::Task(renamed.clone()),
                                        id,
                                        parent: Some(method_node_id),
                                        is_primitive: true,
                                    });
                                    branch.next_node_id += 1;
                                    branch.tasks.push(renamed);
                                    next_builds.push(branch);
                                }
                            }
                        }
                        TdgNodeKind::AbstractTask => {
                            let sub_builds = self.expand_nested(
                                child_index,
                                &child_mapping,
                                branch,
                                method_node_id,
                            )?;
                            next_builds.extend(sub_builds);
                        }
                        TdgNodeKind::Method => {}
                    }
                }
                branch_builds = next_builds;
                if branch_builds.is_empty() {
                    break;
                }
            }

            if let Some(comparison) = span_comparison {
                for branch in &mut branch_builds {
                    if branch.tasks.len() > method_span_start {
                        branch.fragments.push(ExpansionFragment {
                            start: method_span_start,
                            end: branch.tasks.len() - 1,
                            comparison: comparison.clone(),
                        });
                    }
                }
            }

            out.extend(branch_builds);
        }

        Ok(out)
    }

    /// Expand a nested abstract task inside an ongoing build.
    fn expand_nested(
        &mut self,
        at_index: NodeIndex,
        mapping: &[(String, String)],
        mut build: PathBuild,
        parent_node_id: usize,
    ) -> Result<Vec<PathBuild>> {
        let TdgContent::Task(at_task) = self.tdg.graph[at_index].content.clone() else {
            unreachable!("nested expansion on non-task node");
        };

        let at_id = build.next_node_id;
        build.nodes.push(DecompositionNode {
            content: TdgContent::Task(rename_task(&at_task, mapping)),
            id: at_id,
            parent: Some(parent_node_id),
            is_primitive: false,
        });
        build.next_node_id += 1;

        self.expand_choices(at_index, at_id, mapping, build)
    }

    /// Thread the abstract task's resolved args into a method's variables.
    /// Method-local variables keep their name on first use; repeated
    /// expansion of the same task gets a fresh monotonic suffix.
    fn unify_method(
        &mut self,
        method: &Method,
        at_mapping: &[(String, String)],
        _at_id: usize,
    ) -> Result<Vec<(String, String)>> {
        let repeated = self.seen_tasks.contains(&method.task);
        if !repeated {
            self.seen_tasks.push(method.task.clone());
        }

        let mut mapping: Vec<(String, String)> = Vec::new();
        for (index, arg) in method.task_args.iter().enumerate() {
            let resolved = at_mapping.get(index).map(|(_, r)| r.clone()).ok_or_else(|| {
                PlanError::DomainInconsistency {
                    node: method.name.clone(),
                    detail: format!(
                        "method binds task argument [{arg}] with no matching task variable"
                    ),
                }
            })?;
            mapping.push((arg.clone(), resolved));
        }

        for var in &method.vars {
            if mapping.iter().any(|(name, _)| name == &var.name) {
                continue;
            }
            let resolved = if repeated {
                self.rename_counter += 1;
                format!("{}_{}", var.name, self.rename_counter)
            } else {
                var.name.clone()
            };
            mapping.push((var.name.clone(), resolved));
        }

        Ok(mapping)
    }

    /// Map a child task's declared variables through the subtask argument
    /// list, checking sort compatibility.
    fn unify_subtask(
        &self,
        child: &Task,
        subtask: &mission_model::Subtask,
        method: &Method,
        method_mapping: &[(String, String)],
    ) -> Result<Vec<(String, String)>> {
        if subtask.args.len() != child.vars.len() {
            return Err(PlanError::DomainInconsistency {
                node: method.name.clone(),
                detail: format!(
                    "subtask [{}] passes {} arguments, task declares {}",
                    subtask.task,
                    subtask.args.len(),
                    child.vars.len()
                ),
            });
        }

        let mut mapping = Vec::with_capacity(child.vars.len());
        for (child_var, arg) in child.vars.iter().zip(&subtask.args) {
            let method_var = method.vars.iter().find(|v| &v.name == arg);
            if let Some(method_var) = method_var {
                let compatible = self
                    .tdg
                    .domain
                    .sort_derives_from(&method_var.sort, &child_var.sort)
                    || self
                        .tdg
                        .domain
                        .sort_derives_from(&child_var.sort, &method_var.sort);
                if !compatible {
                    return Err(PlanError::DomainInconsistency {
                        node: method.name.clone(),
                        detail: format!(
                            "cannot unify [{arg}:{}] with [{}:{}] of task [{}]",
                            method_var.sort, child_var.name, child_var.sort, child.name
                        ),
                    });
                }
            }
            let resolved = method_mapping
                .iter()
                .find(|(name, _)| name == arg)
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| arg.clone());
            mapping.push((child_var.name.clone(), resolved));
        }
        Ok(mapping)
    }

    /// Check a renamed primitive against the branch's local state; on
    /// success apply its effects. Function comparisons with `>` defer to
    /// expansion fragments instead of pruning.
    fn check_primitive(&self, task: &Task, build: &mut PathBuild) -> PrimitiveOutcome {
        let mut comparison = None;
        for prec in &task.preconditions {
            match prec {
                Precondition::Literal(literal) => {
                    let contradicted = build.state.iter().any(|fact| {
                        fact.same_fact(literal) && fact.positive != literal.positive
                    });
                    if contradicted {
                        return PrimitiveOutcome::Pruned;
                    }
                }
                Precondition::Comparison(c) => {
                    if c.op == ComparisonOp::Gt {
                        comparison = Some(c.clone());
                    }
                }
            }
        }

        for effect in &task.effects {
            if let Effect::Literal(literal) = effect {
                match build.state.iter_mut().find(|f| f.same_fact(literal)) {
                    Some(fact) => fact.positive = literal.positive,
                    None => build.state.push(literal.clone()),
                }
            }
        }

        PrimitiveOutcome::Kept(comparison)
    }
}

enum PrimitiveOutcome {
    Pruned,
    Kept(Option<FunctionComparison>),
}

/// A task copy with variables and literal arguments renamed through a
/// mapping. Unmapped names stay.
pub fn rename_task(task: &Task, mapping: &[(String, String)]) -> Task {
    let lookup: BTreeMap<&str, &str> = mapping
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    let rename = |name: &str| -> String {
        lookup.get(name).map(|r| r.to_string()).unwrap_or_else(|| name.to_string())
    };

    let mut renamed = task.clone();
    renamed.original_var_count = task.original_vars().len();
    for var in &mut renamed.vars {
        var.name = rename(&var.name);
    }
    for prec in &mut renamed.preconditions {
        match prec {
            Precondition::Literal(l) => {
                for arg in &mut l.args {
                    *arg = rename(arg);
                }
            }
            Precondition::Comparison(c) => {
                for arg in &mut c.args {
                    *arg = rename(arg);
                }
            }
        }
    }
    for eff in &mut renamed.effects {
        match eff {
            Effect::Literal(l) => {
                for arg in &mut l.args {
                    *arg = rename(arg);
                }
            }
            Effect::Function(f) => {
                for arg in &mut f.args {
                    *arg = rename(arg);
                }
            }
        }
    }
    renamed
}

fn rename_method(method: &Method, mapping: &[(String, String)]) -> Method {
    let lookup: BTreeMap<&str, &str> = mapping
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    let mut renamed = method.clone();
    for var in &mut renamed.vars {
        if let Some(resolved) = lookup.get(var.name.as_str()) {
            var.name = resolved.to_string();
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_model::{SortDef, Subtask, TypedVar};

    fn var(name: &str, sort: &str) -> TypedVar {
        TypedVar::new(name, sort)
    }

    fn lit(predicate: &str, args: &[&str], positive: bool) -> Literal {
        Literal::new(predicate, args.iter().map(|a| a.to_string()).collect(), positive)
    }

    /// get_object: one abstract task, two methods (fetch from shelf or from
    /// floor), each decomposing into move + pick.
    fn sample_domain() -> Domain {
        Domain {
            name: "warehouse".into(),
            sorts: vec![SortDef {
                name: "robot".into(),
                parent: None,
            }],
            primitive_tasks: vec![
                Task {
                    name: "move_to_shelf".into(),
                    vars: vec![var("?r", "robot")],
                    preconditions: vec![],
                    effects: vec![Effect::Literal(lit("at_shelf", &["?r"], true))],
                    cost: None,
                    original_var_count: 0,
                },
                Task {
                    name: "pick_from_shelf".into(),
                    vars: vec![var("?r", "robot")],
                    preconditions: vec![Precondition::Literal(lit("at_shelf", &["?r"], true))],
                    effects: vec![Effect::Literal(lit("holding", &["?r"], true))],
                    cost: None,
                    original_var_count: 0,
                },
                Task {
                    name: "pick_from_floor".into(),
                    vars: vec![var("?r", "robot")],
                    // Contradicts move_to_shelf's effect, so the floor method
                    // survives only without the shelf move.
                    preconditions: vec![Precondition::Literal(lit("at_shelf", &["?r"], false))],
                    effects: vec![Effect::Literal(lit("holding", &["?r"], true))],
                    cost: None,
                    original_var_count: 0,
                },
            ],
            abstract_tasks: vec![Task {
                name: "get_object".into(),
                vars: vec![var("?r", "robot")],
                preconditions: vec![],
                effects: vec![],
                cost: None,
                original_var_count: 0,
            }],
            methods: vec![
                Method {
                    name: "from_shelf".into(),
                    task: "get_object".into(),
                    task_args: vec!["?r".into()],
                    vars: vec![var("?r", "robot")],
                    preconditions: vec![],
                    subtasks: vec![
                        Subtask {
                            task: "move_to_shelf".into(),
                            args: vec!["?r".into()],
                        },
                        Subtask {
                            task: "pick_from_shelf".into(),
                            args: vec!["?r".into()],
                        },
                    ],
                },
                Method {
                    name: "from_floor".into(),
                    task: "get_object".into(),
                    task_args: vec!["?r".into()],
                    vars: vec![var("?r", "robot")],
                    preconditions: vec![],
                    subtasks: vec![Subtask {
                        task: "pick_from_floor".into(),
                        args: vec!["?r".into()],
                    }],
                },
            ],
            ..Domain::default()
        }
    }

    #[test]
    fn or_choices_enumerate_one_path_per_method() {
        let domain = sample_domain();
        let tdg = Tdg::build(domain.abstract_task("get_object").unwrap(), &domain).unwrap();
        let paths = tdg.paths(&[]).unwrap();
        assert_eq!(paths.len(), 2);

        let names: Vec<Vec<&str>> = paths
            .iter()
            .map(|(p, _)| p.tasks.iter().map(|t| t.name.as_str()).collect())
            .collect();
        assert_eq!(names[0], vec!["move_to_shelf", "pick_from_shelf"]);
        assert_eq!(names[1], vec!["pick_from_floor"]);
    }

    #[test]
    fn contradicted_precondition_prunes_the_branch() {
        let domain = sample_domain();
        let tdg = Tdg::build(domain.abstract_task("get_object").unwrap(), &domain).unwrap();
        // Starting at the shelf contradicts pick_from_floor's precondition.
        let paths = tdg.paths(&[lit("at_shelf", &["?r"], true)]).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0.tasks[0].name, "move_to_shelf");
    }

    #[test]
    fn complete_path_keeps_method_and_task_nesting() {
        let domain = sample_domain();
        let tdg = Tdg::build(domain.abstract_task("get_object").unwrap(), &domain).unwrap();
        let paths = tdg.paths(&[]).unwrap();
        let complete = &paths[0].1;

        assert_eq!(complete.nodes.len(), 4);
        assert!(complete.nodes[0].parent.is_none());
        assert!(matches!(complete.nodes[1].content, TdgContent::Method(_)));
        assert_eq!(complete.nodes[1].parent, Some(0));
        assert!(complete.nodes[2].is_primitive);
        assert_eq!(complete.nodes[2].parent, Some(complete.nodes[1].id));
    }

    #[test]
    fn recursive_tasks_close_cycles_instead_of_diverging() {
        let mut domain = sample_domain();
        domain.methods.push(Method {
            name: "retry".into(),
            task: "get_object".into(),
            task_args: vec!["?r".into()],
            vars: vec![var("?r", "robot")],
            preconditions: vec![],
            subtasks: vec![Subtask {
                task: "get_object".into(),
                args: vec!["?r".into()],
            }],
        });
        let tdg = Tdg::build(domain.abstract_task("get_object").unwrap(), &domain).unwrap();
        // The recursive method is tagged and skipped; the two base methods
        // still enumerate.
        let paths = tdg.paths(&[]).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn undefined_subtask_is_a_domain_inconsistency() {
        let mut domain = sample_domain();
        domain.methods[0].subtasks.push(Subtask {
            task: "no_such_task".into(),
            args: vec![],
        });
        let err = Tdg::build(domain.abstract_task("get_object").unwrap(), &domain).unwrap_err();
        assert!(matches!(err, PlanError::DomainInconsistency { .. }));
    }
}
