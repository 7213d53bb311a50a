//! Runtime annotation tree: goal-model expansion, forAll replication,
//! instance renaming, and textual rendering.

use std::collections::BTreeMap;

use mission_model::{ArgValue, GmVariableMap, PlanError, Result};

use crate::condition::AchieveCondition;
use crate::knowledge::KnowledgeBase;
use crate::model::{GmNode, GoalKind, GoalModel, NodeKind};
use crate::query::{solve_query, BoundVariables};
use crate::rannot::parse_node_annotation;
use crate::{OP_FALLBACK, OP_PAR, OP_SEQ};

/// What a runtime-annotation node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotKind {
    Operator,
    Goal,
    Task,
    MeansEnd,
    Empty,
}

/// One node of the runtime annotation. The tree owns its children; deep
/// copies for forAll replication are plain clones.
#[derive(Debug, Clone)]
pub struct RuntimeAnnot {
    pub kind: AnnotKind,
    /// Operator symbol, or the node's user id.
    pub content: String,
    /// The goal this operator node was expanded from; empty for synthesized
    /// operators (notably forAll-generated parallels).
    pub related_goal: String,
    pub children: Vec<RuntimeAnnot>,
    pub non_coop: bool,
    pub group: bool,
    pub divisible: bool,
    pub or_decomposition: bool,
}

impl RuntimeAnnot {
    pub fn empty() -> Self {
        Self {
            kind: AnnotKind::Empty,
            content: String::new(),
            related_goal: String::new(),
            children: Vec::new(),
            non_coop: false,
            group: true,
            divisible: true,
            or_decomposition: false,
        }
    }

    pub fn operator(symbol: &str, children: Vec<RuntimeAnnot>) -> Self {
        Self {
            kind: AnnotKind::Operator,
            content: symbol.to_string(),
            children,
            ..Self::empty()
        }
    }

    pub fn leaf(kind: AnnotKind, content: String) -> Self {
        Self {
            kind,
            content,
            ..Self::empty()
        }
    }

    pub fn is_operator(&self) -> bool {
        self.kind == AnnotKind::Operator
    }

    /// A parallel operator synthesized by forAll replication: `#` with no
    /// related goal.
    pub fn is_forall_parallel(&self) -> bool {
        self.is_operator() && self.content == OP_PAR && self.related_goal.is_empty()
    }

    /// All abstract-task instance ids in DFS order.
    pub fn task_instances(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_task_instances(&mut out);
        out
    }

    fn collect_task_instances(&self, out: &mut Vec<String>) {
        if self.kind == AnnotKind::Task {
            out.push(self.content.clone());
        }
        for child in &self.children {
            child.collect_task_instances(out);
        }
    }
}

/// Expand the goal model into its runtime annotation.
///
/// Walks the model depth-first: query goals bind their controlled variables
/// against the knowledge base, non-leaf nodes are replaced by their parsed
/// (or synthesized) annotations, and forAll achieve goals whose bound
/// collection has more than one element are replicated under a parallel
/// operator. Returns `None` for an empty goal model.
pub fn build_runtime_annotation(
    gm: &GoalModel,
    kb: &KnowledgeBase,
    bound: &mut BoundVariables,
    var_map: &mut GmVariableMap,
) -> Result<Option<RuntimeAnnot>> {
    let Some(root) = gm.root() else {
        return Ok(None);
    };
    let mut annot = expand_node(gm, root, kb, bound, var_map)?;
    rename_task_instances(&mut annot);
    Ok(Some(annot))
}

fn expand_node(
    gm: &GoalModel,
    node_id: usize,
    kb: &KnowledgeBase,
    bound: &mut BoundVariables,
    var_map: &mut GmVariableMap,
) -> Result<RuntimeAnnot> {
    let node = gm.node(node_id);
    let name = node.name();

    let mut forall_condition: Option<AchieveCondition> = None;
    if node.node_kind == NodeKind::Goal {
        match node.goal_kind {
            GoalKind::Query => {
                let property = node.queried_property.as_ref().ok_or_else(|| {
                    PlanError::MalformedGoalModel {
                        node: name.clone(),
                        detail: "Query goal without a QueriedProperty".into(),
                    }
                })?;
                solve_query(property, &name, &node.controls, kb, bound, var_map)?;
            }
            GoalKind::Achieve => {
                if let Some(condition) = &node.achieve_condition {
                    if condition.forall.is_some() {
                        forall_condition = Some(condition.clone());
                    }
                }
            }
            GoalKind::Perform => {}
        }
    }

    let mut annot = if node.children.is_empty() {
        let kind = match node.node_kind {
            NodeKind::Goal => AnnotKind::Goal,
            NodeKind::Task => AnnotKind::Task,
        };
        RuntimeAnnot::leaf(kind, name.clone())
    } else {
        let mut shape = shape_for(node, &name)?;
        resolve_children(&mut shape, gm, node, kb, bound, var_map)?;
        shape
    };

    apply_node_flags(&mut annot, node);

    if let Some(condition) = forall_condition {
        let forall = condition.forall.as_ref().expect("checked above");
        let instances = match var_map.get(&forall.iterated_var) {
            Some(binding) => match &binding.value {
                ArgValue::Collection(values) => values.len(),
                ArgValue::Single(_) => 1,
            },
            None => {
                return Err(PlanError::MalformedGoalModel {
                    node: name,
                    detail: format!(
                        "forAll iterates over unbound variable [{}]",
                        forall.iterated_var
                    ),
                })
            }
        };

        if instances > 1 {
            let template = annot.clone();
            let children = (0..instances).map(|_| template.clone()).collect();
            let mut parallel = RuntimeAnnot::operator(OP_PAR, children);
            // Replication keeps the replicated subtree's flags on the
            // copies; the synthesized parallel resets the sharing flags.
            parallel.non_coop = annot.non_coop;
            annot = parallel;
        }
    }

    Ok(annot)
}

/// The annotation shape of a non-leaf node: its parsed bracket annotation,
/// a synthesized operator when the annotation is absent, or a means-end
/// link for single-child goals.
fn shape_for(node: &GmNode, name: &str) -> Result<RuntimeAnnot> {
    let parsed = parse_node_annotation(&node.text, name)?;

    if node.children.len() == 1 {
        let mut annot = RuntimeAnnot::empty();
        annot.kind = AnnotKind::MeansEnd;
        annot.content = name.to_string();
        // The single child placeholder is filled during resolution.
        annot.children.push(RuntimeAnnot::leaf(AnnotKind::Empty, String::new()));
        return Ok(annot);
    }

    match parsed {
        Some(mut annot) => {
            fill_related_goal(&mut annot, name);
            annot.or_decomposition = node.or_refined;
            Ok(annot)
        }
        None => {
            let symbol = if node.or_refined { OP_FALLBACK } else { OP_SEQ };
            let mut annot = RuntimeAnnot::operator(symbol, Vec::new());
            annot.related_goal = name.to_string();
            annot.or_decomposition = node.or_refined;
            for _ in &node.children {
                annot.children.push(RuntimeAnnot::leaf(AnnotKind::Empty, String::new()));
            }
            Ok(annot)
        }
    }
}

/// Tag a parsed annotation's operator nodes, nested ones included, with the
/// goal they were expanded from. Only forAll replication produces operators
/// without a related goal.
fn fill_related_goal(annot: &mut RuntimeAnnot, goal: &str) {
    if annot.is_operator() {
        annot.related_goal = goal.to_string();
        for child in &mut annot.children {
            fill_related_goal(child, goal);
        }
    }
}

/// Replace the child placeholders of a freshly shaped annotation with the
/// recursively expanded child subtrees.
fn resolve_children(
    shape: &mut RuntimeAnnot,
    gm: &GoalModel,
    node: &GmNode,
    kb: &KnowledgeBase,
    bound: &mut BoundVariables,
    var_map: &mut GmVariableMap,
) -> Result<()> {
    let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
    for &child in &node.children {
        by_name.insert(gm.node(child).name(), child);
    }

    // Positional placeholders (means-end and synthesized operators) consume
    // the children in diagram order; named leaves resolve by id.
    let mut positional = node.children.iter().copied();
    resolve_rec(shape, gm, &by_name, &mut positional, kb, bound, var_map, &node.name())?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn resolve_rec(
    annot: &mut RuntimeAnnot,
    gm: &GoalModel,
    by_name: &BTreeMap<String, usize>,
    positional: &mut impl Iterator<Item = usize>,
    kb: &KnowledgeBase,
    bound: &mut BoundVariables,
    var_map: &mut GmVariableMap,
    parent_name: &str,
) -> Result<()> {
    if annot.is_operator() || annot.kind == AnnotKind::MeansEnd {
        for child in &mut annot.children {
            resolve_rec(child, gm, by_name, positional, kb, bound, var_map, parent_name)?;
        }
        debug_assert!(!annot.children.is_empty(), "operator without children");
        return Ok(());
    }

    let child_id = if annot.content.is_empty() {
        positional.next().ok_or_else(|| PlanError::MalformedGoalModel {
            node: parent_name.to_string(),
            detail: "annotation references more children than the model declares".into(),
        })?
    } else {
        let name = annot.content.clone();
        *by_name.get(&name).ok_or_else(|| PlanError::InvalidExpression {
            node: parent_name.to_string(),
            detail: format!("annotation references unknown child [{name}]"),
        })?
    };

    *annot = expand_node(gm, child_id, kb, bound, var_map)?;
    Ok(())
}

fn apply_node_flags(annot: &mut RuntimeAnnot, node: &GmNode) {
    annot.non_coop = !node.group || !node.divisible;
    annot.group = node.group;
    annot.divisible = node.divisible;
}

/// Rename abstract-task instances replicated under forAll parallels:
/// each task leaf below such a parallel becomes `<base>_<i>`, with a
/// per-base counter advancing in DFS order.
pub fn rename_task_instances(annot: &mut RuntimeAnnot) {
    let mut counters: BTreeMap<String, usize> = BTreeMap::new();
    for instance in annot.task_instances() {
        counters.entry(instance).or_insert(1);
    }
    rename_rec(annot, &mut counters, false);
}

fn rename_rec(annot: &mut RuntimeAnnot, counters: &mut BTreeMap<String, usize>, in_forall: bool) {
    match annot.kind {
        AnnotKind::Task => {
            if in_forall {
                let base = annot.content.clone();
                let counter = counters.entry(base.clone()).or_insert(1);
                annot.content = format!("{base}_{counter}");
                *counter += 1;
            }
        }
        AnnotKind::MeansEnd => {
            if let Some(child) = annot.children.first_mut() {
                rename_rec(child, counters, in_forall);
            }
        }
        AnnotKind::Operator => {
            let nested_forall = in_forall || annot.is_forall_parallel();
            for child in &mut annot.children {
                rename_rec(child, counters, nested_forall);
            }
        }
        AnnotKind::Goal | AnnotKind::Empty => {}
    }
}

/// Render an annotation tree back to its textual form, wrapping non-coop
/// subtrees in `NC(...)`.
pub fn render_runtime_annot(annot: &RuntimeAnnot) -> String {
    let mut out = String::new();
    if annot.non_coop {
        out.push_str("NC(");
    }
    match annot.kind {
        AnnotKind::Operator => match annot.content.as_str() {
            crate::OP_OPT => {
                out.push_str("OPT(");
                out.push_str(&render_runtime_annot(&annot.children[0]));
                out.push(')');
            }
            crate::OP_FALLBACK => {
                out.push_str("FALLBACK(");
                let rendered: Vec<String> =
                    annot.children.iter().map(render_runtime_annot).collect();
                out.push_str(&rendered.join(","));
                out.push(')');
            }
            op => {
                if !annot.non_coop {
                    out.push('(');
                }
                let rendered: Vec<String> =
                    annot.children.iter().map(render_runtime_annot).collect();
                out.push_str(&rendered.join(op));
                if !annot.non_coop {
                    out.push(')');
                }
            }
        },
        AnnotKind::MeansEnd => {
            if let Some(child) = annot.children.first() {
                out.push_str(&render_runtime_annot(child));
            }
        }
        _ => out.push_str(&annot.content),
    }
    if annot.non_coop {
        out.push(')');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GoalModel;
    use serde_json::json;

    fn gm_value(nodes: Vec<serde_json::Value>, links: Vec<serde_json::Value>) -> serde_json::Value {
        json!({"actors": [{"id": "a0", "nodes": nodes}], "links": links})
    }

    fn world() -> KnowledgeBase {
        KnowledgeBase::new(json!({
            "world_db": {
                "robot": [
                    {"name": "r_a"},
                    {"name": "r_b"},
                    {"name": "r_c"},
                ],
            }
        }))
        .unwrap()
    }

    fn build(value: &serde_json::Value) -> RuntimeAnnot {
        let gm = GoalModel::from_json(value).unwrap();
        gm.check_validity().unwrap();
        let mut bound = BoundVariables::new();
        let mut vars = GmVariableMap::new();
        build_runtime_annotation(&gm, &world(), &mut bound, &mut vars)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn empty_goal_model_yields_no_annotation() {
        let gm = GoalModel::from_json(&gm_value(vec![], vec![])).unwrap();
        let mut bound = BoundVariables::new();
        let mut vars = GmVariableMap::new();
        let annot =
            build_runtime_annotation(&gm, &world(), &mut bound, &mut vars).unwrap();
        assert!(annot.is_none());
    }

    #[test]
    fn single_child_goal_becomes_means_end() {
        let value = gm_value(
            vec![
                json!({"id": "n0", "text": "G1: Do", "type": "istar.Goal", "x": 0.0, "y": 0.0,
                       "customProperties": {}}),
                json!({"id": "n1", "text": "AT1: Move", "type": "istar.Task", "x": 0.0, "y": 10.0,
                       "customProperties": {}}),
            ],
            vec![json!({"type": "istar.AndRefinementLink", "source": "n1", "target": "n0"})],
        );
        let annot = build(&value);
        assert_eq!(annot.kind, AnnotKind::MeansEnd);
        assert_eq!(annot.children[0].content, "AT1");
        assert_eq!(annot.children[0].kind, AnnotKind::Task);
    }

    #[test]
    fn forall_over_three_robots_replicates_subtree_with_unique_instances() {
        let value = gm_value(
            vec![
                json!({"id": "n0", "text": "G1: Mission", "type": "istar.Goal", "x": 0.0, "y": 0.0,
                       "customProperties": {}}),
                json!({"id": "n1", "text": "G2: Pick robots", "type": "istar.Goal", "x": -10.0, "y": 10.0,
                       "customProperties": {"GoalType": "Query",
                           "Controls": "robots : Sequence(robot)",
                           "QueriedProperty": "world_db->select(r:robot | )"}}),
                json!({"id": "n2", "text": "G3: Visit all", "type": "istar.Goal", "x": 10.0, "y": 10.0,
                       "customProperties": {"GoalType": "Achieve",
                           "Monitors": "robots : Sequence(robot)",
                           "Controls": "current : robot",
                           "AchieveCondition": "robots->forAll(current | )"}}),
                json!({"id": "n3", "text": "AT1: Move", "type": "istar.Task", "x": 10.0, "y": 20.0,
                       "customProperties": {}}),
            ],
            vec![
                json!({"type": "istar.AndRefinementLink", "source": "n1", "target": "n0"}),
                json!({"type": "istar.AndRefinementLink", "source": "n2", "target": "n0"}),
                json!({"type": "istar.AndRefinementLink", "source": "n3", "target": "n2"}),
            ],
        );
        let annot = build(&value);

        let instances = annot.task_instances();
        assert_eq!(instances, vec!["AT1_1", "AT1_2", "AT1_3"]);

        // The replicated subtree sits under a forAll parallel.
        fn find_forall(annot: &RuntimeAnnot) -> Option<&RuntimeAnnot> {
            if annot.is_forall_parallel() {
                return Some(annot);
            }
            annot.children.iter().find_map(find_forall)
        }
        let parallel = find_forall(&annot).expect("forAll parallel");
        assert_eq!(parallel.children.len(), 3);
    }

    #[test]
    fn rendering_wraps_non_coop_subtrees() {
        let mut annot = RuntimeAnnot::operator(
            OP_SEQ,
            vec![
                RuntimeAnnot::leaf(AnnotKind::Task, "AT1".into()),
                RuntimeAnnot::leaf(AnnotKind::Task, "AT2".into()),
            ],
        );
        annot.non_coop = true;
        assert_eq!(render_runtime_annot(&annot), "NC(AT1;AT2)");
    }
}
