//! Goal-model graph: ingestion, custom-property analysis, validity checks.

use std::collections::BTreeMap;

use serde_json::Value;

use mission_model::{PlanError, Result, TypedVar};

use crate::condition::{parse_achieve_condition, parse_context_condition, AchieveCondition, Context};
use crate::query::{parse_select_expr, QueriedProperty};

pub const ISTAR_GOAL: &str = "istar.Goal";
pub const ISTAR_TASK: &str = "istar.Task";
pub const ISTAR_AND_LINK: &str = "istar.AndRefinementLink";
pub const ISTAR_OR_LINK: &str = "istar.OrRefinementLink";

const GOAL_TYPE_PROP: &str = "GoalType";
const CONTROLS_PROP: &str = "Controls";
const MONITORS_PROP: &str = "Monitors";
const CONTEXT_PROP: &str = "CreationCondition";
const LOCATION_PROP: &str = "Location";
const ROBOT_NUMBER_PROP: &str = "RobotNumber";
const PARAMS_PROP: &str = "Params";
const ACHIEVE_CONDITION_PROP: &str = "AchieveCondition";
const QUERIED_PROPERTY_PROP: &str = "QueriedProperty";
const DESCRIPTION_PROP: &str = "Description";
const GROUP_PROP: &str = "Group";
const DIVISIBLE_PROP: &str = "Divisible";

/// Goal categories recognized by the pipeline. Goals without an explicit
/// `GoalType` default to `Perform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoalKind {
    Achieve,
    #[default]
    Perform,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Goal,
    Task,
}

/// How many robots a task requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotNumber {
    Fixed(u32),
    Range(u32, u32),
}

impl Default for RobotNumber {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

/// One vertex of the goal model.
#[derive(Debug, Clone)]
pub struct GmNode {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Children are linked through OR refinements.
    pub or_refined: bool,
    pub uuid: String,
    pub text: String,
    pub node_kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub goal_kind: GoalKind,
    pub controls: Vec<TypedVar>,
    pub monitors: Vec<TypedVar>,
    pub context: Option<Context>,
    pub achieve_condition: Option<AchieveCondition>,
    pub queried_property: Option<QueriedProperty>,
    pub location: Option<String>,
    pub params: Vec<String>,
    pub description: Option<String>,
    pub group: bool,
    pub divisible: bool,
    pub fixed_robot_num: bool,
    pub robot_num: RobotNumber,
}

impl GmNode {
    /// User-defined node id: the uppercased text before the colon
    /// (`"G1"`, `"AT2"`).
    pub fn name(&self) -> String {
        node_name(&self.text)
    }

    /// For task nodes, `(instance id, domain task name)` parsed from text of
    /// the form `"AT1: TaskName"`.
    pub fn task_id_and_name(&self) -> (String, String) {
        let id = node_name(&self.text);
        let name = self
            .text
            .split_once(':')
            .map(|(_, rest)| rest.trim())
            .unwrap_or("")
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        (id, name)
    }

    pub fn is_task(&self) -> bool {
        self.node_kind == NodeKind::Task
    }
}

/// Extract a node's user-defined id from its text.
pub fn node_name(text: &str) -> String {
    let head = text.split(':').next().unwrap_or("");
    head.trim().to_uppercase()
}

/// `Sequence(...)` declarations are collections; everything else binds a
/// single value.
pub fn is_collection_type(var_type: &str) -> bool {
    var_type.to_uppercase().contains("SEQUENCE")
}

/// The element type of a variable declaration: `Sequence(Room)` -> `Room`,
/// `Room` -> `Room`.
pub fn element_type(var_type: &str) -> &str {
    if let (Some(open), Some(close)) = (var_type.find('('), var_type.rfind(')')) {
        if open < close {
            return var_type[open + 1..close].trim();
        }
    }
    var_type
}

/// The goal model as a rooted tree. Children are kept in left-to-right
/// diagram order (by `x` coordinate), which fixes the DFS order used by the
/// whole pipeline.
#[derive(Debug, Clone)]
pub struct GoalModel {
    nodes: Vec<GmNode>,
    root: Option<usize>,
}

impl GoalModel {
    /// Ingest the istar JSON shape: `actors[].nodes[]` plus `links[]`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut nodes: Vec<GmNode> = Vec::new();
        let mut uuid_index: BTreeMap<String, usize> = BTreeMap::new();

        let actors = value
            .get("actors")
            .and_then(Value::as_array)
            .ok_or_else(|| PlanError::MalformedGoalModel {
                node: "goal model".into(),
                detail: "missing actors array".into(),
            })?;

        for actor in actors {
            let actor_nodes = actor
                .get("nodes")
                .and_then(Value::as_array)
                .ok_or_else(|| PlanError::MalformedGoalModel {
                    node: "goal model".into(),
                    detail: "actor without nodes array".into(),
                })?;
            for raw in actor_nodes {
                let node = parse_node(raw)?;
                uuid_index.insert(node.uuid.clone(), nodes.len());
                nodes.push(node);
            }
        }

        let links = value.get("links").and_then(Value::as_array);
        if let Some(links) = links {
            for link in links {
                let link_type = link.get("type").and_then(Value::as_str).unwrap_or("");
                if link_type != ISTAR_AND_LINK && link_type != ISTAR_OR_LINK {
                    continue;
                }
                let source = link.get("source").and_then(Value::as_str).unwrap_or("");
                let target = link.get("target").and_then(Value::as_str).unwrap_or("");
                let (Some(&child), Some(&parent)) =
                    (uuid_index.get(source), uuid_index.get(target))
                else {
                    return Err(PlanError::MalformedGoalModel {
                        node: "goal model".into(),
                        detail: format!("refinement link references unknown node ({source} -> {target})"),
                    });
                };
                nodes[child].parent = Some(parent);
                nodes[parent].children.push(child);
                if link_type == ISTAR_OR_LINK {
                    nodes[parent].or_refined = true;
                }
            }
        }

        // Diagram order: children left to right.
        let positions: Vec<f64> = nodes.iter().map(|n| n.x).collect();
        for node in &mut nodes {
            node.children
                .sort_by(|&a, &b| positions[a].total_cmp(&positions[b]));
        }

        let root = nodes.iter().position(|n| n.parent.is_none());
        Ok(Self { nodes, root })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn node(&self, id: usize) -> &GmNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (usize, &GmNode)> {
        self.nodes.iter().enumerate()
    }

    /// Pre-order DFS from the root, children in diagram order.
    pub fn dfs(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let Some(root) = self.root else {
            return order;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Find a node by its user-defined id (`"G1"`, `"AT2"`).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    /// Structural validity checks over variable declarations and per-kind
    /// properties. Fails on the first invalid construct.
    pub fn check_validity(&self) -> Result<()> {
        let mut declared: BTreeMap<String, String> = BTreeMap::new();

        for id in self.dfs() {
            let node = &self.nodes[id];
            let name = node.name();

            for var in &node.monitors {
                if !declared.contains_key(&var.name) {
                    return Err(PlanError::MalformedGoalModel {
                        node: name,
                        detail: format!(
                            "undeclared monitored variable [{}] of type [{}]",
                            var.name, var.sort
                        ),
                    });
                }
            }

            for var in &node.controls {
                if declared.contains_key(&var.name) {
                    return Err(PlanError::MalformedGoalModel {
                        node: name,
                        detail: format!("redeclaration of variable [{}]", var.name),
                    });
                }
                declared.insert(var.name.clone(), var.sort.clone());
            }

            match node.goal_kind {
                GoalKind::Achieve => {
                    let Some(condition) = &node.achieve_condition else {
                        return Err(PlanError::MalformedGoalModel {
                            node: name,
                            detail: "Achieve goal without an AchieveCondition".into(),
                        });
                    };
                    if let Some(forall) = &condition.forall {
                        if !node.monitors.iter().any(|v| v.name == forall.iterated_var) {
                            return Err(PlanError::MalformedGoalModel {
                                node: name,
                                detail: format!(
                                    "forAll iterated variable [{}] is not monitored",
                                    forall.iterated_var
                                ),
                            });
                        }
                        if !node.controls.iter().any(|v| v.name == forall.iteration_var) {
                            return Err(PlanError::MalformedGoalModel {
                                node: name,
                                detail: format!(
                                    "forAll iteration variable [{}] is not controlled",
                                    forall.iteration_var
                                ),
                            });
                        }
                    }
                }
                GoalKind::Query => {
                    let Some(qp) = &node.queried_property else {
                        return Err(PlanError::MalformedGoalModel {
                            node: name,
                            detail: "Query goal without a QueriedProperty".into(),
                        });
                    };
                    let Some(first) = node.controls.first() else {
                        return Err(PlanError::MalformedGoalModel {
                            node: name,
                            detail: "Query goal declares no controlled variable".into(),
                        });
                    };
                    let base = element_type(&first.sort);
                    if qp.query_var.sort != base {
                        return Err(PlanError::MalformedGoalModel {
                            node: name,
                            detail: format!(
                                "query variable type [{}] differs from controlled variable base type [{}]",
                                qp.query_var.sort, base
                            ),
                        });
                    }
                }
                GoalKind::Perform => {}
            }

            if node.goal_kind != GoalKind::Achieve && node.achieve_condition.is_some() {
                return Err(PlanError::MalformedGoalModel {
                    node: name,
                    detail: "AchieveCondition on a non-Achieve goal".into(),
                });
            }
            if node.goal_kind != GoalKind::Query && node.queried_property.is_some() {
                return Err(PlanError::MalformedGoalModel {
                    node: name,
                    detail: "QueriedProperty on a non-Query goal".into(),
                });
            }
        }

        Ok(())
    }
}

fn parse_node(raw: &Value) -> Result<GmNode> {
    let text = raw
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let node_type = raw.get("type").and_then(Value::as_str).unwrap_or("");
    let node_kind = match node_type {
        ISTAR_GOAL => NodeKind::Goal,
        ISTAR_TASK => NodeKind::Task,
        other => {
            return Err(PlanError::MalformedGoalModel {
                node: node_name(&text),
                detail: format!("unknown node type [{other}]"),
            })
        }
    };

    let mut node = GmNode {
        parent: None,
        children: Vec::new(),
        or_refined: false,
        uuid: raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        text,
        node_kind,
        x: raw.get("x").and_then(Value::as_f64).unwrap_or(0.0),
        y: raw.get("y").and_then(Value::as_f64).unwrap_or(0.0),
        goal_kind: GoalKind::Perform,
        controls: Vec::new(),
        monitors: Vec::new(),
        context: None,
        achieve_condition: None,
        queried_property: None,
        location: None,
        params: Vec::new(),
        description: None,
        group: true,
        divisible: true,
        fixed_robot_num: true,
        robot_num: RobotNumber::default(),
    };

    let props = raw.get("customProperties").and_then(Value::as_object);
    let mut raw_achieve: Option<String> = None;
    let mut raw_query: Option<String> = None;

    if let Some(props) = props {
        for (key, value) in props {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match key.as_str() {
                GOAL_TYPE_PROP => {
                    node.goal_kind = match value.as_str() {
                        "Achieve" => GoalKind::Achieve,
                        "Query" => GoalKind::Query,
                        "Perform" => GoalKind::Perform,
                        other => {
                            tracing::warn!(
                                node = %node.name(),
                                goal_type = other,
                                "invalid goal type, defaulting to Perform"
                            );
                            GoalKind::Perform
                        }
                    };
                }
                GROUP_PROP => {
                    node.group = !value.trim().eq_ignore_ascii_case("false");
                }
                DIVISIBLE_PROP => {
                    node.divisible = !value.trim().eq_ignore_ascii_case("false");
                }
                CONTROLS_PROP => {
                    if !value.trim().is_empty() {
                        node.controls = parse_var_decls(&value, &node.text)?;
                    }
                }
                MONITORS_PROP => {
                    if !value.trim().is_empty() {
                        node.monitors = parse_var_decls(&value, &node.text)?;
                    }
                }
                CONTEXT_PROP => {
                    if !value.trim().is_empty() {
                        node.context = Some(parse_context_condition(&value, &node.name())?);
                    }
                }
                LOCATION_PROP => {
                    if !value.trim().is_empty() {
                        node.location = Some(value.trim().to_string());
                    }
                }
                ROBOT_NUMBER_PROP => {
                    if !value.trim().is_empty() {
                        node.robot_num = parse_robot_number(&value, &node.name())?;
                        node.fixed_robot_num = matches!(node.robot_num, RobotNumber::Fixed(_));
                    }
                }
                PARAMS_PROP => {
                    node.params = value
                        .split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect();
                }
                ACHIEVE_CONDITION_PROP => raw_achieve = Some(value),
                QUERIED_PROPERTY_PROP => raw_query = Some(value),
                DESCRIPTION_PROP => node.description = Some(value),
                other => {
                    return Err(PlanError::MalformedGoalModel {
                        node: node.name(),
                        detail: format!("invalid custom property [{other}]"),
                    })
                }
            }
        }
    }

    match node.goal_kind {
        GoalKind::Achieve => {
            if let Some(raw) = raw_achieve.take() {
                node.achieve_condition = Some(parse_achieve_condition(&raw, &node.name())?);
            }
        }
        GoalKind::Query => {
            if let Some(raw) = raw_query.take() {
                node.queried_property = Some(parse_select_expr(&raw, &node.name())?);
            }
        }
        GoalKind::Perform => {}
    }

    // Properties left over for the wrong goal kind stay recorded so the
    // validity pass can reject them with a proper error.
    if let Some(raw) = raw_achieve {
        node.achieve_condition = Some(parse_achieve_condition(&raw, &node.name())?);
    }
    if let Some(raw) = raw_query {
        node.queried_property = Some(parse_select_expr(&raw, &node.name())?);
    }

    Ok(node)
}

/// Parse an OCL variable declaration list: `v : Room, rooms : Sequence(Room)`.
fn parse_var_decls(decl: &str, node_text: &str) -> Result<Vec<TypedVar>> {
    let mut vars = Vec::new();
    for part in decl.split(',') {
        let (name, sort) = match part.split_once(':') {
            Some((name, sort)) => (name.trim(), sort.trim()),
            None => (part.trim(), ""),
        };
        if name.is_empty() {
            return Err(PlanError::MalformedGoalModel {
                node: node_name(node_text),
                detail: format!("invalid variable declaration [{part}]"),
            });
        }
        vars.push(TypedVar::new(name, sort));
    }
    Ok(vars)
}

/// Parse the `RobotNumber` attribute: either a fixed count (`"2"`) or a
/// range (`"[2,5]"`).
fn parse_robot_number(text: &str, node: &str) -> Result<RobotNumber> {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix('[') {
        let inner = stripped.trim_end_matches(']');
        let (lo, hi) = inner.split_once(',').ok_or_else(|| PlanError::MalformedGoalModel {
            node: node.to_string(),
            detail: format!("invalid RobotNumber range [{text}]"),
        })?;
        let lo = lo.trim().parse().map_err(|_| PlanError::MalformedGoalModel {
            node: node.to_string(),
            detail: format!("invalid RobotNumber lower bound [{lo}]"),
        })?;
        let hi = hi.trim().parse().map_err(|_| PlanError::MalformedGoalModel {
            node: node.to_string(),
            detail: format!("invalid RobotNumber upper bound [{hi}]"),
        })?;
        Ok(RobotNumber::Range(lo, hi))
    } else {
        let n = text.parse().map_err(|_| PlanError::MalformedGoalModel {
            node: node.to_string(),
            detail: format!("invalid RobotNumber [{text}]"),
        })?;
        Ok(RobotNumber::Fixed(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(nodes: Vec<Value>, links: Vec<Value>) -> Value {
        json!({
            "actors": [{"id": "a0", "nodes": nodes}],
            "links": links,
        })
    }

    fn goal(id: &str, text: &str, x: f64, props: Value) -> Value {
        json!({"id": id, "text": text, "type": ISTAR_GOAL, "x": x, "y": 0.0,
               "customProperties": props})
    }

    #[test]
    fn children_follow_diagram_order() {
        let value = model(
            vec![
                goal("n0", "G1: Root", 50.0, json!({})),
                goal("n1", "G3: Right", 90.0, json!({})),
                goal("n2", "G2: Left", 10.0, json!({})),
            ],
            vec![
                json!({"type": ISTAR_AND_LINK, "source": "n1", "target": "n0"}),
                json!({"type": ISTAR_AND_LINK, "source": "n2", "target": "n0"}),
            ],
        );
        let gm = GoalModel::from_json(&value).unwrap();
        let root = gm.root().unwrap();
        let names: Vec<String> = gm.node(root).children.iter().map(|&c| gm.node(c).name()).collect();
        assert_eq!(names, vec!["G2", "G3"]);
    }

    #[test]
    fn undeclared_monitored_variable_is_rejected() {
        let value = model(
            vec![goal(
                "n0",
                "G1: Root",
                0.0,
                json!({"Monitors": "rooms : Sequence(Room)"}),
            )],
            vec![],
        );
        let gm = GoalModel::from_json(&value).unwrap();
        let err = gm.check_validity().unwrap_err();
        assert!(matches!(err, PlanError::MalformedGoalModel { .. }));
    }

    #[test]
    fn achieve_condition_on_perform_goal_is_rejected() {
        let value = model(
            vec![goal(
                "n0",
                "G1: Root",
                0.0,
                json!({"AchieveCondition": "rooms->forAll(r | )"}),
            )],
            vec![],
        );
        let gm = GoalModel::from_json(&value).unwrap();
        assert!(gm.check_validity().is_err());
    }

    #[test]
    fn sequence_types_are_collections() {
        assert!(is_collection_type("Sequence(Room)"));
        assert!(!is_collection_type("Room"));
        assert_eq!(element_type("Sequence(Room)"), "Room");
        assert_eq!(element_type("Room"), "Room");
    }
}
