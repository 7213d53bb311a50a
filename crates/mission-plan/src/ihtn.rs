//! iHTN lowering: one fully ground, totally ordered plan tree per valid
//! mission and per SEQ/FB-compatible ordering of its decompositions.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{json, Value};

use mission_model::{ArgValue, PlanError, Result};

use crate::atg::{AtGraph, Decomposition};
use crate::constraints::ConstraintSet;
use crate::tdg::TdgContent;
use crate::validator::Mission;

/// One emitted iHTN: its file name and the flat-map JSON document.
#[derive(Debug, Clone)]
pub struct IhtnTree {
    pub file_name: String,
    pub json: Value,
}

#[derive(Debug, Clone)]
enum IhtnNode {
    Task {
        name: String,
        agents: BTreeSet<String>,
    },
    Method {
        name: String,
        agents: BTreeSet<String>,
    },
    Action {
        name: String,
        agents: BTreeSet<String>,
        locations: Vec<String>,
    },
}

type IhtnGraph = DiGraph<IhtnNode, ()>;

/// Lowers valid missions into iHTN trees.
pub struct IhtnEmitter<'a> {
    pub graph: &'a AtGraph,
    pub constraints: &'a ConstraintSet,
    /// Sorts whose non-ground arguments resolve as agents.
    pub robot_sorts: &'a [String],
}

impl IhtnEmitter<'_> {
    /// Emit every iHTN, ordered lexicographically over
    /// `(mission index, ordering index)` and named `ihtn_k.json` across the
    /// whole run.
    pub fn emit(&self, missions: &[Mission]) -> Result<Vec<IhtnTree>> {
        let successors = self.constraints.successors();
        let mut out = Vec::new();
        let mut counter = 1usize;

        for mission in missions {
            let resolution = self.resolve_agents(mission)?;
            let ids: Vec<NodeIndex> = mission.decompositions.iter().map(|(id, _)| *id).collect();
            let by_id: BTreeMap<NodeIndex, &Decomposition> = mission
                .decompositions
                .iter()
                .map(|(id, d)| (*id, d))
                .collect();

            let orderings = self.find_orderings(&ids, &successors);
            for ordering in orderings {
                let tree = self.build_tree(&ordering, &by_id, &resolution)?;
                let json = serialize_tree(&tree, &resolution);
                out.push(IhtnTree {
                    file_name: format!("ihtn_{counter}.json"),
                    json,
                });
                counter += 1;
            }
        }

        Ok(out)
    }

    /// Every total ordering of the mission's decompositions consistent with
    /// the SEQ/FB successor map, by backtracking over the id list.
    fn find_orderings(
        &self,
        ids: &[NodeIndex],
        successors: &BTreeMap<NodeIndex, Vec<NodeIndex>>,
    ) -> Vec<Vec<NodeIndex>> {
        let mut orderings = Vec::new();
        let mut current = Vec::with_capacity(ids.len());
        let mut remaining: Vec<NodeIndex> = ids.to_vec();
        self.ordering_rec(&mut current, &mut remaining, successors, &mut orderings);
        orderings
    }

    fn ordering_rec(
        &self,
        current: &mut Vec<NodeIndex>,
        remaining: &mut Vec<NodeIndex>,
        successors: &BTreeMap<NodeIndex, Vec<NodeIndex>>,
        orderings: &mut Vec<Vec<NodeIndex>>,
    ) {
        if remaining.is_empty() {
            orderings.push(current.clone());
            return;
        }

        for index in 0..remaining.len() {
            let candidate = remaining[index];
            // A candidate is placeable when none of its required successors
            // is already placed.
            let candidate_task = self.task_of(candidate);
            let blocked = successors
                .get(&candidate_task)
                .map(|succ| {
                    current
                        .iter()
                        .any(|placed| succ.contains(&self.task_of(*placed)))
                })
                .unwrap_or(false);
            if blocked {
                continue;
            }

            remaining.remove(index);
            current.push(candidate);
            self.ordering_rec(current, remaining, successors, orderings);
            current.pop();
            remaining.insert(index, candidate);
        }
    }

    fn task_of(&self, decomposition: NodeIndex) -> NodeIndex {
        self.graph[decomposition]
            .parent
            .expect("decomposition nodes always have a task parent")
    }

    /// Partition every decomposition's arguments into locations and agents,
    /// resolving non-ground agent arguments either from a non-coop partner
    /// that allows sharing or as fresh placeholder agents.
    fn resolve_agents(&self, mission: &Mission) -> Result<AgentResolution> {
        let mut resolution = AgentResolution::default();
        let partners = self.constraints.non_coop_partners();

        for (d_index, d) in &mission.decompositions {
            let task = self.task_of(*d_index);
            let mut agents: Vec<String> = Vec::new();

            for binding in &d.arguments {
                match &binding.value {
                    Some(ArgValue::Single(value)) => {
                        if !d.at.is_location_value(value) {
                            resolution.all_agents.insert(value.clone());
                            agents.push(value.clone());
                        }
                    }
                    Some(ArgValue::Collection(values)) => {
                        let all_locations = values.iter().all(|v| d.at.is_location_value(v));
                        if !all_locations {
                            return Err(PlanError::Unsupported {
                                node: d.at.id.clone(),
                                detail: format!(
                                    "collection-typed agent argument [{}]",
                                    binding.var.name
                                ),
                            });
                        }
                    }
                    None => {
                        if !self.robot_sorts.contains(&binding.var.sort) {
                            return Err(PlanError::Unsupported {
                                node: d.at.id.clone(),
                                detail: format!(
                                    "non-ground argument [{}] of non-robot sort [{}]",
                                    binding.var.name, binding.var.sort
                                ),
                            });
                        }

                        let reused = self.reuse_partner_agent(
                            task,
                            &partners,
                            &resolution,
                            &agents,
                        );
                        match reused {
                            Some(agent) => agents.push(agent),
                            None => {
                                let placeholder = format!(
                                    "{}@{}",
                                    binding.var.name.trim_start_matches('?'),
                                    d.id.to_lowercase()
                                );
                                let serial = format!(
                                    "r{}",
                                    resolution.placeholder_names.len() + 1
                                );
                                resolution
                                    .placeholder_names
                                    .insert(placeholder.clone(), serial);
                                resolution.all_agents.insert(placeholder.clone());
                                agents.push(placeholder);
                            }
                        }
                    }
                }
            }

            resolution.agents_map.insert(*d_index, agents);
            resolution.resolved_tasks.push((task, *d_index));
        }

        Ok(resolution)
    }

    /// A placeholder agent borrowed from an already-resolved non-coop
    /// partner. Sharing requires the pair to be both group and divisible;
    /// `group = false` and non-divisible pairs always get disjoint agents.
    fn reuse_partner_agent(
        &self,
        task: NodeIndex,
        partners: &BTreeMap<NodeIndex, Vec<(NodeIndex, bool, bool)>>,
        resolution: &AgentResolution,
        already_taken: &[String],
    ) -> Option<String> {
        let task_partners = partners.get(&task)?;
        for (partner, group, divisible) in task_partners {
            if !group || !divisible {
                continue;
            }
            let Some(resolved) = resolution
                .resolved_tasks
                .iter()
                .find(|(t, _)| t == partner)
            else {
                continue;
            };
            let Some(partner_agents) = resolution.agents_map.get(&resolved.1) else {
                continue;
            };
            for agent in partner_agents {
                if agent.contains('@') && !already_taken.contains(agent) {
                    return Some(agent.clone());
                }
            }
        }
        None
    }

    /// Build the iHTN tree for one ordering: `ROOT` -> `ROOT_M` -> one task
    /// subtree per decomposition, reconstructed from its complete path.
    fn build_tree(
        &self,
        ordering: &[NodeIndex],
        by_id: &BTreeMap<NodeIndex, &Decomposition>,
        resolution: &AgentResolution,
    ) -> Result<IhtnGraph> {
        let mut tree = IhtnGraph::new();
        let root = tree.add_node(IhtnNode::Task {
            name: "ROOT".into(),
            agents: resolution.all_agents.clone(),
        });
        let root_method = tree.add_node(IhtnNode::Method {
            name: "ROOT_M".into(),
            agents: resolution.all_agents.clone(),
        });
        tree.add_edge(root, root_method, ());

        for d_index in ordering {
            let d = by_id[d_index];
            let task_agents: BTreeSet<String> = resolution
                .agents_map
                .get(d_index)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();

            let decomposition_node = tree.add_node(IhtnNode::Task {
                name: d.at.name.clone(),
                agents: task_agents,
            });
            tree.add_edge(root_method, decomposition_node, ());

            self.build_path_subtree(&mut tree, decomposition_node, d, *d_index, resolution)?;
        }

        Ok(tree)
    }

    fn build_path_subtree(
        &self,
        tree: &mut IhtnGraph,
        decomposition_node: NodeIndex,
        d: &Decomposition,
        d_index: NodeIndex,
        resolution: &AgentResolution,
    ) -> Result<()> {
        let mut path_to_tree: BTreeMap<usize, NodeIndex> = BTreeMap::new();

        for node in &d.complete_path.nodes {
            let Some(parent_id) = node.parent else {
                continue;
            };

            let tree_node = match &node.content {
                TdgContent::Method(method) => {
                    let mut agents = BTreeSet::new();
                    let mut agent_cursor = 0usize;
                    for var in &method.vars {
                        if let Some(agent) = self.argument_agent(
                            d,
                            d_index,
                            &var.name,
                            resolution,
                            &mut agent_cursor,
                        )? {
                            agents.insert(agent);
                        }
                    }
                    tree.add_node(IhtnNode::Method {
                        name: method.name.clone(),
                        agents,
                    })
                }
                TdgContent::Task(task) => {
                    let mut agents = BTreeSet::new();
                    let mut locations = Vec::new();
                    let mut agent_cursor = 0usize;
                    for var in task.original_vars() {
                        match self.argument_value(d, &var.name)? {
                            ResolvedArg::Location(locs) => locations.extend(locs),
                            ResolvedArg::Ground(value) => {
                                agents.insert(value);
                            }
                            ResolvedArg::NonGround => {
                                if let Some(agent) = self.placeholder_at(
                                    d_index,
                                    resolution,
                                    &mut agent_cursor,
                                ) {
                                    agents.insert(agent);
                                }
                            }
                        }
                    }

                    if node.is_primitive {
                        tree.add_node(IhtnNode::Action {
                            name: task.name.clone(),
                            agents,
                            locations,
                        })
                    } else {
                        tree.add_node(IhtnNode::Task {
                            name: task.name.clone(),
                            agents,
                        })
                    }
                }
            };
            path_to_tree.insert(node.id, tree_node);

            // The path root (id 0) is represented by the decomposition's
            // own task node.
            let parent_tree_node = if parent_id == 0 {
                decomposition_node
            } else {
                *path_to_tree
                    .get(&parent_id)
                    .expect("complete paths are listed parents-first")
            };
            tree.add_edge(parent_tree_node, tree_node, ());
        }

        Ok(())
    }

    /// The agent a method or task variable contributes, advancing the
    /// placeholder cursor for non-ground robot variables. Location values
    /// contribute nothing here.
    fn argument_agent(
        &self,
        d: &Decomposition,
        d_index: NodeIndex,
        var_name: &str,
        resolution: &AgentResolution,
        agent_cursor: &mut usize,
    ) -> Result<Option<String>> {
        match self.argument_value(d, var_name)? {
            ResolvedArg::Location(_) => Ok(None),
            ResolvedArg::Ground(value) => Ok(Some(value)),
            ResolvedArg::NonGround => {
                Ok(self.placeholder_at(d_index, resolution, agent_cursor))
            }
        }
    }

    fn placeholder_at(
        &self,
        d_index: NodeIndex,
        resolution: &AgentResolution,
        agent_cursor: &mut usize,
    ) -> Option<String> {
        let agents = resolution.agents_map.get(&d_index)?;
        let placeholder = agents
            .iter()
            .filter(|a| a.contains('@'))
            .nth(*agent_cursor)
            .cloned();
        if placeholder.is_some() {
            *agent_cursor += 1;
        }
        placeholder
    }

    fn argument_value(&self, d: &Decomposition, var_name: &str) -> Result<ResolvedArg> {
        let binding = d
            .arguments
            .iter()
            .find(|b| b.var.name == var_name)
            .ok_or_else(|| PlanError::Unsupported {
                node: d.at.id.clone(),
                detail: format!("no binding recorded for variable [{var_name}]"),
            })?;

        match &binding.value {
            Some(ArgValue::Single(value)) => {
                if d.at.is_location_value(value) {
                    Ok(ResolvedArg::Location(vec![value.clone()]))
                } else {
                    Ok(ResolvedArg::Ground(value.clone()))
                }
            }
            Some(ArgValue::Collection(values)) => Ok(ResolvedArg::Location(values.clone())),
            None => Ok(ResolvedArg::NonGround),
        }
    }
}

enum ResolvedArg {
    Location(Vec<String>),
    Ground(String),
    NonGround,
}

#[derive(Debug, Clone, Default)]
struct AgentResolution {
    /// Per decomposition node: its ordered agent arguments (ground
    /// constants or `var@decomposition` placeholders).
    agents_map: BTreeMap<NodeIndex, Vec<String>>,
    /// Placeholder -> serial symbolic agent (`r1`, `r2`, ...).
    placeholder_names: BTreeMap<String, String>,
    all_agents: BTreeSet<String>,
    /// `(task node, decomposition node)` in resolution order.
    resolved_tasks: Vec<(NodeIndex, NodeIndex)>,
}

impl AgentResolution {
    fn display_agent(&self, agent: &str) -> String {
        self.placeholder_names
            .get(agent)
            .cloned()
            .unwrap_or_else(|| agent.to_string())
    }
}

/// Serialize an iHTN tree as the flat node map `"0".."n-1"`, ids assigned in
/// DFS order; every node carries `name`, `type`, `parent`, `children`, and
/// `agents`, actions additionally `locations`.
fn serialize_tree(tree: &IhtnGraph, resolution: &AgentResolution) -> Value {
    let mut order: Vec<NodeIndex> = Vec::with_capacity(tree.node_count());
    let mut parent_of: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
    let mut stack = vec![NodeIndex::new(0)];
    while let Some(node) = stack.pop() {
        order.push(node);
        let mut children: Vec<NodeIndex> = tree.neighbors(node).collect();
        children.reverse();
        for &child in children.iter().rev() {
            parent_of.insert(child, node);
            stack.push(child);
        }
    }

    let dfs_id: BTreeMap<NodeIndex, usize> =
        order.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let mut map = serde_json::Map::new();
    for (id, &node) in order.iter().enumerate() {
        let parent = parent_of
            .get(&node)
            .map(|p| dfs_id[p] as i64)
            .unwrap_or(-1);

        let mut children: Vec<NodeIndex> = tree.neighbors(node).collect();
        children.reverse();
        let children_ids: Vec<String> =
            children.iter().map(|c| dfs_id[c].to_string()).collect();

        let entry = match &tree[node] {
            IhtnNode::Task { name, agents } => json!({
                "name": name,
                "type": "task",
                "parent": parent,
                "children": children_ids,
                "agents": render_agents(agents, resolution),
            }),
            IhtnNode::Method { name, agents } => json!({
                "name": name,
                "type": "method",
                "parent": parent,
                "children": children_ids,
                "agents": render_agents(agents, resolution),
            }),
            IhtnNode::Action {
                name,
                agents,
                locations,
            } => json!({
                "name": name,
                "type": "action",
                "parent": parent,
                "children": children_ids,
                "agents": render_agents(agents, resolution),
                "locations": locations,
            }),
        };
        map.insert(id.to_string(), entry);
    }

    Value::Object(map)
}

fn render_agents(agents: &BTreeSet<String>, resolution: &AgentResolution) -> Vec<String> {
    agents.iter().map(|a| resolution.display_agent(a)).collect()
}
