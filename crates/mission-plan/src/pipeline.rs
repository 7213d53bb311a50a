//! End-to-end pipeline: domain and goal model in, iHTN trees out.

use mission_gm::query::BoundVariables;
use mission_gm::{build_runtime_annotation, render_runtime_annot, GoalModel, KnowledgeBase};
use mission_model::{
    Domain, GmVariableMap, PlanError, Result, SemanticMapping, VariableMapping, ROBOT_SORT,
    ROBOT_TEAM_SORT,
};

use crate::constraints::ConstraintSet;
use crate::decomposer::{MissionDecomposer, PathTable};
use crate::ihtn::{IhtnEmitter, IhtnTree};
use crate::tdg::Tdg;
use crate::validator::{ValidMissionGenerator, ValidatorConfig};

/// Pipeline policy knobs.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Treat a mission without valid decompositions as an error.
    pub strict: bool,
    pub max_candidates_per_operator_node: Option<usize>,
    /// Root sorts whose derived sorts count as agents; `robot`/`robotteam`
    /// when empty.
    pub agent_sorts: Vec<String>,
}

/// The full decomposition pipeline: validation, TDG paths, runtime
/// annotation, ATG assembly, constraints, valid missions, iHTN lowering.
pub struct Pipeline<'a> {
    pub domain: &'a Domain,
    pub gm: &'a GoalModel,
    pub kb: &'a KnowledgeBase,
    pub var_mappings: &'a [VariableMapping],
    pub semantic_mappings: &'a [SemanticMapping],
    pub options: PipelineOptions,
}

impl Pipeline<'_> {
    /// Run the pipeline. Empty goal models and (non-strict) missions
    /// without valid decompositions yield an empty list.
    pub fn run(&self) -> Result<Vec<IhtnTree>> {
        self.domain.validate()?;
        self.gm.check_validity()?;

        if self.gm.is_empty() {
            tracing::info!("empty goal model, nothing to decompose");
            return Ok(Vec::new());
        }

        let world_state = self.kb.initial_state(self.semantic_mappings)?;
        tracing::debug!(
            facts = world_state.facts.len(),
            functions = world_state.functions.len(),
            "initial world state"
        );

        let paths = self.decomposition_paths()?;

        let mut bound = BoundVariables::new();
        let mut var_map = GmVariableMap::new();
        let annot = build_runtime_annotation(self.gm, self.kb, &mut bound, &mut var_map)?;
        let Some(annot) = annot else {
            return Ok(Vec::new());
        };
        tracing::info!(annotation = %render_runtime_annot(&annot), "runtime annotation");

        let decomposer = MissionDecomposer {
            gm: self.gm,
            domain: self.domain,
            paths: &paths,
            var_mappings: self.var_mappings,
            var_map: &var_map,
            semantic_mappings: self.semantic_mappings,
            world_state: &world_state,
        };
        let (atg, root) = decomposer.build(&annot)?;
        tracing::debug!(nodes = atg.node_count(), edges = atg.edge_count(), "ATG assembled");

        let constraints = ConstraintSet::generate(&atg, root);
        tracing::debug!(count = constraints.constraints.len(), "mission constraints");

        let mut validator_config = ValidatorConfig::default();
        if let Some(cap) = self.options.max_candidates_per_operator_node {
            validator_config.max_candidates_per_operator_node = cap;
        }
        let generator = ValidMissionGenerator {
            graph: &atg,
            root,
            constraints: &constraints,
            initial_state: &world_state,
            config: validator_config,
        };
        let missions = generator.generate()?;
        tracing::info!(count = missions.len(), "valid mission decompositions");

        if missions.is_empty() {
            if self.options.strict {
                return Err(PlanError::NoValidMission {
                    detail: "no candidate decomposition set satisfies the mission".into(),
                });
            }
            return Ok(Vec::new());
        }

        let robot_sorts = self.robot_sorts();
        let emitter = IhtnEmitter {
            graph: &atg,
            constraints: &constraints,
            robot_sorts: &robot_sorts,
        };
        emitter.emit(&missions)
    }

    fn robot_sorts(&self) -> Vec<String> {
        let roots: Vec<&str> = if self.options.agent_sorts.is_empty() {
            vec![ROBOT_SORT, ROBOT_TEAM_SORT]
        } else {
            self.options.agent_sorts.iter().map(String::as_str).collect()
        };
        self.domain.sorts_derived_from(&roots)
    }

    /// Cache the decomposition paths of every domain task the goal model
    /// references, one TDG per task.
    fn decomposition_paths(&self) -> Result<PathTable> {
        let mut paths = PathTable::new();
        for (_, node) in self.gm.nodes() {
            if !node.is_task() {
                continue;
            }
            let (instance_id, task_name) = node.task_id_and_name();
            if paths.contains_key(&task_name) {
                continue;
            }
            let task = self.domain.abstract_task(&task_name).ok_or_else(|| {
                PlanError::DomainInconsistency {
                    node: instance_id,
                    detail: format!("goal model references undefined task [{task_name}]"),
                }
            })?;
            let tdg = Tdg::build(task, self.domain)?;
            tracing::debug!(task = %task_name, nodes = tdg.node_count(), "TDG built");
            paths.insert(task_name, tdg.paths(&[])?);
        }
        Ok(paths)
    }
}
