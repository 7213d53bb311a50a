//! The abstract-task graph: node and edge weights, abstract-task instances,
//! and grounded decompositions.

use petgraph::graph::{DiGraph, NodeIndex};

use mission_gm::RobotNumber;
use mission_model::{
    ArgValue, FunctionComparison, FunctionEffect, GroundComparison, GroundFunctionEffect,
    GroundLiteral, Literal, TypedVar,
};

use crate::tdg::{CompleteDecompositionPath, DecompositionPath};

/// Operators carried by `OP` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Sequential,
    Parallel,
    Fallback,
    Opt,
}

impl OperatorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sequential => "SEQ",
            Self::Parallel => "PAR",
            Self::Fallback => "FALLBACK",
            Self::Opt => "OPT",
        }
    }
}

/// The binding of one domain variable of a task instance: the goal-model
/// value when the configuration maps it, `None` while non-ground.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgBinding {
    pub value: Option<ArgValue>,
    pub var: TypedVar,
}

impl ArgBinding {
    pub fn ground(&self) -> bool {
        self.value.is_some()
    }
}

/// An instantiated abstract task from the goal model: the domain task plus
/// the bindings, location, and robot requirements its goal-model node
/// declares.
#[derive(Debug, Clone)]
pub struct AbstractTask {
    /// Instance id, e.g. `AT1` or `AT1_2` under forAll replication.
    pub id: String,
    pub name: String,
    pub task: mission_model::Task,
    /// Bindings for the task's declared variables, in declaration order.
    pub arguments: Vec<ArgBinding>,
    /// The bound location value(s), when the goal model declares one.
    pub location_values: Option<ArgValue>,
    /// The domain variable carrying the location.
    pub location_var: Option<TypedVar>,
    pub triggering_events: Vec<String>,
    pub fixed_robot_num: bool,
    pub robot_num: RobotNumber,
}

impl AbstractTask {
    /// Whether a constant is one of this task's location values.
    pub fn is_location_value(&self, value: &str) -> bool {
        match &self.location_values {
            Some(ArgValue::Single(v)) => v == value,
            Some(ArgValue::Collection(vs)) => vs.iter().any(|v| v == value),
            None => false,
        }
    }

    /// The bound value of a domain variable, when ground.
    pub fn binding_of(&self, var_name: &str) -> Option<&ArgValue> {
        self.arguments
            .iter()
            .find(|b| b.var.name == var_name)
            .and_then(|b| b.value.as_ref())
    }
}

/// A decomposition precondition, as ground as the task bindings allow.
#[derive(Debug, Clone, PartialEq)]
pub enum DecompPrec {
    Ground(GroundLiteral),
    Comparison(GroundComparison),
    Open(Literal),
    OpenComparison(FunctionComparison),
}

/// A decomposition literal effect.
#[derive(Debug, Clone, PartialEq)]
pub enum DecompEff {
    Ground(GroundLiteral),
    Open(Literal),
}

/// A decomposition function effect.
#[derive(Debug, Clone, PartialEq)]
pub enum DecompFuncEff {
    Ground(GroundFunctionEffect),
    Open(FunctionEffect),
}

/// One decomposition of an abstract-task instance: a resolved path plus its
/// grounded preconditions and effects.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// `<instance id>|<path index>`, e.g. `AT1|2`.
    pub id: String,
    pub at: AbstractTask,
    pub path: DecompositionPath,
    pub complete_path: CompleteDecompositionPath,
    pub prec: Vec<DecompPrec>,
    pub eff: Vec<DecompEff>,
    pub func_eff: Vec<DecompFuncEff>,
    /// Bindings for every variable the path mentions: the task's bound
    /// arguments plus the still-open method-introduced ones.
    pub arguments: Vec<ArgBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtNodeKind {
    Goal,
    Operator,
    AbstractTask,
    Decomposition,
}

#[derive(Debug, Clone)]
pub enum AtContent {
    Goal(String),
    Operator(OperatorKind),
    Task(AbstractTask),
    Decomposition(Decomposition),
}

/// One ATG node: tagged content plus the sharing flags inherited from its
/// runtime-annotation ancestor.
#[derive(Debug, Clone)]
pub struct AtNode {
    pub kind: AtNodeKind,
    pub content: AtContent,
    pub non_coop: bool,
    pub group: bool,
    pub divisible: bool,
    pub is_achieve: bool,
    pub parent: Option<NodeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtEdgeKind {
    Normal,
    ContextDependency,
    NonCoop,
}

/// One ATG edge. `group`/`divisible` are meaningful on NonCoop edges and
/// always copied from the originating non-coop ancestor.
#[derive(Debug, Clone, Copy)]
pub struct AtEdge {
    pub kind: AtEdgeKind,
    pub group: bool,
    pub divisible: bool,
}

impl AtEdge {
    pub fn normal() -> Self {
        Self {
            kind: AtEdgeKind::Normal,
            group: true,
            divisible: true,
        }
    }

    pub fn context_dependency() -> Self {
        Self {
            kind: AtEdgeKind::ContextDependency,
            group: true,
            divisible: true,
        }
    }

    pub fn non_coop(group: bool, divisible: bool) -> Self {
        Self {
            kind: AtEdgeKind::NonCoop,
            group,
            divisible,
        }
    }
}

pub type AtGraph = DiGraph<AtNode, AtEdge>;

/// Ground a decomposition's predicates as far as the task bindings allow:
/// the first path task contributes the preconditions, and effects fold
/// cumulatively with later writes overwriting earlier signs; the surviving
/// fold is the decomposition's effect set. Collection bindings expand to one
/// ground literal per element.
pub fn instantiate_decomposition_predicates(at: &AbstractTask, d: &mut Decomposition) {
    d.prec.clear();
    d.eff.clear();
    d.func_eff.clear();

    let mut combined: Vec<DecompEff> = Vec::new();
    let mut combined_func: Vec<DecompFuncEff> = Vec::new();

    for (index, task) in d.path.tasks.iter().enumerate() {
        if index == 0 {
            for prec in &task.preconditions {
                match prec {
                    mission_model::Precondition::Literal(literal) => {
                        match ground_literal_args(at, literal) {
                            Some(ground_sets) => {
                                for args in ground_sets {
                                    d.prec.push(DecompPrec::Ground(GroundLiteral::new(
                                        literal.predicate.clone(),
                                        args,
                                        literal.positive,
                                    )));
                                }
                            }
                            None => d.prec.push(DecompPrec::Open(literal.clone())),
                        }
                    }
                    mission_model::Precondition::Comparison(c) => {
                        match ground_args_single(at, &c.args) {
                            Some(args) => d.prec.push(DecompPrec::Comparison(GroundComparison {
                                predicate: c.predicate.clone(),
                                args,
                                op: c.op,
                                value: c.value,
                            })),
                            None => d.prec.push(DecompPrec::OpenComparison(c.clone())),
                        }
                    }
                }
            }
        }

        for effect in &task.effects {
            match effect {
                mission_model::Effect::Literal(literal) => {
                    match ground_literal_args(at, literal) {
                        Some(ground_sets) => {
                            for args in ground_sets {
                                let ground = GroundLiteral::new(
                                    literal.predicate.clone(),
                                    args,
                                    literal.positive,
                                );
                                fold_ground_effect(&mut combined, ground);
                            }
                        }
                        None => fold_open_effect(&mut combined, literal.clone()),
                    }
                }
                mission_model::Effect::Function(f) => match ground_args_single(at, &f.args) {
                    Some(args) => combined_func.push(DecompFuncEff::Ground(GroundFunctionEffect {
                        predicate: f.predicate.clone(),
                        args,
                        kind: f.kind,
                        value: f.value,
                    })),
                    None => combined_func.push(DecompFuncEff::Open(f.clone())),
                },
            }
        }
    }

    d.eff = combined;
    d.func_eff = combined_func;
}

fn fold_ground_effect(combined: &mut Vec<DecompEff>, effect: GroundLiteral) {
    for entry in combined.iter_mut() {
        if let DecompEff::Ground(existing) = entry {
            if existing.same_fact(&effect) {
                existing.positive = effect.positive;
                return;
            }
        }
    }
    combined.push(DecompEff::Ground(effect));
}

fn fold_open_effect(combined: &mut Vec<DecompEff>, effect: Literal) {
    for entry in combined.iter_mut() {
        if let DecompEff::Open(existing) = entry {
            if existing.same_fact(&effect) {
                existing.positive = effect.positive;
                return;
            }
        }
    }
    combined.push(DecompEff::Open(effect));
}

/// Ground every argument of a literal through the task bindings. Collection
/// bindings fan out into one argument vector per element. Returns `None`
/// when any argument is unbound.
fn ground_literal_args(at: &AbstractTask, literal: &Literal) -> Option<Vec<Vec<String>>> {
    let mut ground_sets: Vec<Vec<String>> = vec![Vec::new()];
    for arg in &literal.args {
        let value = at.binding_of(arg)?;
        match value {
            ArgValue::Single(v) => {
                for set in &mut ground_sets {
                    set.push(v.clone());
                }
            }
            ArgValue::Collection(vs) => {
                let mut fanned = Vec::with_capacity(ground_sets.len() * vs.len());
                for set in &ground_sets {
                    for v in vs {
                        let mut next = set.clone();
                        next.push(v.clone());
                        fanned.push(next);
                    }
                }
                ground_sets = fanned;
            }
        }
    }
    Some(ground_sets)
}

/// Ground a function argument list; collections are not allowed in
/// function predicates.
fn ground_args_single(at: &AbstractTask, args: &[String]) -> Option<Vec<String>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match at.binding_of(arg)? {
            ArgValue::Single(v) => out.push(v.clone()),
            ArgValue::Collection(_) => return None,
        }
    }
    Some(out)
}

/// Whether two decompositions can co-occur in one mission: treating `d1`'s
/// effects as transforming `d2`'s precondition inputs must leave every
/// precondition sign-coherent. Non-coop pairs also require coherence of the
/// still-open literals.
pub fn can_unite_decompositions(d1: &Decomposition, d2: &Decomposition, non_coop: bool) -> bool {
    for prec in &d2.prec {
        match prec {
            DecompPrec::Ground(p) => {
                let transformed = d1.eff.iter().fold(p.positive, |sign, eff| match eff {
                    DecompEff::Ground(e) if e.same_fact(p) => e.positive,
                    _ => sign,
                });
                if transformed != p.positive {
                    return false;
                }
            }
            DecompPrec::Open(p) if non_coop => {
                let transformed = d1.eff.iter().fold(p.positive, |sign, eff| match eff {
                    DecompEff::Open(e) if e.same_fact(p) => e.positive,
                    _ => sign,
                });
                if transformed != p.positive {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tdg::DecompositionPath;
    use mission_model::{Effect, Precondition, Task};

    fn binding(name: &str, value: Option<&str>) -> ArgBinding {
        ArgBinding {
            value: value.map(|v| ArgValue::Single(v.to_string())),
            var: TypedVar::new(name, "robot"),
        }
    }

    fn at_with(bindings: Vec<ArgBinding>) -> AbstractTask {
        AbstractTask {
            id: "AT1".into(),
            name: "Fetch".into(),
            task: Task {
                name: "fetch".into(),
                vars: bindings.iter().map(|b| b.var.clone()).collect(),
                preconditions: vec![],
                effects: vec![],
                cost: None,
                original_var_count: 0,
            },
            arguments: bindings,
            location_values: None,
            location_var: None,
            triggering_events: vec![],
            fixed_robot_num: true,
            robot_num: RobotNumber::Fixed(1),
        }
    }

    fn decomposition_of(at: &AbstractTask, tasks: Vec<Task>) -> Decomposition {
        let mut d = Decomposition {
            id: "AT1|1".into(),
            at: at.clone(),
            path: DecompositionPath {
                tasks,
                needs_expansion: false,
                fragments: vec![],
            },
            complete_path: CompleteDecompositionPath::default(),
            prec: vec![],
            eff: vec![],
            func_eff: vec![],
            arguments: at.arguments.clone(),
        };
        instantiate_decomposition_predicates(at, &mut d);
        d
    }

    fn lit(predicate: &str, arg: &str, positive: bool) -> Literal {
        Literal::new(predicate, vec![arg.to_string()], positive)
    }

    #[test]
    fn first_task_preconditions_and_folded_effects() {
        let at = at_with(vec![binding("?r", Some("r1"))]);
        let d = decomposition_of(
            &at,
            vec![
                Task {
                    name: "a".into(),
                    vars: vec![TypedVar::new("?r", "robot")],
                    preconditions: vec![Precondition::Literal(lit("free", "?r", true))],
                    effects: vec![Effect::Literal(lit("busy", "?r", true))],
                    cost: None,
                    original_var_count: 0,
                },
                Task {
                    name: "b".into(),
                    vars: vec![TypedVar::new("?r", "robot")],
                    // Not part of the decomposition preconditions.
                    preconditions: vec![Precondition::Literal(lit("busy", "?r", true))],
                    effects: vec![Effect::Literal(lit("busy", "?r", false))],
                    cost: None,
                    original_var_count: 0,
                },
            ],
        );

        assert_eq!(
            d.prec,
            vec![DecompPrec::Ground(GroundLiteral::new(
                "free",
                vec!["r1".into()],
                true
            ))]
        );
        // The later write wins the fold.
        assert_eq!(
            d.eff,
            vec![DecompEff::Ground(GroundLiteral::new(
                "busy",
                vec!["r1".into()],
                false
            ))]
        );
    }

    #[test]
    fn unbound_arguments_stay_open() {
        let at = at_with(vec![binding("?r", None)]);
        let d = decomposition_of(
            &at,
            vec![Task {
                name: "a".into(),
                vars: vec![TypedVar::new("?r", "robot")],
                preconditions: vec![Precondition::Literal(lit("free", "?r", true))],
                effects: vec![],
                cost: None,
                original_var_count: 0,
            }],
        );
        assert!(matches!(d.prec[0], DecompPrec::Open(_)));
    }

    #[test]
    fn uniting_fails_on_sign_conflict() {
        let at = at_with(vec![binding("?r", Some("r1"))]);
        let producer = decomposition_of(
            &at,
            vec![Task {
                name: "a".into(),
                vars: vec![TypedVar::new("?r", "robot")],
                preconditions: vec![],
                effects: vec![Effect::Literal(lit("free", "?r", false))],
                cost: None,
                original_var_count: 0,
            }],
        );
        let consumer = decomposition_of(
            &at,
            vec![Task {
                name: "b".into(),
                vars: vec![TypedVar::new("?r", "robot")],
                preconditions: vec![Precondition::Literal(lit("free", "?r", true))],
                effects: vec![],
                cost: None,
                original_var_count: 0,
            }],
        );
        assert!(!can_unite_decompositions(&producer, &consumer, false));
        assert!(can_unite_decompositions(&consumer, &producer, false));
    }

    #[test]
    fn non_coop_pairs_check_open_literals_too() {
        let at = at_with(vec![binding("?r", None)]);
        let producer = decomposition_of(
            &at,
            vec![Task {
                name: "a".into(),
                vars: vec![TypedVar::new("?r", "robot")],
                preconditions: vec![],
                effects: vec![Effect::Literal(lit("free", "?r", false))],
                cost: None,
                original_var_count: 0,
            }],
        );
        let consumer = decomposition_of(
            &at,
            vec![Task {
                name: "b".into(),
                vars: vec![TypedVar::new("?r", "robot")],
                preconditions: vec![Precondition::Literal(lit("free", "?r", true))],
                effects: vec![],
                cost: None,
                original_var_count: 0,
            }],
        );
        assert!(can_unite_decompositions(&producer, &consumer, false));
        assert!(!can_unite_decompositions(&producer, &consumer, true));
    }
}
