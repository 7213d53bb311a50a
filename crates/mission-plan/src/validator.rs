//! Valid-mission enumeration: candidate decomposition sets combined per
//! operator semantics under a simulated world state.

use petgraph::graph::NodeIndex;

use mission_model::{GroundLiteral, Numeric, PlanError, Result, WorldState};

use crate::atg::{
    can_unite_decompositions, AtContent, AtGraph, AtNodeKind, DecompEff, DecompFuncEff,
    DecompPrec, Decomposition, OperatorKind,
};
use crate::constraints::ConstraintSet;
use crate::decomposer::normal_children;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// Cap on surviving candidate combinations per operator node.
    pub max_candidates_per_operator_node: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_candidates_per_operator_node: 5_000,
        }
    }
}

/// One valid mission: the chosen decomposition per abstract-task instance,
/// in annotation DFS order.
#[derive(Debug, Clone)]
pub struct Mission {
    pub decompositions: Vec<(NodeIndex, Decomposition)>,
}

/// A candidate under construction: chosen decompositions, the resulting
/// state, and the ground effects this candidate applied (kept separate for
/// parallel conflict detection).
#[derive(Debug, Clone)]
struct Partial {
    decompositions: Vec<(NodeIndex, Decomposition)>,
    state: WorldState,
    effects: Vec<GroundLiteral>,
}

impl Partial {
    fn empty(state: WorldState) -> Self {
        Self {
            decompositions: Vec::new(),
            state,
            effects: Vec::new(),
        }
    }
}

pub struct ValidMissionGenerator<'a> {
    pub graph: &'a AtGraph,
    pub root: NodeIndex,
    pub constraints: &'a ConstraintSet,
    pub initial_state: &'a WorldState,
    pub config: ValidatorConfig,
}

impl ValidMissionGenerator<'_> {
    /// Enumerate every valid mission. An empty result is not an error here;
    /// strictness is the caller's policy.
    pub fn generate(&self) -> Result<Vec<Mission>> {
        let partials = self.eval(self.root, self.initial_state)?;
        Ok(partials
            .into_iter()
            .filter(|p| !p.decompositions.is_empty())
            .map(|p| Mission {
                decompositions: p.decompositions,
            })
            .collect())
    }

    fn eval(&self, node: NodeIndex, state: &WorldState) -> Result<Vec<Partial>> {
        match self.graph[node].kind {
            AtNodeKind::AbstractTask => self.eval_task(node, state),
            AtNodeKind::Operator => {
                let AtContent::Operator(kind) = &self.graph[node].content else {
                    unreachable!("operator node without operator content");
                };
                let children = normal_children(self.graph, node);
                let partials = match *kind {
                    OperatorKind::Sequential => self.eval_sequence(&children, state)?,
                    OperatorKind::Parallel => self.eval_parallel(node, &children, state)?,
                    OperatorKind::Fallback => self.eval_fallback(&children, state)?,
                    OperatorKind::Opt => {
                        let mut out = vec![Partial::empty(state.clone())];
                        for child in &children {
                            out.extend(self.eval(*child, state)?);
                        }
                        out
                    }
                };
                self.check_budget(node, partials)
            }
            // Goal and means-end nodes combine their children sequentially.
            AtNodeKind::Goal => {
                let children = normal_children(self.graph, node);
                let partials = self.eval_sequence(&children, state)?;
                self.check_budget(node, partials)
            }
            AtNodeKind::Decomposition => unreachable!("reached through the task node"),
        }
    }

    fn eval_task(&self, node: NodeIndex, state: &WorldState) -> Result<Vec<Partial>> {
        let mut out = Vec::new();
        for d_index in normal_children(self.graph, node) {
            if self.graph[d_index].kind != AtNodeKind::Decomposition {
                continue;
            }
            let AtContent::Decomposition(d) = &self.graph[d_index].content else {
                continue;
            };
            let mut d = d.clone();
            expand_decomposition(&mut d, state)?;

            if !check_decomposition_preconditions(state, &d) {
                tracing::debug!(decomposition = %d.id, "preconditions rejected candidate");
                continue;
            }

            let mut next_state = state.clone();
            let mut effects = Vec::new();
            apply_decomposition_effects(&d, &mut next_state, &mut effects);

            out.push(Partial {
                decompositions: vec![(d_index, d)],
                state: next_state,
                effects,
            });
        }
        Ok(out)
    }

    fn eval_sequence(&self, children: &[NodeIndex], state: &WorldState) -> Result<Vec<Partial>> {
        let mut partials = vec![Partial::empty(state.clone())];
        for &child in children {
            let mut next = Vec::new();
            for partial in &partials {
                for sub in self.eval(child, &partial.state)? {
                    let mut merged = partial.clone();
                    merged.decompositions.extend(sub.decompositions);
                    merged.effects.extend(sub.effects);
                    merged.state = sub.state;
                    next.push(merged);
                }
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }
        Ok(partials)
    }

    /// Cartesian combination of children evaluated against the same entry
    /// state. NONCOOP pairs spanning children must pass the unite check, and
    /// sibling effects with conflicting signs invalidate the combination.
    fn eval_parallel(
        &self,
        node: NodeIndex,
        children: &[NodeIndex],
        state: &WorldState,
    ) -> Result<Vec<Partial>> {
        let mut partials = vec![Partial::empty(state.clone())];
        for &child in children {
            let child_results = self.eval(child, state)?;
            let mut next = Vec::new();
            for partial in &partials {
                for sub in &child_results {
                    if !self.branches_compatible(partial, sub) {
                        continue;
                    }
                    let mut merged = partial.clone();
                    merged.decompositions.extend(sub.decompositions.clone());
                    merged.effects.extend(sub.effects.clone());
                    // Effects of all branches land on the entry state in a
                    // fixed (combination) order.
                    merged.state = state.clone();
                    for effect in &merged.effects {
                        merged.state.apply(effect);
                    }
                    for (_, d) in &merged.decompositions {
                        for func_eff in &d.func_eff {
                            if let DecompFuncEff::Ground(f) = func_eff {
                                merged.state.apply_function(f);
                            }
                        }
                    }
                    next.push(merged);
                }
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
            if partials.len() > self.config.max_candidates_per_operator_node {
                return Err(self.budget_error(node, partials.len()));
            }
        }
        Ok(partials)
    }

    fn branches_compatible(&self, left: &Partial, right: &Partial) -> bool {
        for eff_a in &left.effects {
            for eff_b in &right.effects {
                if eff_a.same_fact(eff_b) && eff_a.positive != eff_b.positive {
                    return false;
                }
            }
        }

        for (a_index, a_decomp) in &left.decompositions {
            let Some(a_task) = self.graph[*a_index].parent else {
                continue;
            };
            for (b_index, b_decomp) in &right.decompositions {
                let Some(b_task) = self.graph[*b_index].parent else {
                    continue;
                };
                if self.constraints.non_coop_pair(a_task, b_task).is_some() {
                    if !can_unite_decompositions(a_decomp, b_decomp, true)
                        || !can_unite_decompositions(b_decomp, a_decomp, true)
                    {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Alternatives are evaluated against the same entry state; every
    /// alternative contributes candidates, and downstream nodes observe the
    /// state of the first alternative that produced any.
    fn eval_fallback(&self, children: &[NodeIndex], state: &WorldState) -> Result<Vec<Partial>> {
        let mut alternatives: Vec<Vec<Partial>> = Vec::new();
        let mut rebase: Option<WorldState> = None;
        for &child in children {
            let result = self.eval(child, state)?;
            if rebase.is_none() {
                if let Some(first) = result.first() {
                    rebase = Some(first.state.clone());
                }
            }
            alternatives.push(result);
        }

        let rebase = rebase.unwrap_or_else(|| state.clone());
        let mut out = Vec::new();
        for alternative in alternatives {
            for mut partial in alternative {
                partial.state = rebase.clone();
                out.push(partial);
            }
        }
        Ok(out)
    }

    fn check_budget(&self, node: NodeIndex, partials: Vec<Partial>) -> Result<Vec<Partial>> {
        if partials.len() > self.config.max_candidates_per_operator_node {
            return Err(self.budget_error(node, partials.len()));
        }
        Ok(partials)
    }

    fn budget_error(&self, node: NodeIndex, count: usize) -> PlanError {
        PlanError::SearchBudgetExceeded {
            detail: format!(
                "{count} candidate combinations at node {} exceed the cap of {}",
                node.index(),
                self.config.max_candidates_per_operator_node
            ),
        }
    }
}

/// Check a decomposition's grounded preconditions: literal preconditions
/// fail only on a contradicting fact; function comparisons fail when the
/// stored value violates the comparison. Open preconditions pass.
pub fn check_decomposition_preconditions(state: &WorldState, d: &Decomposition) -> bool {
    for prec in &d.prec {
        match prec {
            DecompPrec::Ground(p) => {
                let contradicted = state
                    .facts
                    .iter()
                    .any(|fact| fact.same_fact(p) && fact.positive != p.positive);
                if contradicted {
                    return false;
                }
            }
            DecompPrec::Comparison(c) => {
                if let Some(value) = state.function_value(&c.predicate, &c.args) {
                    if !value.compare(c.op, c.value) {
                        return false;
                    }
                }
            }
            DecompPrec::Open(_) | DecompPrec::OpenComparison(_) => {}
        }
    }
    true
}

/// Apply a decomposition's ground effects to the state, recording the
/// literal writes.
pub fn apply_decomposition_effects(
    d: &Decomposition,
    state: &mut WorldState,
    applied: &mut Vec<GroundLiteral>,
) {
    for eff in &d.eff {
        if let DecompEff::Ground(e) = eff {
            state.apply(e);
            applied.push(e.clone());
        }
    }
    for func_eff in &d.func_eff {
        if let DecompFuncEff::Ground(f) = func_eff {
            state.apply_function(f);
        }
    }
}

/// Materialize any deferred expansion fragments of a decomposition against
/// the current function values, then re-ground its predicates.
pub fn expand_decomposition(d: &mut Decomposition, state: &WorldState) -> Result<()> {
    if !d.path.needs_expansion {
        return Ok(());
    }

    let mut insertions: Vec<(usize, Vec<mission_model::Task>)> = Vec::new();
    let mut inserted_so_far = 0usize;

    let fragments = d.path.fragments.clone();
    for fragment in &fragments {
        let mut args = Vec::with_capacity(fragment.comparison.args.len());
        for arg in &fragment.comparison.args {
            match d.at.binding_of(arg) {
                Some(mission_model::ArgValue::Single(v)) => args.push(v.clone()),
                Some(mission_model::ArgValue::Collection(_)) => {
                    return Err(PlanError::Unsupported {
                        node: d.at.id.clone(),
                        detail: format!(
                            "function predicate [{}] over a collection variable",
                            fragment.comparison.predicate
                        ),
                    })
                }
                None => {
                    return Err(PlanError::NoValidMission {
                        detail: format!(
                            "cannot expand decomposition [{}]: argument [{arg}] of [{}] is not ground",
                            d.id, fragment.comparison.predicate
                        ),
                    })
                }
            }
        }

        let value = state
            .function_value(&fragment.comparison.predicate, &args)
            .ok_or_else(|| PlanError::NoValidMission {
                detail: format!(
                    "cannot expand decomposition [{}]: function [{}] has no value",
                    d.id, fragment.comparison.predicate
                ),
            })?;

        let repetitions = expansion_count(value, fragment.comparison.value);
        let span: Vec<mission_model::Task> =
            d.path.tasks[fragment.start..=fragment.end].to_vec();

        let mut expansion = Vec::new();
        for _ in 0..repetitions {
            expansion.extend(span.iter().cloned());
        }

        let insert_at = fragment.end + 1 + inserted_so_far;
        inserted_so_far += expansion.len();
        insertions.push((insert_at, expansion));
    }

    for (index, expansion) in insertions {
        let tail = d.path.tasks.split_off(index);
        d.path.tasks.extend(expansion);
        d.path.tasks.extend(tail);
    }

    let at = d.at.clone();
    crate::atg::instantiate_decomposition_predicates(&at, d);
    Ok(())
}

/// How many extra copies of the fragment a function value demands over the
/// `> k` threshold. Mixed int/float operands round through the integer grid
/// before the subtraction.
fn expansion_count(value: Numeric, threshold: Numeric) -> usize {
    let count = match (value, threshold) {
        (Numeric::Int(v), Numeric::Int(k)) => v - k - 1,
        (Numeric::Int(v), Numeric::Float(k)) => v - (k as i64 + 1) - 1,
        (Numeric::Float(v), Numeric::Int(k)) => (v as i64 + 1) - k - 1,
        (Numeric::Float(v), Numeric::Float(k)) => ((v - k) as i64 + 1) - 1,
    };
    count.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_count_matrix() {
        assert_eq!(expansion_count(Numeric::Int(5), Numeric::Int(2)), 2);
        assert_eq!(expansion_count(Numeric::Int(3), Numeric::Int(2)), 0);
        assert_eq!(expansion_count(Numeric::Int(2), Numeric::Int(2)), 0);
        assert_eq!(expansion_count(Numeric::Float(5.0), Numeric::Int(2)), 3);
        assert_eq!(expansion_count(Numeric::Float(5.0), Numeric::Float(2.0)), 3);
    }
}
