//! Simulated world state: ground facts plus function values.

use serde::{Deserialize, Serialize};

use crate::literal::{
    ComparisonOp, FunctionEffectKind, GroundComparison, GroundFunctionEffect, GroundLiteral,
    Numeric,
};

/// A function predicate's current numeric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionValue {
    pub predicate: String,
    pub args: Vec<String>,
    pub value: Numeric,
}

/// An unordered set of ground literals plus function values.
///
/// Closed-world: a fact absent from the set is false. For each
/// `(predicate, args)` there is exactly one entry in each set; applying an
/// effect overwrites the stored sign or value in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default)]
    pub facts: Vec<GroundLiteral>,
    #[serde(default)]
    pub functions: Vec<FunctionValue>,
}

impl WorldState {
    pub fn new(facts: Vec<GroundLiteral>, functions: Vec<FunctionValue>) -> Self {
        Self { facts, functions }
    }

    /// Whether the given signed literal holds. An absent fact counts as a
    /// negative one.
    pub fn holds(&self, literal: &GroundLiteral) -> bool {
        match self.facts.iter().find(|f| f.same_fact(literal)) {
            Some(fact) => fact.positive == literal.positive,
            None => !literal.positive,
        }
    }

    /// Whether a function comparison holds. Unknown functions fail every
    /// comparison.
    pub fn satisfies(&self, comparison: &GroundComparison) -> bool {
        match self.function_value(&comparison.predicate, &comparison.args) {
            Some(value) => value.compare(comparison.op, comparison.value),
            None => false,
        }
    }

    pub fn function_value(&self, predicate: &str, args: &[String]) -> Option<Numeric> {
        self.functions
            .iter()
            .find(|f| f.predicate == predicate && f.args == args)
            .map(|f| f.value)
    }

    /// Apply a literal effect, overwriting the sign of an existing entry for
    /// the same fact or inserting a fresh one.
    pub fn apply(&mut self, effect: &GroundLiteral) {
        match self.facts.iter_mut().find(|f| f.same_fact(effect)) {
            Some(fact) => fact.positive = effect.positive,
            None => self.facts.push(effect.clone()),
        }
    }

    /// Apply a function effect (`assign` overwrites, `increase` adds).
    /// Unknown functions are inserted with the effect value.
    pub fn apply_function(&mut self, effect: &GroundFunctionEffect) {
        let existing = self
            .functions
            .iter_mut()
            .find(|f| f.predicate == effect.predicate && f.args == effect.args);
        match existing {
            Some(entry) => match effect.kind {
                FunctionEffectKind::Assign => entry.value = effect.value,
                FunctionEffectKind::Increase => entry.value = entry.value.add(effect.value),
            },
            None => self.functions.push(FunctionValue {
                predicate: effect.predicate.clone(),
                args: effect.args.clone(),
                value: effect.value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(pred: &str, arg: &str, positive: bool) -> GroundLiteral {
        GroundLiteral::new(pred, vec![arg.to_string()], positive)
    }

    #[test]
    fn closed_world_semantics() {
        let state = WorldState::default();
        assert!(!state.holds(&lit("charged", "r1", true)));
        assert!(state.holds(&lit("charged", "r1", false)));
    }

    #[test]
    fn apply_overwrites_sign_in_place() {
        let mut state = WorldState::default();
        state.apply(&lit("charged", "r1", true));
        state.apply(&lit("charged", "r1", false));
        assert_eq!(state.facts.len(), 1);
        assert!(!state.holds(&lit("charged", "r1", true)));
    }

    #[test]
    fn function_effects_assign_and_increase() {
        let mut state = WorldState::default();
        state.apply_function(&GroundFunctionEffect {
            predicate: "battery".into(),
            args: vec!["r1".into()],
            kind: FunctionEffectKind::Assign,
            value: Numeric::Int(5),
        });
        state.apply_function(&GroundFunctionEffect {
            predicate: "battery".into(),
            args: vec!["r1".into()],
            kind: FunctionEffectKind::Increase,
            value: Numeric::Int(2),
        });
        assert_eq!(
            state.function_value("battery", &["r1".to_string()]),
            Some(Numeric::Int(7))
        );
        assert!(state.satisfies(&GroundComparison {
            predicate: "battery".into(),
            args: vec!["r1".into()],
            op: ComparisonOp::Gt,
            value: Numeric::Int(6),
        }));
    }
}
