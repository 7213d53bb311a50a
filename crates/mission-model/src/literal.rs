//! Predicates, literals, and numeric function values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// Tolerance for float comparisons throughout the pipeline.
pub const EPSILON: f64 = 0.01;

/// A predicate signature: name plus argument sorts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateDef {
    pub name: String,
    #[serde(default)]
    pub arg_sorts: Vec<String>,
}

impl PredicateDef {
    pub fn new(name: impl Into<String>, arg_sorts: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arg_sorts,
        }
    }

    pub fn arity(&self) -> usize {
        self.arg_sorts.len()
    }
}

/// A signed predicate application whose arguments may still be variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub predicate: String,
    pub args: Vec<String>,
    #[serde(default = "default_positive")]
    pub positive: bool,
}

fn default_positive() -> bool {
    true
}

impl Literal {
    pub fn new(predicate: impl Into<String>, args: Vec<String>, positive: bool) -> Self {
        Self {
            predicate: predicate.into(),
            args,
            positive,
        }
    }

    /// Two literals refer to the same fact when predicate and arguments match,
    /// independent of sign.
    pub fn same_fact(&self, other: &Literal) -> bool {
        self.predicate == other.predicate && self.args == other.args
    }

    /// A literal is ground when none of its arguments is a variable.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|a| !a.starts_with('?'))
    }
}

/// A signed predicate application over constants only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroundLiteral {
    pub predicate: String,
    pub args: Vec<String>,
    #[serde(default = "default_positive")]
    pub positive: bool,
}

impl GroundLiteral {
    pub fn new(predicate: impl Into<String>, args: Vec<String>, positive: bool) -> Self {
        Self {
            predicate: predicate.into(),
            args,
            positive,
        }
    }

    pub fn same_fact(&self, other: &GroundLiteral) -> bool {
        self.predicate == other.predicate && self.args == other.args
    }
}

impl fmt::Display for GroundLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            write!(f, "not ")?;
        }
        write!(f, "{}({})", self.predicate, self.args.join(","))
    }
}

/// Comparison operators accepted in function preconditions and OCL
/// expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

impl ComparisonOp {
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "=" => Ok(Self::Eq),
            "<>" => Ok(Self::Neq),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Gte),
            "<=" => Ok(Self::Lte),
            other => Err(PlanError::InvalidExpression {
                node: String::new(),
                detail: format!("unknown comparison operator [{other}]"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An integer or float value carried by function literals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Epsilon-aware equality. Int/int comparison stays exact.
    pub fn approx_eq(self, other: Numeric) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (a, b) => (a.as_f64() - b.as_f64()).abs() < EPSILON,
        }
    }

    /// Epsilon-aware strict greater-than. Int/int comparison stays exact.
    pub fn approx_gt(self, other: Numeric) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a > b,
            (a, b) => (a.as_f64() - b.as_f64()) >= EPSILON,
        }
    }

    pub fn approx_lt(self, other: Numeric) -> bool {
        other.approx_gt(self)
    }

    /// Evaluate `self op target`.
    pub fn compare(self, op: ComparisonOp, target: Numeric) -> bool {
        match op {
            ComparisonOp::Eq => self.approx_eq(target),
            ComparisonOp::Neq => !self.approx_eq(target),
            ComparisonOp::Gt => self.approx_gt(target),
            ComparisonOp::Lt => self.approx_lt(target),
            ComparisonOp::Gte => !self.approx_lt(target),
            ComparisonOp::Lte => !self.approx_gt(target),
        }
    }

    pub fn add(self, other: Numeric) -> Numeric {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a + b),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A function-predicate comparison used as a precondition, e.g.
/// `num_boxes(?s) > 2`. Arguments may be variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionComparison {
    pub predicate: String,
    pub args: Vec<String>,
    pub op: ComparisonOp,
    pub value: Numeric,
}

/// A ground function-predicate comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundComparison {
    pub predicate: String,
    pub args: Vec<String>,
    pub op: ComparisonOp,
    pub value: Numeric,
}

impl GroundComparison {
    pub fn same_function(&self, predicate: &str, args: &[String]) -> bool {
        self.predicate == predicate && self.args == args
    }
}

/// How a function effect updates the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionEffectKind {
    Assign,
    Increase,
}

/// A function-predicate effect, e.g. `(increase (battery ?r) 1)`.
/// Arguments may be variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEffect {
    pub predicate: String,
    pub args: Vec<String>,
    pub kind: FunctionEffectKind,
    pub value: Numeric,
}

/// A fully ground function-predicate effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundFunctionEffect {
    pub predicate: String,
    pub args: Vec<String>,
    pub kind: FunctionEffectKind,
    pub value: Numeric,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparisons_use_epsilon() {
        assert!(Numeric::Float(1.0001).approx_eq(Numeric::Int(1)));
        assert!(!Numeric::Float(1.02).approx_eq(Numeric::Int(1)));
        assert!(Numeric::Float(1.02).approx_gt(Numeric::Int(1)));
        assert!(!Numeric::Float(1.005).approx_gt(Numeric::Int(1)));
        assert!(Numeric::Int(3).compare(ComparisonOp::Gte, Numeric::Int(3)));
        assert!(Numeric::Int(2).compare(ComparisonOp::Lt, Numeric::Float(2.5)));
    }

    #[test]
    fn ground_literal_fact_identity_ignores_sign() {
        let a = GroundLiteral::new("loaded", vec!["box1".into()], true);
        let b = GroundLiteral::new("loaded", vec!["box1".into()], false);
        assert!(a.same_fact(&b));
        let c = GroundLiteral::new("loaded", vec!["box2".into()], true);
        assert!(!a.same_fact(&c));
    }
}
