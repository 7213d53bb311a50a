//! Configuration-level mapping tables and goal-model variable bindings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::literal::PredicateDef;

/// The value bound to a goal-model variable: a single constant or a
/// collection of constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Single(String),
    Collection(Vec<String>),
}

impl ArgValue {
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// The constants carried by this value, one for singles.
    pub fn constants(&self) -> Vec<&str> {
        match self {
            Self::Single(v) => vec![v.as_str()],
            Self::Collection(vs) => vs.iter().map(|v| v.as_str()).collect(),
        }
    }
}

/// A bound goal-model variable: its value plus its declared OCL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmVarBinding {
    pub value: ArgValue,
    pub var_type: String,
}

/// Instantiated goal-model variables, keyed by variable name. BTreeMap keeps
/// iteration deterministic.
pub type GmVariableMap = BTreeMap<String, GmVarBinding>;

/// What a semantic mapping maps a goal-model concept to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Attribute,
    Ownership,
    Relationship,
}

/// One entry of the configuration's semantic-mapping table, relating a
/// goal-model concept (an attribute, ownership, or relationship) to a domain
/// predicate or function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMapping {
    #[serde(rename = "type")]
    pub mapping_kind: MappingKind,
    /// `predicate` or `function`.
    pub mapped_type: String,
    pub name: String,
    #[serde(default)]
    pub relates_to: Option<String>,
    #[serde(default)]
    pub belongs_to: Option<String>,
    pub map: PredicateDef,
    /// `universal` or `existential`; universal when absent.
    #[serde(default)]
    pub predicate_type: Option<String>,
}

impl SemanticMapping {
    pub fn is_existential(&self) -> bool {
        self.predicate_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("existential"))
    }
}

/// Find the predicate mapped to an attribute name. Fails with
/// [`PlanError::SemanticMappingFailure`] when no attribute mapping matches.
pub fn attribute_predicate<'a>(
    mappings: &'a [SemanticMapping],
    attribute: &str,
) -> Result<&'a SemanticMapping> {
    mappings
        .iter()
        .find(|m| m.mapping_kind == MappingKind::Attribute && m.name == attribute)
        .ok_or_else(|| PlanError::SemanticMappingFailure {
            attribute: attribute.to_string(),
            detail: "no attribute mapping declares this name".into(),
        })
}

/// One entry of the configuration's variable-mapping table: for a given
/// goal-model task, which domain variable a goal-model variable binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMapping {
    pub task_id: String,
    pub gm_var: String,
    pub domain_var: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_lookup_requires_attribute_kind() {
        let mappings = vec![SemanticMapping {
            mapping_kind: MappingKind::Ownership,
            mapped_type: "predicate".into(),
            name: "charged".into(),
            relates_to: None,
            belongs_to: None,
            map: PredicateDef::new("charged", vec!["robot".into()]),
            predicate_type: None,
        }];
        assert!(attribute_predicate(&mappings, "charged").is_err());
    }
}
