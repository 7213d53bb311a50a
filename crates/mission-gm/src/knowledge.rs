//! World knowledge base: the typed instance tree queried by select
//! expressions and the source of the initial world state.

use serde_json::Value;

use mission_model::{
    FunctionValue, GroundLiteral, MappingKind, PlanError, Result, SemanticMapping, WorldState,
};

/// The world database: a JSON object rooted at `world_db` whose children are
/// per-type element arrays, e.g. `{"world_db": {"robot": [{...}, ...]}}`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: Value,
}

impl KnowledgeBase {
    pub fn new(value: Value) -> Result<Self> {
        if value.get(crate::WORLD_DB_VAR).and_then(Value::as_object).is_none() {
            return Err(PlanError::MalformedConfig {
                key: crate::WORLD_DB_VAR.into(),
                detail: "world database must be an object rooted at world_db".into(),
            });
        }
        Ok(Self { root: value })
    }

    fn db(&self) -> &serde_json::Map<String, Value> {
        self.root
            .get(crate::WORLD_DB_VAR)
            .and_then(Value::as_object)
            .expect("validated at construction")
    }

    /// All elements of a given type, in database order.
    pub fn elements_of_type(&self, type_name: &str) -> Vec<Value> {
        match self.db().get(type_name) {
            Some(subtree) => Self::elements_of(subtree, type_name),
            None => Vec::new(),
        }
    }

    /// Interpret a subtree as an element list: arrays yield their entries,
    /// single objects yield themselves.
    pub fn elements_of(subtree: &Value, _type_name: &str) -> Vec<Value> {
        match subtree {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![subtree.clone()],
            _ => Vec::new(),
        }
    }

    /// Declared element types, in database order.
    pub fn types(&self) -> Vec<&str> {
        self.db().keys().map(String::as_str).collect()
    }

    /// Derive the initial world state from element attributes through the
    /// semantic-mapping table: boolean attributes become signed ground
    /// literals, numeric attributes become function values.
    pub fn initial_state(&self, mappings: &[SemanticMapping]) -> Result<WorldState> {
        let mut state = WorldState::default();

        for mapping in mappings {
            if mapping.mapping_kind != MappingKind::Attribute {
                continue;
            }
            let Some(relates_to) = mapping.relates_to.as_deref() else {
                continue;
            };

            for element in self.elements_of_type(&relates_to.to_lowercase()) {
                let Some(name) = element.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let Some(attr) = element.get(&mapping.name) else {
                    continue;
                };

                if mapping.mapped_type == "function" {
                    let value = match attr {
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => mission_model::Numeric::Int(i),
                            None => mission_model::Numeric::Float(n.as_f64().unwrap_or(0.0)),
                        },
                        _ => continue,
                    };
                    state.functions.push(FunctionValue {
                        predicate: mapping.map.name.clone(),
                        args: vec![name.to_string()],
                        value,
                    });
                } else {
                    let positive = match attr {
                        Value::Bool(b) => *b,
                        Value::String(s) => s.eq_ignore_ascii_case("true"),
                        _ => continue,
                    };
                    state.apply(&GroundLiteral::new(
                        mapping.map.name.clone(),
                        vec![name.to_string()],
                        positive,
                    ));
                }
            }
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_model::PredicateDef;
    use serde_json::json;

    #[test]
    fn initial_state_maps_boolean_and_numeric_attributes() {
        let kb = KnowledgeBase::new(json!({
            "world_db": {
                "robot": [
                    {"name": "r1", "charged": true, "battery": 75},
                    {"name": "r2", "charged": false},
                ],
            }
        }))
        .unwrap();

        let mappings = vec![
            SemanticMapping {
                mapping_kind: MappingKind::Attribute,
                mapped_type: "predicate".into(),
                name: "charged".into(),
                relates_to: Some("Robot".into()),
                belongs_to: None,
                map: PredicateDef::new("charged", vec!["robot".into()]),
                predicate_type: None,
            },
            SemanticMapping {
                mapping_kind: MappingKind::Attribute,
                mapped_type: "function".into(),
                name: "battery".into(),
                relates_to: Some("Robot".into()),
                belongs_to: None,
                map: PredicateDef::new("battery_level", vec!["robot".into()]),
                predicate_type: None,
            },
        ];

        let state = kb.initial_state(&mappings).unwrap();
        assert!(state.holds(&GroundLiteral::new("charged", vec!["r1".into()], true)));
        assert!(state.holds(&GroundLiteral::new("charged", vec!["r2".into()], false)));
        assert_eq!(
            state.function_value("battery_level", &["r1".to_string()]),
            Some(mission_model::Numeric::Int(75))
        );
    }

    #[test]
    fn missing_world_db_root_is_a_config_error() {
        let err = KnowledgeBase::new(json!({"foo": {}})).unwrap_err();
        assert!(matches!(err, PlanError::MalformedConfig { .. }));
    }
}
