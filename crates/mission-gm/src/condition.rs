//! Achieve and context conditions: parsing and world-state evaluation.

use regex::Regex;

use mission_model::{
    mapping, ArgValue, GmVariableMap, GroundLiteral, PlanError, PredicateDef, Result,
    SemanticMapping,
};

/// A `forAll` quantification inside an achieve condition:
/// `collection->forAll(item | body)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForAllExpr {
    /// The monitored collection variable being iterated.
    pub iterated_var: String,
    /// The controlled per-element variable.
    pub iteration_var: String,
    /// The quantified body; may be empty (always true).
    pub condition: String,
}

/// An Achieve goal's condition, optionally quantified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchieveCondition {
    pub forall: Option<ForAllExpr>,
    /// The raw condition for the unquantified form.
    pub condition: String,
}

impl AchieveCondition {
    /// Render back to the textual form accepted by the parser.
    pub fn render(&self) -> String {
        match &self.forall {
            Some(f) => format!(
                "{}->forAll({} | {})",
                f.iterated_var, f.iteration_var, f.condition
            ),
            None => self.condition.clone(),
        }
    }
}

/// A node's creation condition: either a predicate condition over a bound
/// variable's attribute, or a list of triggering events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// `[not ]var.attr`
    Condition(String),
    /// `trigger E1,E2`
    Trigger(Vec<String>),
}

impl Context {
    pub fn render(&self) -> String {
        match self {
            Self::Condition(c) => c.clone(),
            Self::Trigger(events) => format!("trigger {}", events.join(",")),
        }
    }
}

/// Parse an `AchieveCondition` property value. Quantified conditions use the
/// `collection->forAll(item | body)` form; anything else is kept verbatim as
/// an unquantified condition.
pub fn parse_achieve_condition(raw: &str, node: &str) -> Result<AchieveCondition> {
    let raw = raw.trim();
    if !raw.contains("forAll") {
        return Ok(AchieveCondition {
            forall: None,
            condition: raw.to_string(),
        });
    }

    let (iterated, iteration, condition) = parse_forall_expr(raw, node)?;
    Ok(AchieveCondition {
        forall: Some(ForAllExpr {
            iterated_var: iterated,
            iteration_var: iteration,
            condition,
        }),
        condition: String::new(),
    })
}

/// Parse `collection->forAll(item | body)` into
/// `(iterated_var, iteration_var, body)`.
pub fn parse_forall_expr(expr: &str, node: &str) -> Result<(String, String, String)> {
    let accepted = [
        // Empty or truthy-attribute body.
        r"^[a-zA-Z][\w.]*->forAll\([a-zA-Z][\w.]*\s*\|\s*(!?[a-zA-Z][\w.]*)?\)$",
        // Attribute equality / difference against a number.
        r"^[a-zA-Z][\w.]*->forAll\([a-zA-Z][\w.]*\s*\|\s*[a-zA-Z][\w.]*\s+(=|<>)\s+([0-9]*\.)?[0-9]+\)$",
        // Ordered comparison against a number.
        r"^[a-zA-Z][\w.]*->forAll\([a-zA-Z][\w.]*\s*\|\s*[a-zA-Z][\w.]*\s+(>|<|>=|<=)\s+([0-9]*\.)?[0-9]+\)$",
    ];
    let matched = accepted
        .iter()
        .any(|p| Regex::new(p).expect("forAll pattern").is_match(expr));
    if !matched {
        return Err(PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid forAll statement [{expr}]"),
        });
    }

    let (iterated, rest) = expr.split_once("->forAll(").ok_or_else(|| {
        PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid forAll statement [{expr}]"),
        }
    })?;
    let body = rest.trim_end_matches(')');
    let (iteration, condition) = body.split_once('|').ok_or_else(|| {
        PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid forAll statement [{expr}]"),
        }
    })?;

    let iterated = iterated.trim().to_string();
    let iteration = iteration.trim().to_string();
    if iterated.is_empty() || iteration.is_empty() {
        return Err(PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid forAll statement [{expr}]"),
        });
    }
    Ok((iterated, iteration, condition.trim().to_string()))
}

/// Parse a `CreationCondition` property value: `trigger E1,E2` for event
/// triggers, otherwise a `[not ]var.attr` condition.
pub fn parse_context_condition(raw: &str, node: &str) -> Result<Context> {
    let raw = raw.trim();
    if let Some(events) = raw.strip_prefix("trigger ") {
        let events: Vec<String> = events
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if events.is_empty() {
            return Err(PlanError::InvalidExpression {
                node: node.to_string(),
                detail: format!("trigger context without events [{raw}]"),
            });
        }
        return Ok(Context::Trigger(events));
    }

    let condition_re =
        Regex::new(r"^(not\s+|!)?[a-zA-Z][\w]*\.[a-zA-Z][\w]*$").expect("context pattern");
    if !condition_re.is_match(raw) {
        return Err(PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid context condition [{raw}]"),
        });
    }
    Ok(Context::Condition(raw.to_string()))
}

/// A context condition resolved against the semantic mappings: the required
/// sign, the goal-model variable, and the mapped predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPredicate {
    pub positive: bool,
    pub variable: String,
    pub predicate: PredicateDef,
}

/// Resolve a condition context's `[not ]var.attr` into the predicate the
/// semantic-mapping table assigns to the attribute.
pub fn context_predicate(
    context: &Context,
    semantic_mappings: &[SemanticMapping],
) -> Result<ContextPredicate> {
    let Context::Condition(condition) = context else {
        return Err(PlanError::InvalidExpression {
            node: String::new(),
            detail: "trigger contexts carry no predicate".into(),
        });
    };

    let mut positive = true;
    let mut body = condition.as_str();
    if let Some(rest) = body.strip_prefix("not ") {
        positive = false;
        body = rest.trim_start();
    } else if let Some(rest) = body.strip_prefix('!') {
        positive = false;
        body = rest;
    }

    let (variable, attribute) = body.split_once('.').ok_or_else(|| {
        PlanError::InvalidExpression {
            node: String::new(),
            detail: format!("context condition [{condition}] is not var.attr"),
        }
    })?;

    let mapping = mapping::attribute_predicate(semantic_mappings, attribute)?;
    Ok(ContextPredicate {
        positive,
        variable: variable.to_string(),
        predicate: mapping.map.clone(),
    })
}

/// Build the ground literal a resolved context requires, given the current
/// variable bindings.
pub fn context_literal(
    resolved: &ContextPredicate,
    var_map: &GmVariableMap,
) -> Result<GroundLiteral> {
    let binding = var_map.get(&resolved.variable).ok_or_else(|| {
        PlanError::MalformedGoalModel {
            node: resolved.variable.clone(),
            detail: "context references an unbound variable".into(),
        }
    })?;
    let ArgValue::Single(value) = &binding.value else {
        return Err(PlanError::Unsupported {
            node: resolved.variable.clone(),
            detail: "context conditions over collection variables are not supported".into(),
        });
    };
    Ok(GroundLiteral::new(
        resolved.predicate.name.clone(),
        vec![value.clone()],
        resolved.positive,
    ))
}

/// Whether a condition context is active: the world state must contain the
/// resolved literal with the required sign. Unknown facts leave the context
/// inactive.
pub fn check_context(
    context: &Context,
    world_facts: &[GroundLiteral],
    semantic_mappings: &[SemanticMapping],
    var_map: &GmVariableMap,
) -> Result<bool> {
    let resolved = context_predicate(context, semantic_mappings)?;
    let wanted = context_literal(&resolved, var_map)?;
    Ok(world_facts
        .iter()
        .any(|state| state.same_fact(&wanted) && state.positive == wanted.positive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mission_model::{GmVarBinding, MappingKind};

    fn mappings() -> Vec<SemanticMapping> {
        vec![SemanticMapping {
            mapping_kind: MappingKind::Attribute,
            mapped_type: "predicate".into(),
            name: "charged".into(),
            relates_to: Some("Robot".into()),
            belongs_to: None,
            map: PredicateDef::new("charged", vec!["robot".into()]),
            predicate_type: None,
        }]
    }

    fn bound_vars() -> GmVariableMap {
        let mut map = GmVariableMap::new();
        map.insert(
            "current_robot".into(),
            GmVarBinding {
                value: ArgValue::Single("r1".into()),
                var_type: "Robot".into(),
            },
        );
        map
    }

    #[test]
    fn forall_parse_and_render_round_trip() {
        let parsed = parse_achieve_condition("rooms->forAll(r | )", "G1").unwrap();
        let forall = parsed.forall.as_ref().unwrap();
        assert_eq!(forall.iterated_var, "rooms");
        assert_eq!(forall.iteration_var, "r");
        assert_eq!(parsed.render(), "rooms->forAll(r | )");
    }

    #[test]
    fn malformed_forall_is_an_invalid_expression() {
        let err = parse_achieve_condition("rooms->forAll(r |", "G1").unwrap_err();
        assert!(matches!(err, PlanError::InvalidExpression { .. }));
    }

    #[test]
    fn context_round_trip_and_negation() {
        let ctx = parse_context_condition("not current_robot.charged", "G2").unwrap();
        assert_eq!(ctx.render(), "not current_robot.charged");
        let resolved = context_predicate(&ctx, &mappings()).unwrap();
        assert!(!resolved.positive);
        assert_eq!(resolved.predicate.name, "charged");
        assert_eq!(resolved.variable, "current_robot");
    }

    #[test]
    fn context_activation_requires_matching_sign() {
        let ctx = parse_context_condition("current_robot.charged", "G2").unwrap();
        let facts = vec![GroundLiteral::new("charged", vec!["r1".into()], true)];
        assert!(check_context(&ctx, &facts, &mappings(), &bound_vars()).unwrap());

        let facts = vec![GroundLiteral::new("charged", vec!["r1".into()], false)];
        assert!(!check_context(&ctx, &facts, &mappings(), &bound_vars()).unwrap());

        // Absent facts leave the context inactive.
        assert!(!check_context(&ctx, &[], &mappings(), &bound_vars()).unwrap());
    }

    #[test]
    fn unmapped_attribute_is_a_semantic_mapping_failure() {
        let ctx = parse_context_condition("current_robot.docked", "G2").unwrap();
        let err = check_context(&ctx, &[], &mappings(), &bound_vars()).unwrap_err();
        assert!(matches!(err, PlanError::SemanticMappingFailure { .. }));
    }
}
