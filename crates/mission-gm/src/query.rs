//! OCL-style `select` expressions and their evaluation against the world
//! knowledge base.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use mission_model::{
    ArgValue, ComparisonOp, GmVarBinding, GmVariableMap, Numeric, PlanError, Result, TypedVar,
};

use crate::knowledge::KnowledgeBase;
use crate::model::is_collection_type;

/// Variables bound by query goals, kept with the raw database subtrees so
/// later queries can run against them: name -> (declared type, elements).
pub type BoundVariables = BTreeMap<String, (String, Vec<Value>)>;

/// One atomic clause of a select expression body.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryClause {
    /// Empty body: every element matches.
    All,
    /// `[!]var.attr`: truthy boolean attribute.
    Truthy { attr: String, negated: bool },
    /// `var.attr = value` / `var.attr <> value`.
    Compare {
        attr: String,
        negated: bool,
        value: String,
    },
    /// `var.attr > n` and friends.
    NumCompare {
        attr: String,
        op: ComparisonOp,
        value: Numeric,
    },
    /// `var.attr in other[.attr]`.
    In { attr: String, collection: String },
}

/// The Boolean tree of a select body: clauses composed with `&&` / `||`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Clause(QueryClause),
    Node {
        left: Box<QueryExpr>,
        right: Box<QueryExpr>,
        is_and: bool,
    },
}

/// A Query goal's `QueriedProperty`: `queried_var->select(v:T | body)`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueriedProperty {
    pub queried_var: String,
    pub query_var: TypedVar,
    pub query: QueryExpr,
}

impl QueriedProperty {
    /// Render back to the textual select form accepted by the parser.
    pub fn render(&self) -> String {
        format!(
            "{}->select({}:{} | {})",
            self.queried_var,
            self.query_var.name,
            self.query_var.sort,
            render_expr(&self.query)
        )
    }
}

fn render_expr(expr: &QueryExpr) -> String {
    match expr {
        QueryExpr::Clause(clause) => render_clause(clause),
        QueryExpr::Node { left, right, is_and } => format!(
            "{} {} {}",
            render_expr(left),
            if *is_and { "&&" } else { "||" },
            render_expr(right)
        ),
    }
}

fn render_clause(clause: &QueryClause) -> String {
    match clause {
        QueryClause::All => String::new(),
        QueryClause::Truthy { attr, negated } => {
            format!("{}{attr}", if *negated { "!" } else { "" })
        }
        QueryClause::Compare { attr, negated, value } => {
            format!("{attr} {} {value}", if *negated { "<>" } else { "=" })
        }
        QueryClause::NumCompare { attr, op, value } => format!("{attr} {op} {value}"),
        QueryClause::In { attr, collection } => format!("{attr} in {collection}"),
    }
}

const VAR_ATTR: &str = r"!?[a-zA-Z][\w.]*";
const EQ_DIFF: &str =
    r#"[a-zA-Z][\w.]*\s+(=|<>)\s+([a-zA-Z][\w]*|"[a-zA-Z][\w]*"|([0-9]*\.)?[0-9]+)"#;
const NUM_COMPARE: &str = r"[a-zA-Z][\w.]*\s+(>=|<=|>|<)\s+([0-9]*\.)?[0-9]+";
const IN_COND: &str = r"[a-zA-Z][\w.]*\s+in\s+[a-zA-Z][\w.]*";

/// Parse a `QueriedProperty` property value of the form
/// `queried_var->select(v:T | body)` where `body` is a Boolean composition
/// of the supported clause shapes. Anything else is an invalid expression.
pub fn parse_select_expr(expr: &str, node: &str) -> Result<QueriedProperty> {
    let expr = expr.trim();
    let shape =
        Regex::new(r"^([a-zA-Z][\w.]*)->select\(([a-zA-Z][\w]*)\s*:\s*([a-zA-Z][\w]*)\s*\|\s*(.*)\)$")
            .expect("select pattern");
    let caps = shape.captures(expr).ok_or_else(|| PlanError::InvalidExpression {
        node: node.to_string(),
        detail: format!("invalid select statement [{expr}]"),
    })?;

    let queried_var = caps[1].to_string();
    let query_var = TypedVar::new(&caps[2], &caps[3]);
    let body = caps[4].trim();

    let query = parse_query_body(body, node)?;
    Ok(QueriedProperty {
        queried_var,
        query_var,
        query,
    })
}

fn parse_query_body(body: &str, node: &str) -> Result<QueryExpr> {
    // Disjunction binds weaker than conjunction.
    if let Some((left, right)) = split_top_level(body, "||") {
        return Ok(QueryExpr::Node {
            left: Box::new(parse_query_body(left.trim(), node)?),
            right: Box::new(parse_query_body(right.trim(), node)?),
            is_and: false,
        });
    }
    if let Some((left, right)) = split_top_level(body, "&&") {
        return Ok(QueryExpr::Node {
            left: Box::new(parse_query_body(left.trim(), node)?),
            right: Box::new(parse_query_body(right.trim(), node)?),
            is_and: true,
        });
    }
    Ok(QueryExpr::Clause(parse_clause(body, node)?))
}

fn split_top_level<'a>(body: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    body.find(op).map(|pos| (&body[..pos], &body[pos + op.len()..]))
}

fn parse_clause(body: &str, node: &str) -> Result<QueryClause> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(QueryClause::All);
    }

    let full = |pattern: &str| Regex::new(&format!("^{pattern}$")).expect("clause pattern");

    if full(IN_COND).is_match(body) {
        let mut parts = body.split_whitespace();
        let attr = parts.next().unwrap_or("").to_string();
        let collection = parts.nth(1).unwrap_or("").to_string();
        return Ok(QueryClause::In {
            attr: strip_var(&attr),
            collection,
        });
    }
    if full(NUM_COMPARE).is_match(body) {
        let mut parts = body.split_whitespace();
        let attr = parts.next().unwrap_or("").to_string();
        let op = ComparisonOp::parse(parts.next().unwrap_or(""))?;
        let value = parse_numeric(parts.next().unwrap_or(""), node)?;
        return Ok(QueryClause::NumCompare {
            attr: strip_var(&attr),
            op,
            value,
        });
    }
    if full(EQ_DIFF).is_match(body) {
        let mut parts = body.split_whitespace();
        let attr = parts.next().unwrap_or("").to_string();
        let negated = parts.next().unwrap_or("") == "<>";
        let value = parts.next().unwrap_or("").trim_matches('"').to_string();
        return Ok(QueryClause::Compare {
            attr: strip_var(&attr),
            negated,
            value,
        });
    }
    if full(VAR_ATTR).is_match(body) {
        let negated = body.starts_with('!');
        let attr = body.trim_start_matches('!');
        return Ok(QueryClause::Truthy {
            attr: strip_var(attr),
            negated,
        });
    }

    Err(PlanError::InvalidExpression {
        node: node.to_string(),
        detail: format!("unsupported select condition [{body}]"),
    })
}

/// Drop the leading `var.` of a `var.attr` path; a bare attribute stays.
fn strip_var(path: &str) -> String {
    match path.split_once('.') {
        Some((_, attr)) => attr.to_string(),
        None => path.to_string(),
    }
}

fn parse_numeric(text: &str, node: &str) -> Result<Numeric> {
    if let Ok(v) = text.parse::<i64>() {
        return Ok(Numeric::Int(v));
    }
    text.parse::<f64>()
        .map(Numeric::Float)
        .map_err(|_| PlanError::InvalidExpression {
            node: node.to_string(),
            detail: format!("invalid numeric literal [{text}]"),
        })
}

/// Solve a Query goal: evaluate its select expression against the knowledge
/// base and bind the goal's first controlled variable.
///
/// The binding is a single element for value-typed variables and the full
/// element list for `Sequence(...)`-typed ones; both forms also record the
/// element subtrees in `bound` so later queries can chain off them.
pub fn solve_query(
    property: &QueriedProperty,
    node_name: &str,
    controls: &[TypedVar],
    kb: &KnowledgeBase,
    bound: &mut BoundVariables,
    var_map: &mut GmVariableMap,
) -> Result<()> {
    let candidates = queried_elements(property, kb, bound, node_name)?;

    let mut selected: Vec<Value> = Vec::new();
    for element in candidates {
        if eval_expr(&property.query, &element, bound, var_map, node_name)? {
            selected.push(element);
        }
    }

    let control = controls.first().ok_or_else(|| PlanError::MalformedGoalModel {
        node: node_name.to_string(),
        detail: "Query goal declares no controlled variable".into(),
    })?;

    let names: Vec<String> = selected
        .iter()
        .map(|element| {
            element
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| PlanError::MalformedGoalModel {
                    node: node_name.to_string(),
                    detail: "knowledge element without a name attribute".into(),
                })
        })
        .collect::<Result<_>>()?;

    if is_collection_type(&control.sort) {
        var_map.insert(
            control.name.clone(),
            GmVarBinding {
                value: ArgValue::Collection(names),
                var_type: control.sort.clone(),
            },
        );
    } else {
        let first = names.first().ok_or_else(|| PlanError::MalformedGoalModel {
            node: node_name.to_string(),
            detail: format!(
                "query bound no element for value variable [{}]",
                control.name
            ),
        })?;
        var_map.insert(
            control.name.clone(),
            GmVarBinding {
                value: ArgValue::Single(first.clone()),
                var_type: control.sort.clone(),
            },
        );
    }

    bound.insert(control.name.clone(), (control.sort.clone(), selected));
    Ok(())
}

/// The element set a select expression ranges over: the world database for
/// `world_db`, otherwise a previously bound collection variable (optionally
/// narrowed to one of its attributes).
fn queried_elements(
    property: &QueriedProperty,
    kb: &KnowledgeBase,
    bound: &BoundVariables,
    node_name: &str,
) -> Result<Vec<Value>> {
    let source = property.queried_var.as_str();
    if source == crate::WORLD_DB_VAR {
        return Ok(kb.elements_of_type(&property.query_var.sort));
    }

    let (var, attr) = match source.split_once('.') {
        Some((var, attr)) => (var, Some(attr)),
        None => (source, None),
    };
    let (_, elements) = bound.get(var).ok_or_else(|| PlanError::MalformedGoalModel {
        node: node_name.to_string(),
        detail: format!("select over unbound variable [{var}]"),
    })?;

    match attr {
        None => Ok(elements.clone()),
        Some(attr) => {
            let first = elements.first().ok_or_else(|| PlanError::MalformedGoalModel {
                node: node_name.to_string(),
                detail: format!("select over empty binding [{var}]"),
            })?;
            let subtree = first.get(attr).ok_or_else(|| PlanError::MalformedGoalModel {
                node: node_name.to_string(),
                detail: format!("bound variable [{var}] has no attribute [{attr}]"),
            })?;
            Ok(KnowledgeBase::elements_of(subtree, &property.query_var.sort))
        }
    }
}

fn eval_expr(
    expr: &QueryExpr,
    element: &Value,
    bound: &BoundVariables,
    var_map: &GmVariableMap,
    node_name: &str,
) -> Result<bool> {
    match expr {
        QueryExpr::Clause(clause) => eval_clause(clause, element, bound, var_map, node_name),
        QueryExpr::Node { left, right, is_and } => {
            let l = eval_expr(left, element, bound, var_map, node_name)?;
            let r = eval_expr(right, element, bound, var_map, node_name)?;
            Ok(if *is_and { l && r } else { l || r })
        }
    }
}

fn eval_clause(
    clause: &QueryClause,
    element: &Value,
    bound: &BoundVariables,
    var_map: &GmVariableMap,
    node_name: &str,
) -> Result<bool> {
    match clause {
        QueryClause::All => Ok(true),
        QueryClause::Truthy { attr, negated } => {
            let Some(value) = attr_value(element, attr) else {
                return Ok(false);
            };
            let truthy = match value {
                Value::Bool(b) => *b,
                Value::String(s) => s.eq_ignore_ascii_case("true"),
                _ => false,
            };
            Ok(truthy != *negated)
        }
        QueryClause::Compare { attr, negated, value } => {
            let Some(actual) = attr_value(element, attr) else {
                return Ok(false);
            };
            let equal = scalar_to_string(actual) == *value;
            Ok(equal != *negated)
        }
        QueryClause::NumCompare { attr, op, value } => {
            let Some(actual) = attr_value(element, attr) else {
                return Ok(false);
            };
            let Some(actual) = scalar_to_numeric(actual) else {
                return Ok(false);
            };
            Ok(actual.compare(*op, *value))
        }
        QueryClause::In { attr, collection } => {
            let Some(actual) = attr_value(element, attr) else {
                return Ok(false);
            };
            let needle = scalar_to_string(actual);
            membership(collection, &needle, bound, var_map, node_name)
        }
    }
}

/// Resolve membership of `needle` in a collection reference: either a bound
/// collection variable, or `var.attr` naming a list-valued attribute of a
/// bound variable.
fn membership(
    collection: &str,
    needle: &str,
    bound: &BoundVariables,
    var_map: &GmVariableMap,
    node_name: &str,
) -> Result<bool> {
    match collection.split_once('.') {
        None => {
            let binding = var_map.get(collection).ok_or_else(|| {
                PlanError::MalformedGoalModel {
                    node: node_name.to_string(),
                    detail: format!("in statement references unbound variable [{collection}]"),
                }
            })?;
            match &binding.value {
                ArgValue::Collection(values) => Ok(values.iter().any(|v| v == needle)),
                ArgValue::Single(_) => Err(PlanError::MalformedGoalModel {
                    node: node_name.to_string(),
                    detail: format!(
                        "in statement over non-collection variable [{collection}]"
                    ),
                }),
            }
        }
        Some((var, attr)) => {
            let (_, elements) = bound.get(var).ok_or_else(|| PlanError::MalformedGoalModel {
                node: node_name.to_string(),
                detail: format!("in statement references unbound variable [{var}]"),
            })?;
            let first = elements.first().ok_or_else(|| PlanError::MalformedGoalModel {
                node: node_name.to_string(),
                detail: format!("in statement over empty binding [{var}]"),
            })?;
            let Some(list) = first.get(attr) else {
                return Ok(false);
            };
            match list {
                Value::Array(items) => Ok(items.iter().any(|i| scalar_to_string(i) == needle)),
                Value::String(s) => Ok(s.split_whitespace().any(|i| i == needle)),
                _ => Err(PlanError::MalformedGoalModel {
                    node: node_name.to_string(),
                    detail: format!("attribute [{attr}] of [{var}] is not list-valued"),
                }),
            }
        }
    }
}

fn attr_value<'a>(element: &'a Value, attr: &str) -> Option<&'a Value> {
    let mut current = element;
    for part in attr.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_to_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Numeric::Int(i))
            } else {
                n.as_f64().map(Numeric::Float)
            }
        }
        Value::String(s) => {
            if let Ok(i) = s.parse::<i64>() {
                Some(Numeric::Int(i))
            } else {
                s.parse::<f64>().ok().map(Numeric::Float)
            }
        }
        _ => None,
    }
}
