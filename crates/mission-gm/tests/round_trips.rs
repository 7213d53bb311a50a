//! Parse/render round trips for the OCL-ish grammars and chained query
//! binding.

use serde_json::json;

use mission_gm::condition::{parse_context_condition, parse_achieve_condition};
use mission_gm::query::{parse_select_expr, solve_query, BoundVariables};
use mission_gm::KnowledgeBase;
use mission_model::{ArgValue, GmVariableMap, TypedVar};

#[test]
fn queried_property_round_trips_through_render() {
    let sources = [
        "world_db->select(r:robot | )",
        "world_db->select(r:robot | r.charged)",
        "world_db->select(r:robot | !r.broken)",
        "world_db->select(r:robot | r.battery > 50)",
        "world_db->select(r:robot | r.site = depot)",
        "world_db->select(r:robot | r.name in fleet)",
        "world_db->select(r:robot | r.charged && r.battery >= 20)",
    ];
    for source in sources {
        let parsed = parse_select_expr(source, "G1").unwrap();
        let reparsed = parse_select_expr(&parsed.render(), "G1").unwrap();
        assert_eq!(parsed, reparsed, "round trip differs for [{source}]");
    }
}

#[test]
fn context_condition_round_trips_through_render() {
    for source in ["robot.charged", "not robot.charged", "trigger E1,E2"] {
        let parsed = parse_context_condition(source, "G1").unwrap();
        let reparsed = parse_context_condition(&parsed.render(), "G1").unwrap();
        assert_eq!(parsed, reparsed, "round trip differs for [{source}]");
    }
}

#[test]
fn achieve_condition_round_trips_through_render() {
    let parsed = parse_achieve_condition("rooms->forAll(r | )", "G1").unwrap();
    let reparsed = parse_achieve_condition(&parsed.render(), "G1").unwrap();
    assert_eq!(parsed, reparsed);
}

#[test]
fn later_queries_see_earlier_bindings() {
    let kb = KnowledgeBase::new(json!({
        "world_db": {
            "room": [
                {"name": "lab", "occupied": true},
                {"name": "hall", "occupied": false},
            ],
            "robot": [
                {"name": "r1", "station": "lab"},
                {"name": "r2", "station": "hall"},
            ],
        }
    }))
    .unwrap();

    let mut bound = BoundVariables::new();
    let mut vars = GmVariableMap::new();

    let rooms = parse_select_expr("world_db->select(r:room | r.occupied)", "G1").unwrap();
    solve_query(
        &rooms,
        "G1",
        &[TypedVar::new("busy_rooms", "Sequence(room)")],
        &kb,
        &mut bound,
        &mut vars,
    )
    .unwrap();

    let robots =
        parse_select_expr("world_db->select(r:robot | r.station in busy_rooms)", "G2").unwrap();
    solve_query(
        &robots,
        "G2",
        &[TypedVar::new("stationed", "Sequence(robot)")],
        &kb,
        &mut bound,
        &mut vars,
    )
    .unwrap();

    assert_eq!(
        vars.get("stationed").unwrap().value,
        ArgValue::Collection(vec!["r1".into()])
    );
}
