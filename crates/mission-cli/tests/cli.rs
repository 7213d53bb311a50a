//! Black-box runs of the mdecomp binary.

use std::path::Path;
use std::process::Command;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const DOMAIN: &str = r#"{
    "name": "delivery",
    "sorts": [{"name": "robot"}],
    "primitive_tasks": [
        {"name": "go_to", "vars": [{"name": "?r", "sort": "robot"}]}
    ],
    "abstract_tasks": [
        {"name": "Move", "vars": [{"name": "?r", "sort": "robot"}]}
    ],
    "methods": [
        {"name": "m_move", "task": "Move", "task_args": ["?r"],
         "vars": [{"name": "?r", "sort": "robot"}],
         "subtasks": [{"task": "go_to", "args": ["?r"]}]}
    ]
}"#;

const GOAL_MODEL: &str = r#"{
    "actors": [{"id": "a0", "nodes": [
        {"id": "n0", "text": "G1: Mission", "type": "istar.Goal",
         "x": 0.0, "y": 0.0, "customProperties": {}},
        {"id": "n1", "text": "G2: Pick robot", "type": "istar.Goal",
         "x": -10.0, "y": 10.0,
         "customProperties": {
            "GoalType": "Query",
            "Controls": "the_robot : robot",
            "QueriedProperty": "world_db->select(r:robot | )"}},
        {"id": "n2", "text": "AT1: Move", "type": "istar.Task",
         "x": 10.0, "y": 10.0, "customProperties": {}}
    ]}],
    "links": [
        {"type": "istar.AndRefinementLink", "source": "n1", "target": "n0"},
        {"type": "istar.AndRefinementLink", "source": "n2", "target": "n0"}
    ]
}"#;

const WORLD: &str = r#"{"world_db": {"robot": [{"name": "r1"}]}}"#;

fn config(world_path: &Path, output_dir: &Path) -> String {
    format!(
        r#"world_db:
  type: file
  file_type: json
  path: {}
output:
  output_type: file
  file_path: {}
  file_type: json
var_mapping:
  - task_id: AT1
    map:
      - gm_var: the_robot
        domain_var: "?r"
"#,
        world_path.display(),
        output_dir.display()
    )
}

#[test]
fn plan_writes_an_ihtn_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let domain = write(dir.path(), "domain.json", DOMAIN);
    let gm = write(dir.path(), "gm.json", GOAL_MODEL);
    let world = write(dir.path(), "world.json", WORLD);
    let output_dir = dir.path().join("out");
    let config = write(dir.path(), "config.yaml", &config(&world, &output_dir));

    let status = Command::new(env!("CARGO_BIN_EXE_mdecomp"))
        .args(["plan", "--domain"])
        .arg(&domain)
        .arg("--goal-model")
        .arg(&gm)
        .arg("--config")
        .arg(&config)
        .status()
        .unwrap();
    assert!(status.success());

    let ihtn = output_dir.join("ihtn_1.json");
    assert!(ihtn.exists(), "missing {}", ihtn.display());

    let content: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&ihtn).unwrap()).unwrap();
    assert_eq!(content["0"]["name"], "ROOT");
    assert_eq!(content["0"]["parent"], -1);
}

#[test]
fn unsupported_database_type_exits_with_validation_code() {
    let dir = tempfile::tempdir().unwrap();
    let domain = write(dir.path(), "domain.json", DOMAIN);
    let gm = write(dir.path(), "gm.json", GOAL_MODEL);
    let config = write(
        dir.path(),
        "config.yaml",
        "world_db:\n  type: file\n  file_type: xml\n  path: db.xml\n",
    );

    let status = Command::new(env!("CARGO_BIN_EXE_mdecomp"))
        .args(["check", "--domain"])
        .arg(&domain)
        .arg("--goal-model")
        .arg(&gm)
        .arg("--config")
        .arg(&config)
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}
