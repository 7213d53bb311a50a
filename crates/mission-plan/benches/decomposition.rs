use criterion::{criterion_group, criterion_main, Criterion};

use mission_model::{Domain, Method, SortDef, Subtask, Task, TypedVar};
use mission_plan::Tdg;

/// A domain with layered OR choices: `fetch` decomposes through one of
/// `width` methods, each chaining `depth` primitive steps.
fn layered_domain(width: usize, depth: usize) -> Domain {
    let mut domain = Domain {
        name: "bench".into(),
        sorts: vec![SortDef {
            name: "robot".into(),
            parent: None,
        }],
        abstract_tasks: vec![Task {
            name: "fetch".into(),
            vars: vec![TypedVar::new("?r", "robot")],
            preconditions: vec![],
            effects: vec![],
            cost: None,
            original_var_count: 0,
        }],
        ..Domain::default()
    };

    for step in 0..depth {
        domain.primitive_tasks.push(Task {
            name: format!("step_{step}"),
            vars: vec![TypedVar::new("?r", "robot")],
            preconditions: vec![],
            effects: vec![],
            cost: None,
            original_var_count: 0,
        });
    }

    for m in 0..width {
        domain.methods.push(Method {
            name: format!("m_{m}"),
            task: "fetch".into(),
            task_args: vec!["?r".into()],
            vars: vec![TypedVar::new("?r", "robot")],
            preconditions: vec![],
            subtasks: (0..depth)
                .map(|step| Subtask {
                    task: format!("step_{step}"),
                    args: vec!["?r".into()],
                })
                .collect(),
        });
    }

    domain
}

fn bench_tdg_paths(c: &mut Criterion) {
    let domain = layered_domain(8, 6);
    let root = domain.abstract_task("fetch").unwrap().clone();

    c.bench_function("tdg_build", |b| {
        b.iter(|| Tdg::build(&root, &domain).unwrap())
    });

    let tdg = Tdg::build(&root, &domain).unwrap();
    c.bench_function("tdg_paths", |b| b.iter(|| tdg.paths(&[]).unwrap()));
}

criterion_group!(benches, bench_tdg_paths);
criterion_main!(benches);
