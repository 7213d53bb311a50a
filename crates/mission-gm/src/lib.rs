//! Goal-model handling for the mission decomposition pipeline.
//!
//! Ingests i*-style goal models, parses the OCL-ish condition grammars
//! (select, forAll, context conditions), expands goals into the runtime
//! annotation tree, and binds goal-model variables by querying the world
//! knowledge base.

#![forbid(unsafe_code)]

pub mod annot;
pub mod condition;
pub mod knowledge;
pub mod model;
pub mod query;
pub mod rannot;

pub use annot::{
    build_runtime_annotation, render_runtime_annot, rename_task_instances, AnnotKind, RuntimeAnnot,
};
pub use condition::{AchieveCondition, Context, ForAllExpr};
pub use knowledge::KnowledgeBase;
pub use model::{GmNode, GoalKind, GoalModel, NodeKind, RobotNumber};
pub use query::{QueriedProperty, QueryClause, QueryExpr};

/// Sequential runtime-annotation operator.
pub const OP_SEQ: &str = ";";
/// Parallel runtime-annotation operator.
pub const OP_PAR: &str = "#";
/// Fallback runtime-annotation operator.
pub const OP_FALLBACK: &str = "FALLBACK";
/// Optional runtime-annotation operator.
pub const OP_OPT: &str = "OPT";

/// The reserved variable naming the world database in select expressions.
pub const WORLD_DB_VAR: &str = "world_db";
