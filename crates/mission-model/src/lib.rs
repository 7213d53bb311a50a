//! Planning-domain data model for the mission decomposition pipeline.
//!
//! Everything here is plain data: predicates and literals, tasks and methods,
//! the simulated world state, and the configuration-level mapping tables that
//! relate goal-model concepts to domain predicates.

#![forbid(unsafe_code)]

pub mod error;
pub mod literal;
pub mod mapping;
pub mod state;
pub mod task;

pub use error::{PlanError, Result};
pub use literal::{
    ComparisonOp, FunctionComparison, FunctionEffect, FunctionEffectKind, GroundComparison,
    GroundFunctionEffect, GroundLiteral, Literal, Numeric, PredicateDef,
};
pub use mapping::{
    ArgValue, GmVarBinding, GmVariableMap, MappingKind, SemanticMapping, VariableMapping,
};
pub use state::{FunctionValue, WorldState};
pub use task::{Domain, Effect, Method, Precondition, SortDef, Subtask, Task, TypedVar};

/// Domain sort used for single robots.
pub const ROBOT_SORT: &str = "robot";

/// Domain sort used for robot teams.
pub const ROBOT_TEAM_SORT: &str = "robotteam";
