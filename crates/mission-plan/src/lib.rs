//! The mission decomposition pipeline.
//!
//! Lowers a goal model plus a hierarchical planning domain into every valid,
//! totally-ordered instantiated HTN: task-decomposition graphs per abstract
//! task, the abstract-task graph with context and execution-constraint
//! edges, ordering constraints, valid-mission enumeration under simulated
//! world state, and finally iHTN trees ready for serialization.

#![forbid(unsafe_code)]

pub mod atg;
pub mod constraints;
pub mod decomposer;
pub mod ihtn;
pub mod pipeline;
pub mod tdg;
pub mod validator;

pub use atg::{
    can_unite_decompositions, instantiate_decomposition_predicates, AbstractTask, ArgBinding,
    AtContent, AtEdge, AtEdgeKind, AtGraph, AtNode, AtNodeKind, DecompEff, DecompFuncEff,
    DecompPrec, Decomposition, OperatorKind,
};
pub use constraints::{Constraint, ConstraintKind, ConstraintSet};
pub use decomposer::{base_id, MissionDecomposer, PathTable};
pub use ihtn::{IhtnEmitter, IhtnTree};
pub use pipeline::{Pipeline, PipelineOptions};
pub use tdg::{
    CompleteDecompositionPath, DecompositionNode, DecompositionPath, ExpansionFragment, Tdg,
    TdgContent,
};
pub use validator::{
    check_decomposition_preconditions, expand_decomposition, Mission, ValidMissionGenerator,
    ValidatorConfig,
};
