//! Pipeline error type.
//!
//! Every failure is fatal at its stage. Each variant carries the offending
//! construct's user-facing id (goal, task, or config key) plus a detail
//! string; the CLI maps variants onto process exit codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("malformed goal model at [{node}]: {detail}")]
    MalformedGoalModel { node: String, detail: String },

    #[error("malformed configuration [{key}]: {detail}")]
    MalformedConfig { key: String, detail: String },

    #[error("inconsistent planning domain at [{node}]: {detail}")]
    DomainInconsistency { node: String, detail: String },

    #[error("invalid expression in [{node}]: {detail}")]
    InvalidExpression { node: String, detail: String },

    #[error("no semantic mapping for [{attribute}]: {detail}")]
    SemanticMappingFailure { attribute: String, detail: String },

    #[error("no valid mission decomposition: {detail}")]
    NoValidMission { detail: String },

    #[error("unsupported construct at [{node}]: {detail}")]
    Unsupported { node: String, detail: String },

    #[error("search budget exceeded: {detail}")]
    SearchBudgetExceeded { detail: String },
}

impl PlanError {
    /// Process exit code for this error: 2 for input validation, 3 for
    /// semantic failures during decomposition, 4 for budget exhaustion.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MalformedGoalModel { .. }
            | Self::MalformedConfig { .. }
            | Self::DomainInconsistency { .. }
            | Self::InvalidExpression { .. }
            | Self::SemanticMappingFailure { .. } => 2,
            Self::NoValidMission { .. } | Self::Unsupported { .. } => 3,
            Self::SearchBudgetExceeded { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_stage() {
        let validation = PlanError::MalformedGoalModel {
            node: "G1".into(),
            detail: "x".into(),
        };
        assert_eq!(validation.exit_code(), 2);

        let semantic = PlanError::NoValidMission { detail: "x".into() };
        assert_eq!(semantic.exit_code(), 3);

        let budget = PlanError::SearchBudgetExceeded { detail: "x".into() };
        assert_eq!(budget.exit_code(), 4);
    }
}
