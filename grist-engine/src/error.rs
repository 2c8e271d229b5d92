//! Engine error types

use grist_core::domain::process::{AggregateOp, FilterOperator, StageKind};
use grist_core::domain::repository::ParameterKind;

/// Configuration rejected before execution
///
/// Returned synchronously at submission; no Process record is ever created
/// for a configuration that fails validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("no active stage in process configuration")]
    NoActiveStage,

    #[error("{stage} stage is active but has no parameters")]
    EmptyStage { stage: StageKind },

    #[error("{stage} stage references unknown parameter '{name}'")]
    UnknownParameter { stage: StageKind, name: String },

    #[error("operator '{operator}' is not valid for {kind} parameter '{name}'")]
    InvalidOperator {
        name: String,
        operator: FilterOperator,
        kind: ParameterKind,
    },

    #[error("filter condition on '{name}' is missing a value")]
    MissingValue { name: String },

    #[error("filter value for '{name}' cannot be read as {kind}")]
    InvalidValue { name: String, kind: ParameterKind },

    #[error("duplicate group parameter '{name}'")]
    DuplicateGroupKey { name: String },

    #[error("aggregation parameter '{name}' is not numeric")]
    NonNumericAggregation { name: String },

    #[error("aggregation for '{name}' requests no operations")]
    EmptyOperations { name: String },

    #[error("duplicate operation '{op}' for aggregation parameter '{name}'")]
    DuplicateOperation { name: String, op: AggregateOp },
}

/// Runtime failure inside a stage executor
///
/// Caught at the orchestrator boundary and converted to a terminal `failed`
/// process state; never propagated as a crash.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("value '{value}' for parameter '{parameter}' cannot be coerced to {kind}")]
    TypeCoercion {
        parameter: String,
        value: String,
        kind: ParameterKind,
    },
}
