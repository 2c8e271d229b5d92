//! Process domain types
//!
//! A `Process` is one persisted execution record: one stage of one pipeline
//! run, under one execution strategy. All Process rows created by the same
//! submission share a `process_id`, and re-runs of that submission increment
//! `iteration`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::metric::MetricSample;

/// Persisted process execution record
///
/// Created by the orchestrator at submission, mutated only by the
/// orchestrator (status/timing/metrics/sizes) and the validation sweep
/// (`validated`/`valid`). Never deleted individually, only bulk-deleted with
/// the owning repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: Uuid,
    pub repository_id: Uuid,
    /// Repository version at submission time. Drift between iterations is
    /// detected by comparing this against the live repository version.
    pub repository_version: i32,
    /// Groups all stage rows and iterations of one submitted pipeline.
    pub process_id: Uuid,
    pub iteration: i32,
    pub task_process: StageKind,
    /// All stages executed by the pipeline this row belongs to.
    pub actions: Vec<StageKind>,
    pub trigger_type: TriggerKind,
    pub optimized: bool,
    pub status: ProcessStatus,
    /// Resolved stage parameters as validated at submission.
    pub parameters: serde_json::Value,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub input_data_size: Option<i64>,
    /// Record count after the stage. Meaningless for aggregation rows,
    /// which always carry `None`.
    pub output_data_size: Option<i64>,
    pub errors: Option<String>,
    pub validated: bool,
    pub valid: bool,
    pub metrics: Vec<MetricSample>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored stage output, kept separately from the Process row so the
/// validation sweep can recompute and compare it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub id: Uuid,
    /// The Process row this output belongs to.
    pub process_item_id: Uuid,
    pub process_id: Uuid,
    pub task_process: StageKind,
    pub optimized: bool,
    pub iteration: i32,
    pub trigger_type: TriggerKind,
    pub output: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Process execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Completed | ProcessStatus::Failed)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Pending => write!(f, "pending"),
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Completed => write!(f, "completed"),
            ProcessStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One of the three pipeline stages, in their fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Filter,
    Group,
    Aggregation,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Filter => write!(f, "filter"),
            StageKind::Group => write!(f, "group"),
            StageKind::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// Provenance of a process run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Interactively submitted through the API.
    User,
    /// Created by the backend scheduler for comparison runs.
    System,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::User => write!(f, "user"),
            TriggerKind::System => write!(f, "system"),
        }
    }
}

// =============================================================================
// Pipeline configuration (submission input)
// =============================================================================

/// Declarative pipeline configuration submitted by a client
///
/// Stages always execute in the fixed order filter → group → aggregation,
/// regardless of how the client arranged them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub filter: StageSpec<Vec<FilterCondition>>,
    #[serde(default)]
    pub group: StageSpec<Vec<String>>,
    #[serde(default)]
    pub aggregation: StageSpec<Vec<AggregationSpec>>,
}

impl ProcessConfig {
    /// Stages marked active, in execution order.
    pub fn active_stages(&self) -> Vec<StageKind> {
        let mut stages = Vec::new();
        if self.filter.active {
            stages.push(StageKind::Filter);
        }
        if self.group.active {
            stages.push(StageKind::Group);
        }
        if self.aggregation.active {
            stages.push(StageKind::Aggregation);
        }
        stages
    }
}

/// One stage's slice of a pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpec<T> {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub parameters: T,
}

/// A single filter predicate; conditions combine as a conjunction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub name: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Comparison operator of a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains")]
    Contains,
}

impl FilterOperator {
    /// Whether this operator is permitted for the given parameter kind.
    /// Strings take equality and substring tests; numbers take the six
    /// comparison operators.
    pub fn applies_to(self, kind: super::repository::ParameterKind) -> bool {
        use super::repository::ParameterKind;
        match kind {
            ParameterKind::String => matches!(
                self,
                FilterOperator::Eq | FilterOperator::Ne | FilterOperator::Contains
            ),
            ParameterKind::Number => !matches!(self, FilterOperator::Contains),
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FilterOperator::Eq => "==",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Ge => ">=",
            FilterOperator::Le => "<=",
            FilterOperator::Contains => "contains",
        };
        write!(f, "{}", s)
    }
}

/// Requested aggregations over one numeric parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub name: String,
    pub operations: Vec<AggregateOp>,
}

/// The fixed aggregation vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Min,
    Max,
    Mean,
    Count,
    Median,
    Std,
    Var,
    First,
    Last,
    Unique,
    Mode,
    Range,
}

impl std::fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Mean => "mean",
            AggregateOp::Count => "count",
            AggregateOp::Median => "median",
            AggregateOp::Std => "std",
            AggregateOp::Var => "var",
            AggregateOp::First => "first",
            AggregateOp::Last => "last",
            AggregateOp::Unique => "unique",
            AggregateOp::Mode => "mode",
            AggregateOp::Range => "range",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::ParameterKind;

    #[test]
    fn test_active_stages_follow_fixed_order() {
        let config = ProcessConfig {
            aggregation: StageSpec {
                active: true,
                parameters: vec![],
            },
            filter: StageSpec {
                active: true,
                parameters: vec![],
            },
            ..Default::default()
        };

        assert_eq!(
            config.active_stages(),
            vec![StageKind::Filter, StageKind::Aggregation]
        );
    }

    #[test]
    fn test_operator_type_compatibility() {
        assert!(FilterOperator::Contains.applies_to(ParameterKind::String));
        assert!(!FilterOperator::Contains.applies_to(ParameterKind::Number));
        assert!(FilterOperator::Gt.applies_to(ParameterKind::Number));
        assert!(!FilterOperator::Gt.applies_to(ParameterKind::String));
        assert!(FilterOperator::Eq.applies_to(ParameterKind::String));
        assert!(FilterOperator::Eq.applies_to(ParameterKind::Number));
    }

    #[test]
    fn test_config_deserializes_with_missing_stages() {
        let config: ProcessConfig = serde_json::from_str(
            r#"{"filter": {"active": true, "parameters": [{"name": "status", "operator": "==", "value": "active"}]}}"#,
        )
        .unwrap();

        assert!(config.filter.active);
        assert!(!config.group.active);
        assert!(!config.aggregation.active);
        assert_eq!(config.filter.parameters.len(), 1);
        assert_eq!(config.filter.parameters[0].operator, FilterOperator::Eq);
    }
}
