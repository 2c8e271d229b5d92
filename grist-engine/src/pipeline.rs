//! Pipeline execution
//!
//! Drives the stage executors in the authoritative order
//! filter → group → aggregation, whatever order the caller supplied stages
//! in. Group and aggregation only ever see the filter's output when a filter
//! is active.
//!
//! The execution strategy decides how records are fed to the stage logic,
//! nothing else — both strategies run the same executors, so optimized and
//! baseline runs stay comparable.

use grist_core::domain::process::StageKind;
use grist_core::domain::record::Record;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::stages::{aggregate, filter, group};
use crate::validator::ResolvedConfig;

/// How records are fed through the stage executors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Materialize the whole record set per stage. The baseline.
    Full,
    /// Stream the filter over fixed-size chunks and concatenate. The
    /// optimized variant benchmarked against the baseline.
    Chunked { chunk_size: usize },
}

impl Strategy {
    pub fn is_optimized(self) -> bool {
        matches!(self, Strategy::Chunked { .. })
    }
}

/// Output of one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub kind: StageKind,
    /// The stored stage output: record ids for filter, buckets for group,
    /// per-parameter (or per-group) aggregates for aggregation.
    pub output: serde_json::Value,
    /// Record count after filter, bucket count after group, null for
    /// aggregation.
    pub output_size: Option<i64>,
}

/// A pipeline run over one record snapshot
///
/// The orchestrator drives stages one at a time so it can wrap each with
/// timing and telemetry; `execute` runs them all for recomputation and
/// tests.
pub struct Pipeline<'a> {
    records: &'a [Record],
    config: &'a ResolvedConfig,
    strategy: Strategy,
    filtered: Option<Vec<Record>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(records: &'a [Record], config: &'a ResolvedConfig, strategy: Strategy) -> Self {
        Self {
            records,
            config,
            strategy,
            filtered: None,
        }
    }

    /// Active stages in authoritative execution order.
    pub fn stages(&self) -> &[StageKind] {
        &self.config.actions
    }

    /// Record count the pipeline starts from.
    pub fn input_size(&self) -> i64 {
        self.records.len() as i64
    }

    /// Record count the given stage starts from.
    pub fn stage_input_size(&self, kind: StageKind) -> i64 {
        match kind {
            StageKind::Filter => self.records.len() as i64,
            _ => self.current().len() as i64,
        }
    }

    /// Execute one stage. Stages must be run in the order `stages()` lists
    /// them; the filter result is retained so later stages see it.
    pub fn run_stage(&mut self, kind: StageKind) -> Result<StageExecution, ExecError> {
        match kind {
            StageKind::Filter => {
                let passed = match self.strategy {
                    Strategy::Full => filter::apply(self.records, &self.config.filter)?,
                    Strategy::Chunked { chunk_size } => {
                        let mut passed = Vec::new();
                        for chunk in self.records.chunks(chunk_size.max(1)) {
                            passed.extend(filter::apply(chunk, &self.config.filter)?);
                        }
                        passed
                    }
                };
                let output = serde_json::json!(
                    passed.iter().map(|r| r.id).collect::<Vec<_>>()
                );
                let size = passed.len() as i64;
                self.filtered = Some(passed);
                Ok(StageExecution {
                    kind,
                    output,
                    output_size: Some(size),
                })
            }
            StageKind::Group => {
                let input = self.current();
                let buckets = group::apply(input, &self.config.group)?;
                let output = serde_json::json!(
                    buckets
                        .iter()
                        .map(|b| {
                            serde_json::json!({
                                "group": b.key,
                                "values": b.members.iter().map(|r| r.id).collect::<Vec<_>>(),
                            })
                        })
                        .collect::<Vec<_>>()
                );
                let size = buckets.len() as i64;
                Ok(StageExecution {
                    kind,
                    output,
                    output_size: Some(size),
                })
            }
            StageKind::Aggregation => {
                let input = self.current();
                let output = if self.config.group.is_empty() {
                    let refs: Vec<&Record> = input.iter().collect();
                    serde_json::json!(aggregate::apply(&refs, &self.config.aggregation)?)
                } else {
                    // Group + aggregation means "aggregate within each group".
                    let buckets = group::apply(input, &self.config.group)?;
                    let mut per_group = Vec::with_capacity(buckets.len());
                    for bucket in &buckets {
                        let aggregates =
                            aggregate::apply(&bucket.members, &self.config.aggregation)?;
                        per_group.push(serde_json::json!({
                            "group": bucket.key,
                            "aggregates": aggregates,
                        }));
                    }
                    serde_json::json!(per_group)
                };
                Ok(StageExecution {
                    kind,
                    output,
                    output_size: None,
                })
            }
        }
    }

    fn current(&self) -> &[Record] {
        self.filtered.as_deref().unwrap_or(self.records)
    }
}

/// Run every active stage and collect the outputs.
///
/// Used by the validation sweep's recomputation and anywhere per-stage
/// timing is not needed.
pub fn execute(
    records: &[Record],
    config: &ResolvedConfig,
    strategy: Strategy,
) -> Result<Vec<StageExecution>, ExecError> {
    let mut pipeline = Pipeline::new(records, config, strategy);
    let stages = pipeline.stages().to_vec();
    let mut executions = Vec::with_capacity(stages.len());
    for kind in stages {
        executions.push(pipeline.run_stage(kind)?);
    }
    Ok(executions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use chrono::Utc;
    use grist_core::domain::process::{
        AggregateOp, AggregationSpec, FilterCondition, FilterOperator, ProcessConfig, StageSpec,
    };
    use grist_core::domain::repository::{Parameter, ParameterKind};
    use uuid::Uuid;

    fn schema() -> Vec<Parameter> {
        vec![
            Parameter {
                name: "status".to_string(),
                kind: ParameterKind::String,
            },
            Parameter {
                name: "amount".to_string(),
                kind: ParameterKind::Number,
            },
        ]
    }

    fn record(status: &str, amount: f64) -> Record {
        let mut data = serde_json::Map::new();
        data.insert("status".to_string(), serde_json::json!(status));
        data.insert("amount".to_string(), serde_json::json!(amount));
        Record {
            id: Uuid::new_v4(),
            repository_id: Uuid::new_v4(),
            data,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn records() -> Vec<Record> {
        vec![
            record("active", 10.0),
            record("active", 20.0),
            record("inactive", 5.0),
        ]
    }

    fn full_config() -> ProcessConfig {
        ProcessConfig {
            filter: StageSpec {
                active: true,
                parameters: vec![FilterCondition {
                    name: "status".to_string(),
                    operator: FilterOperator::Eq,
                    value: serde_json::json!("active"),
                }],
            },
            group: StageSpec {
                active: true,
                parameters: vec!["status".to_string()],
            },
            aggregation: StageSpec {
                active: true,
                parameters: vec![AggregationSpec {
                    name: "amount".to_string(),
                    operations: vec![AggregateOp::Sum, AggregateOp::Mean],
                }],
            },
        }
    }

    #[test]
    fn test_end_to_end_filter_and_aggregation() {
        let config = ProcessConfig {
            filter: StageSpec {
                active: true,
                parameters: vec![FilterCondition {
                    name: "status".to_string(),
                    operator: FilterOperator::Eq,
                    value: serde_json::json!("active"),
                }],
            },
            aggregation: StageSpec {
                active: true,
                parameters: vec![AggregationSpec {
                    name: "amount".to_string(),
                    operations: vec![AggregateOp::Sum, AggregateOp::Mean],
                }],
            },
            ..Default::default()
        };
        let resolved = validate(&config, &schema()).unwrap();
        let executions = execute(&records(), &resolved, Strategy::Full).unwrap();

        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].output_size, Some(2));

        let aggregates = executions[1].output.as_array().unwrap();
        assert_eq!(aggregates[0]["results"]["sum"], serde_json::json!(30.0));
        assert_eq!(aggregates[0]["results"]["mean"], serde_json::json!(15.0));
        assert_eq!(executions[1].output_size, None);
    }

    #[test]
    fn test_group_and_aggregation_only_see_filter_output() {
        // The inactive record would add a bucket and change the sum if any
        // stage saw the raw input.
        let resolved = validate(&full_config(), &schema()).unwrap();
        let executions = execute(&records(), &resolved, Strategy::Full).unwrap();

        let group = &executions[1];
        assert_eq!(group.output_size, Some(1));

        let aggregation = &executions[2];
        let per_group = aggregation.output.as_array().unwrap();
        assert_eq!(per_group.len(), 1);
        assert_eq!(per_group[0]["group"], serde_json::json!("active"));
        assert_eq!(
            per_group[0]["aggregates"][0]["results"]["sum"],
            serde_json::json!(30.0)
        );
    }

    #[test]
    fn test_chunked_strategy_matches_full_strategy() {
        let resolved = validate(&full_config(), &schema()).unwrap();
        let records = records();

        let full = execute(&records, &resolved, Strategy::Full).unwrap();
        let chunked = execute(&records, &resolved, Strategy::Chunked { chunk_size: 2 }).unwrap();

        for (a, b) in full.iter().zip(chunked.iter()) {
            assert_eq!(a.output, b.output);
            assert_eq!(a.output_size, b.output_size);
        }
    }

    #[test]
    fn test_zero_records_after_filter_yields_empty_results() {
        let config = ProcessConfig {
            filter: StageSpec {
                active: true,
                parameters: vec![FilterCondition {
                    name: "status".to_string(),
                    operator: FilterOperator::Eq,
                    value: serde_json::json!("archived"),
                }],
            },
            group: StageSpec {
                active: true,
                parameters: vec!["status".to_string()],
            },
            ..Default::default()
        };
        let resolved = validate(&config, &schema()).unwrap();
        let executions = execute(&records(), &resolved, Strategy::Full).unwrap();

        assert_eq!(executions[0].output_size, Some(0));
        assert_eq!(executions[1].output_size, Some(0));
        assert_eq!(executions[1].output, serde_json::json!([]));
    }

    #[test]
    fn test_stage_input_sizes() {
        let resolved = validate(&full_config(), &schema()).unwrap();
        let records = records();
        let mut pipeline = Pipeline::new(&records, &resolved, Strategy::Full);

        assert_eq!(pipeline.stage_input_size(StageKind::Filter), 3);
        pipeline.run_stage(StageKind::Filter).unwrap();
        assert_eq!(pipeline.stage_input_size(StageKind::Group), 2);
        assert_eq!(pipeline.stage_input_size(StageKind::Aggregation), 2);
    }
}
