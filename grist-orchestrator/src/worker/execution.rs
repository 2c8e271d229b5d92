//! Process group execution
//!
//! Runs one claimed group through the engine: both execution strategies
//! over the same record snapshot, each stage timed and sampled, outputs
//! stored for later validation. Every executor error is caught here and
//! turned into a terminal failed row; nothing escapes once a group is
//! running.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use grist_core::domain::metric::MetricSample;
use grist_core::domain::process::{Process, ProcessResult, StageKind, TriggerKind};
use grist_core::domain::record::Record;
use grist_engine::error::ExecError;
use grist_engine::pipeline::{Pipeline, StageExecution, Strategy};
use grist_engine::telemetry::{ResourceSampler, SamplerConfig};
use grist_engine::validator::ResolvedConfig;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::service::validation::resolved_config_from_rows;
use crate::store::{processes, records, repositories, results};

/// Execute one pending group. Returns false when another claimer got there
/// first (nothing to do).
pub async fn execute_group(
    pool: &PgPool,
    config: &Config,
    process_id: Uuid,
    iteration: i32,
    trigger: TriggerKind,
) -> Result<bool, sqlx::Error> {
    let rows = processes::claim_group(pool, process_id, iteration, trigger).await?;
    if rows.is_empty() {
        return Ok(false);
    }

    info!(
        "Executing process group {} iteration {} ({} rows)",
        process_id,
        iteration,
        rows.len()
    );

    // A deleted repository fails the group; it never silently no-ops.
    let Some(repository) = repositories::find_by_id(pool, rows[0].repository_id).await? else {
        let message = format!("Repository {} no longer exists", rows[0].repository_id);
        warn!("{}", message);
        for row in &rows {
            processes::mark_failed(pool, row.id, None, &[], &message).await?;
        }
        return Ok(true);
    };

    let Some(resolved) = resolved_config_from_rows(&rows) else {
        let message = "Stored stage parameters could not be reconstructed".to_string();
        error!("{} for process group {}", message, process_id);
        for row in &rows {
            processes::mark_failed(pool, row.id, None, &[], &message).await?;
        }
        return Ok(true);
    };

    let record_set = Arc::new(records::list_all_ordered(pool, repository.id).await?);
    let resolved = Arc::new(resolved);

    for strategy in [
        Strategy::Full,
        Strategy::Chunked {
            chunk_size: config.chunk_size,
        },
    ] {
        let strategy_rows: Vec<&Process> = rows
            .iter()
            .filter(|r| r.optimized == strategy.is_optimized())
            .collect();
        if strategy_rows.is_empty() {
            continue;
        }

        let outcomes = {
            let record_set = Arc::clone(&record_set);
            let resolved = Arc::clone(&resolved);
            let sampler_config = config.sampler_config();
            tokio::task::spawn_blocking(move || {
                run_strategy(&record_set, &resolved, strategy, sampler_config)
            })
            .await
        };

        match outcomes {
            Ok(outcomes) => {
                persist_outcomes(pool, &strategy_rows, &outcomes).await?;
            }
            Err(e) => {
                let message = format!("Execution task failed: {}", e);
                error!("{} for process group {}", message, process_id);
                for row in &strategy_rows {
                    processes::mark_failed(pool, row.id, None, &[], &message).await?;
                }
            }
        }
    }

    info!(
        "Process group {} iteration {} finished",
        process_id, iteration
    );

    Ok(true)
}

/// Outcome of one stage run under one strategy
pub(crate) struct StageOutcome {
    pub kind: StageKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub input_size: i64,
    pub metrics: Vec<MetricSample>,
    pub result: Result<StageExecution, ExecError>,
}

/// Run every stage of one strategy, sampling resources around each.
/// Execution stops at the first failing stage; rows for later stages are
/// failed with the upstream cause by the caller.
fn run_strategy(
    record_set: &[Record],
    resolved: &ResolvedConfig,
    strategy: Strategy,
    sampler_config: SamplerConfig,
) -> Vec<StageOutcome> {
    let mut pipeline = Pipeline::new(record_set, resolved, strategy);
    let stages = pipeline.stages().to_vec();
    let mut outcomes = Vec::with_capacity(stages.len());

    for kind in stages {
        let input_size = pipeline.stage_input_size(kind);
        let sampler = ResourceSampler::start(sampler_config.clone());
        let start_time = Utc::now();
        let timer = Instant::now();

        let result = pipeline.run_stage(kind);

        let end_time = Utc::now();
        let duration_ms = timer.elapsed().as_millis() as i64;
        let metrics = sampler.stop();

        let failed = result.is_err();
        outcomes.push(StageOutcome {
            kind,
            start_time,
            end_time,
            duration_ms,
            input_size,
            metrics,
            result,
        });

        if failed {
            break;
        }
    }

    outcomes
}

/// Write one strategy's outcomes onto its process rows.
async fn persist_outcomes(
    pool: &PgPool,
    strategy_rows: &[&Process],
    outcomes: &[StageOutcome],
) -> Result<(), sqlx::Error> {
    let upstream_failure = outcomes.iter().find_map(|o| match &o.result {
        Err(e) => Some((o.kind, e.to_string())),
        Ok(_) => None,
    });

    for row in strategy_rows {
        let outcome = outcomes.iter().find(|o| o.kind == row.task_process);

        match outcome {
            Some(outcome) => match &outcome.result {
                Ok(execution) => {
                    let result = ProcessResult {
                        id: Uuid::new_v4(),
                        process_item_id: row.id,
                        process_id: row.process_id,
                        task_process: row.task_process,
                        optimized: row.optimized,
                        iteration: row.iteration,
                        trigger_type: row.trigger_type,
                        output: execution.output.clone(),
                        created_at: Utc::now(),
                    };
                    results::create(pool, &result).await?;

                    processes::mark_completed(
                        pool,
                        row.id,
                        outcome.start_time,
                        outcome.end_time,
                        outcome.duration_ms,
                        outcome.input_size,
                        execution.output_size,
                        &outcome.metrics,
                    )
                    .await?;
                }
                Err(e) => {
                    processes::mark_failed(
                        pool,
                        row.id,
                        Some(outcome.input_size),
                        &outcome.metrics,
                        &e.to_string(),
                    )
                    .await?;
                }
            },
            None => {
                // Stage never ran because an earlier one failed.
                let message = match &upstream_failure {
                    Some((kind, cause)) => format!("{} errors: {}", kind, cause),
                    None => "Upstream stage did not produce output".to_string(),
                };
                processes::mark_failed(pool, row.id, None, &[], &message).await?;
            }
        }
    }

    Ok(())
}
