//! Validation Service
//!
//! The bulk validation sweep: for every completed process row that has not
//! been through a validation pass, independently recompute the stage output
//! from the stored records at the pinned repository version and compare.
//! Rows that can no longer be re-verified (repository deleted, version moved
//! on, stored parameters unreadable) end up `validated = true, valid =
//! false` rather than staying unvalidated forever. Repeated sweeps are
//! no-ops for already-validated rows.

use std::collections::HashMap;

use grist_core::domain::process::{Process, StageKind, TriggerKind};
use grist_engine::pipeline::{self, StageExecution, Strategy};
use grist_engine::validator::{ResolvedConfig, ResolvedFilter, ResolvedKey};
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::{processes, records, repositories, results};

/// Tolerance when comparing recomputed floating-point aggregates.
const FLOAT_TOLERANCE: f64 = 1e-9;

/// Validate every completed, unvalidated process row, optionally scoped to
/// one repository.
pub async fn validate_all(pool: &PgPool, repository_id: Option<Uuid>) -> Result<(), sqlx::Error> {
    let rows = processes::find_completed_unvalidated(pool, repository_id).await?;
    if rows.is_empty() {
        tracing::info!("No completed processes awaiting validation");
        return Ok(());
    }

    tracing::info!("Validating {} process rows", rows.len());

    // One recomputation per (group iteration, trigger, strategy): all rows
    // of that unit share input and configuration.
    let mut groups: HashMap<(Uuid, i32, TriggerKind, bool), Vec<Process>> = HashMap::new();
    for row in rows {
        groups
            .entry((row.process_id, row.iteration, row.trigger_type, row.optimized))
            .or_default()
            .push(row);
    }

    for ((process_id, iteration, _, _), group) in groups {
        if let Err(e) = validate_group(pool, &group).await {
            tracing::error!(
                "Validation of process {} iteration {} failed: {:?}",
                process_id,
                iteration,
                e
            );
        }
    }

    tracing::info!("Validation sweep completed");
    Ok(())
}

async fn validate_group(pool: &PgPool, group: &[Process]) -> Result<(), sqlx::Error> {
    let first = &group[0];

    let repository = repositories::find_by_id(pool, first.repository_id).await?;
    let reconstructable = repository
        .as_ref()
        .map(|r| r.version == first.repository_version)
        .unwrap_or(false);

    if !reconstructable {
        // Source data has moved on or is gone; the run can never be
        // independently re-verified.
        for row in group {
            processes::set_validation(pool, row.id, false).await?;
        }
        return Ok(());
    }

    let Some(resolved) = resolved_config_from_rows(group) else {
        for row in group {
            processes::set_validation(pool, row.id, false).await?;
        }
        return Ok(());
    };

    let record_set = records::list_all_ordered(pool, first.repository_id).await?;

    // Reference recomputation always uses the baseline strategy.
    let executions = match pipeline::execute(&record_set, &resolved, Strategy::Full) {
        Ok(executions) => executions,
        Err(e) => {
            tracing::warn!(
                "Reference recomputation for process {} failed: {}",
                first.process_id,
                e
            );
            for row in group {
                processes::set_validation(pool, row.id, false).await?;
            }
            return Ok(());
        }
    };

    for row in group {
        let valid = match stored_matches(pool, row, &executions).await? {
            Some(valid) => valid,
            None => false,
        };
        processes::set_validation(pool, row.id, valid).await?;
    }

    Ok(())
}

async fn stored_matches(
    pool: &PgPool,
    row: &Process,
    executions: &[StageExecution],
) -> Result<Option<bool>, sqlx::Error> {
    let Some(stored) = results::find_for_item(pool, row.id).await? else {
        return Ok(None);
    };
    let Some(reference) = executions.iter().find(|e| e.kind == row.task_process) else {
        return Ok(None);
    };
    Ok(Some(values_equal(&stored.output, &reference.output)))
}

/// Rebuild a `ResolvedConfig` from a group's stored per-stage parameters.
pub(crate) fn resolved_config_from_rows(rows: &[Process]) -> Option<ResolvedConfig> {
    let first = rows.first()?;
    let mut resolved = ResolvedConfig {
        actions: first.actions.clone(),
        filter: Vec::new(),
        group: Vec::new(),
        aggregation: Vec::new(),
    };

    for row in rows {
        match row.task_process {
            StageKind::Filter => {
                resolved.filter =
                    serde_json::from_value::<Vec<ResolvedFilter>>(row.parameters.clone()).ok()?;
            }
            StageKind::Group => {
                resolved.group =
                    serde_json::from_value::<Vec<ResolvedKey>>(row.parameters.clone()).ok()?;
            }
            StageKind::Aggregation => {
                resolved.aggregation = serde_json::from_value(row.parameters.clone()).ok()?;
            }
        }
    }

    // Every action the group declares must have contributed its parameters.
    for action in &resolved.actions {
        let present = match action {
            StageKind::Filter => !resolved.filter.is_empty(),
            StageKind::Group => !resolved.group.is_empty(),
            StageKind::Aggregation => !resolved.aggregation.is_empty(),
        };
        if !present {
            return None;
        }
    }

    Some(resolved)
}

/// Structural equality with a tolerance for floating-point leaves.
pub(crate) fn values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= FLOAT_TOLERANCE,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use grist_core::domain::process::ProcessStatus;

    fn row(task: StageKind, parameters: serde_json::Value, actions: Vec<StageKind>) -> Process {
        Process {
            id: Uuid::new_v4(),
            repository_id: Uuid::new_v4(),
            repository_version: 1,
            process_id: Uuid::new_v4(),
            iteration: 1,
            task_process: task,
            actions,
            trigger_type: TriggerKind::User,
            optimized: false,
            status: ProcessStatus::Completed,
            parameters,
            start_time: None,
            end_time: None,
            duration_ms: None,
            input_data_size: None,
            output_data_size: None,
            errors: None,
            validated: false,
            valid: false,
            metrics: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_values_equal_tolerates_float_noise() {
        let a = serde_json::json!({"sum": 30.0, "mean": 15.000000000001});
        let b = serde_json::json!({"sum": 30.0, "mean": 15.0});
        assert!(values_equal(&a, &b));

        let c = serde_json::json!({"sum": 30.0, "mean": 15.1});
        assert!(!values_equal(&a, &c));
    }

    #[test]
    fn test_values_equal_compares_structure() {
        let a = serde_json::json!([{"group": "x", "values": ["a", "b"]}]);
        let b = serde_json::json!([{"group": "x", "values": ["a", "b"]}]);
        let c = serde_json::json!([{"group": "x", "values": ["a"]}]);
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &c));
    }

    #[test]
    fn test_resolved_config_rebuilt_from_rows() {
        let actions = vec![StageKind::Filter, StageKind::Group];
        let filter_params = serde_json::json!([
            {"name": "status", "kind": "string", "operator": "==", "value": {"Text": "active"}}
        ]);
        let group_params = serde_json::json!([{"name": "status", "kind": "string"}]);

        let rows = vec![
            row(StageKind::Filter, filter_params, actions.clone()),
            row(StageKind::Group, group_params, actions.clone()),
        ];

        let resolved = resolved_config_from_rows(&rows).unwrap();
        assert_eq!(resolved.actions, actions);
        assert_eq!(resolved.filter.len(), 1);
        assert_eq!(resolved.group.len(), 1);
    }

    #[test]
    fn test_resolved_config_missing_stage_parameters_is_none() {
        let actions = vec![StageKind::Filter, StageKind::Group];
        let rows = vec![row(
            StageKind::Group,
            serde_json::json!([{"name": "status", "kind": "string"}]),
            actions,
        )];
        assert!(resolved_config_from_rows(&rows).is_none());
    }
}
