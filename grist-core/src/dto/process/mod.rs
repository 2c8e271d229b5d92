//! Process DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::process::{Process, ProcessStatus, StageKind, TriggerKind};

/// Response to a successful submission or iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAccepted {
    pub process_id: Uuid,
    pub iteration: i32,
}

/// Lightweight process row for listing (no metrics payload)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub repository_version: i32,
    pub process_id: Uuid,
    pub iteration: i32,
    pub task_process: StageKind,
    pub trigger_type: TriggerKind,
    pub optimized: bool,
    pub status: ProcessStatus,
    pub duration_ms: Option<i64>,
    pub input_data_size: Option<i64>,
    pub output_data_size: Option<i64>,
    pub validated: bool,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Process> for ProcessSummary {
    fn from(process: Process) -> Self {
        Self {
            id: process.id,
            repository_id: process.repository_id,
            repository_version: process.repository_version,
            process_id: process.process_id,
            iteration: process.iteration,
            task_process: process.task_process,
            trigger_type: process.trigger_type,
            optimized: process.optimized,
            status: process.status,
            duration_ms: process.duration_ms,
            input_data_size: process.input_data_size,
            output_data_size: process.output_data_size,
            validated: process.validated,
            valid: process.valid,
            created_at: process.created_at,
        }
    }
}

/// Result of the `matchVersions` check for a process group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMatch {
    pub process_id: Uuid,
    /// True iff every stored iteration was run against the repository's
    /// current version.
    pub match_versions: bool,
    pub repository_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_summary_conversion() {
        let process = Process {
            id: Uuid::new_v4(),
            repository_id: Uuid::new_v4(),
            repository_version: 3,
            process_id: Uuid::new_v4(),
            iteration: 2,
            task_process: StageKind::Filter,
            actions: vec![StageKind::Filter, StageKind::Aggregation],
            trigger_type: TriggerKind::User,
            optimized: true,
            status: ProcessStatus::Completed,
            parameters: serde_json::json!([]),
            start_time: Some(Utc::now()),
            end_time: Some(Utc::now()),
            duration_ms: Some(42),
            input_data_size: Some(100),
            output_data_size: Some(60),
            errors: None,
            validated: false,
            valid: false,
            metrics: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let summary: ProcessSummary = process.clone().into();
        assert_eq!(summary.id, process.id);
        assert_eq!(summary.iteration, 2);
        assert_eq!(summary.status, ProcessStatus::Completed);
        assert_eq!(summary.output_data_size, Some(60));
    }
}
