//! System-run scheduler
//!
//! Periodically replays user-submitted process groups as system-triggered
//! runs so optimized/baseline comparison data accumulates without user
//! interaction. Only groups pinned at the repository's current version and
//! without an existing system counterpart are eligible, and nothing is
//! scheduled while other processes are still active.

use std::sync::Arc;

use grist_core::domain::process::TriggerKind;
use sqlx::PgPool;
use tokio::time;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::service::process::clone_rows_for_run;
use crate::store::{processes, repositories};

/// Scheduler that creates system-triggered comparison runs
pub struct SystemRunScheduler {
    pool: PgPool,
    config: Arc<Config>,
}

impl SystemRunScheduler {
    pub fn new(pool: PgPool, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    /// Starts the scheduling loop
    pub async fn run(&self) {
        info!(
            "Starting system-run scheduler (interval: {:?})",
            self.config.system_runs_interval
        );

        let mut interval = time::interval(self.config.system_runs_interval);

        loop {
            interval.tick().await;

            if let Err(e) = self.schedule_once().await {
                error!("Error during system-run scheduling: {:?}", e);
            }
        }
    }

    async fn schedule_once(&self) -> Result<(), sqlx::Error> {
        if processes::any_active(&self.pool).await? {
            debug!("Active processes present; deferring system runs to the next cycle");
            return Ok(());
        }

        let ready = repositories::list_data_ready(&self.pool).await?;
        if ready.is_empty() {
            debug!("No repositories with data ready");
            return Ok(());
        }

        for repository in ready {
            let groups =
                processes::user_groups_at_version(&self.pool, repository.id, repository.version)
                    .await?;

            for process_id in groups {
                if processes::has_system_runs(&self.pool, process_id).await? {
                    continue;
                }

                let rows =
                    processes::find_group(&self.pool, process_id, 1, TriggerKind::User).await?;
                if rows.is_empty() {
                    continue;
                }

                let system_rows =
                    clone_rows_for_run(&rows, 1, TriggerKind::System, repository.version);
                processes::create_many(&self.pool, &system_rows).await?;

                info!(
                    "Scheduled system comparison run for process group {} on repository {}",
                    process_id, repository.id
                );
            }
        }

        Ok(())
    }
}
