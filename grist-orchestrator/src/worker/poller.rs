//! Process poller
//!
//! Polls the database for pending process groups and executes them. Groups
//! run one at a time: the claim flips rows from pending to running
//! atomically, so a second poller instance cannot double-execute a group.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::time;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::worker::execution;

/// Poller that continuously claims and executes pending process groups
pub struct ProcessPoller {
    pool: PgPool,
    config: Arc<Config>,
}

impl ProcessPoller {
    pub fn new(pool: PgPool, config: Arc<Config>) -> Self {
        Self { pool, config }
    }

    /// Starts the polling loop
    pub async fn run(&self) {
        info!(
            "Starting process poller (interval: {:?})",
            self.config.poll_interval
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for pending process groups");

            match self.poll_once().await {
                Ok(executed) => {
                    if executed > 0 {
                        info!("Executed {} process group(s) this cycle", executed);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:?}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle
    async fn poll_once(&self) -> Result<usize, sqlx::Error> {
        let groups = crate::store::processes::find_pending_groups(&self.pool).await?;

        if groups.is_empty() {
            debug!("No pending process groups");
            return Ok(0);
        }

        let mut executed = 0;
        for (process_id, iteration, trigger) in groups {
            match execution::execute_group(&self.pool, &self.config, process_id, iteration, trigger)
                .await
            {
                Ok(ran) => {
                    if ran {
                        executed += 1;
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to execute process group {} iteration {}: {:?}",
                        process_id, iteration, e
                    );
                }
            }
        }

        Ok(executed)
    }
}
