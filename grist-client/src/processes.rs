//! Process-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use grist_core::domain::process::ProcessConfig;
use grist_core::dto::page::Page;
use grist_core::dto::process::{ProcessAccepted, VersionMatch};
use uuid::Uuid;

/// Page size used by the batched export of completed processes.
const EXPORT_BATCH_SIZE: i64 = 100;

impl OrchestratorClient {
    /// Submit a pipeline configuration for a repository
    ///
    /// Returns immediately with the accepted group; execution is
    /// asynchronous and observed by polling `list_processes`.
    pub async fn submit_process(
        &self,
        repository_id: Uuid,
        config: &ProcessConfig,
    ) -> Result<ProcessAccepted> {
        let url = format!("{}/processes/{}", self.base_url, repository_id);
        let response = self.post(&url).json(config).send().await?;

        self.handle_response(response).await
    }

    /// List one page of a repository's process rows
    ///
    /// `status` filters by lifecycle state; `select` is a `+`-joined field
    /// projection.
    pub async fn list_processes(
        &self,
        repository_id: Uuid,
        page: i64,
        limit: i64,
        status: Option<&str>,
        select: Option<&str>,
    ) -> Result<Page<serde_json::Value>> {
        let mut url = format!(
            "{}/processes/{}?page={}&limit={}",
            self.base_url, repository_id, page, limit
        );
        if let Some(status) = status {
            url.push_str(&format!("&status={}", status));
        }
        if let Some(select) = select {
            url.push_str(&format!("&select={}", select));
        }
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get one process row through the list endpoint
    pub async fn get_process(
        &self,
        repository_id: Uuid,
        process_item_id: Uuid,
    ) -> Result<Page<serde_json::Value>> {
        let url = format!(
            "{}/processes/{}?_id={}",
            self.base_url, repository_id, process_item_id
        );
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Re-run a user-triggered process group against current data
    pub async fn iterate_process(&self, process_id: Uuid) -> Result<ProcessAccepted> {
        let url = format!("{}/processes/iterate/{}", self.base_url, process_id);
        let response = self.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Whether every stored iteration of a group ran against the
    /// repository's current version
    pub async fn match_versions(&self, process_id: Uuid) -> Result<VersionMatch> {
        let url = format!("{}/processes/versions/{}", self.base_url, process_id);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Trigger the asynchronous validation sweep (admin)
    pub async fn validate_processes(&self) -> Result<()> {
        let url = format!("{}/processes/validate", self.base_url);
        let response = self.put(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Bulk-delete a repository's processes (admin)
    pub async fn delete_processes(&self, repository_id: Uuid) -> Result<()> {
        let url = format!("{}/processes/{}", self.base_url, repository_id);
        let response = self.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Export every completed process row of a repository for offline
    /// analysis, reading pages of 100 until the listing is exhausted
    pub async fn export_completed(&self, repository_id: Uuid) -> Result<Vec<serde_json::Value>> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let batch = self
                .list_processes(
                    repository_id,
                    page,
                    EXPORT_BATCH_SIZE,
                    Some("completed"),
                    None,
                )
                .await?;

            let total_pages = batch.total_pages;
            all.extend(batch.items);

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            "Exported {} completed process rows for repository {}",
            all.len(),
            repository_id
        );

        Ok(all)
    }
}
