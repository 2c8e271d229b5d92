//! Repository-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use grist_core::domain::repository::Repository;
use grist_core::dto::page::Page;
use grist_core::dto::repository::{CreateRepository, UpdateRepository};
use uuid::Uuid;

impl OrchestratorClient {
    /// Create a repository with its parameter schema and initial records
    pub async fn create_repository(&self, req: &CreateRepository) -> Result<Repository> {
        let url = format!("{}/repositories", self.base_url);
        let response = self.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// List one page of repositories
    pub async fn list_repositories(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Page<serde_json::Value>> {
        let url = format!(
            "{}/repositories?page={}&limit={}",
            self.base_url, page, limit
        );
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Fetch one repository through the list endpoint with a field projection
    ///
    /// The engine-facing projection: schema, version and readiness, nothing
    /// else.
    pub async fn get_repository_schema(
        &self,
        repository_id: Uuid,
    ) -> Result<Page<serde_json::Value>> {
        let url = format!(
            "{}/repositories?_id={}&select=parameters+version+data_ready+current_data_size",
            self.base_url, repository_id
        );
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get full repository details by ID
    pub async fn get_repository(&self, repository_id: Uuid) -> Result<Repository> {
        let url = format!("{}/repositories/{}", self.base_url, repository_id);
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Update repository metadata
    pub async fn update_repository(
        &self,
        repository_id: Uuid,
        req: &UpdateRepository,
    ) -> Result<Repository> {
        let url = format!("{}/repositories/{}", self.base_url, repository_id);
        let response = self.put(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Delete a repository and everything that hangs off it
    pub async fn delete_repository(&self, repository_id: Uuid) -> Result<()> {
        let url = format!("{}/repositories/{}", self.base_url, repository_id);
        let response = self.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
