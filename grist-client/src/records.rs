//! Record-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use grist_core::domain::record::Record;
use grist_core::dto::page::Page;
use grist_core::dto::record::{CreateRecord, UpdateRecord};
use uuid::Uuid;

impl OrchestratorClient {
    /// Create a record in a repository (admin)
    pub async fn create_record(
        &self,
        repository_id: Uuid,
        req: &CreateRecord,
    ) -> Result<Record> {
        let url = format!("{}/records/{}", self.base_url, repository_id);
        let response = self.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// List one page of a repository's records; `limit` is 1–100
    pub async fn list_records(
        &self,
        repository_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Page<serde_json::Value>> {
        let url = format!(
            "{}/records/{}?page={}&limit={}",
            self.base_url, repository_id, page, limit
        );
        let response = self.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Replace a record's data (admin)
    pub async fn update_record(&self, record_id: Uuid, req: &UpdateRecord) -> Result<Record> {
        let url = format!("{}/records/{}", self.base_url, record_id);
        let response = self.put(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Delete a record (admin)
    pub async fn delete_record(&self, record_id: Uuid) -> Result<()> {
        let url = format!("{}/records/{}", self.base_url, record_id);
        let response = self.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
