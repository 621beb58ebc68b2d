//! TickTick Open API client implementation.

use std::sync::Arc;

use tracing::{debug, warn};

use ticktick_core::types::{is_inbox_id, Project, ProjectData, ProjectPayload, Task, TaskPayload};
use ticktick_core::{Error, Result};

use crate::oauth::CredentialProvider;

/// Default TickTick Open API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.ticktick.com/open/v1";

/// TickTick Open API client.
///
/// On a 401 the client refreshes the token once through its
/// [`CredentialProvider`] and replays the request; a second 401
/// surfaces as an auth error.
pub struct TickTickClient {
    base_url: String,
    credentials: Arc<CredentialProvider>,
    client: reqwest::Client,
}

impl TickTickClient {
    /// Create a new client against the production API.
    pub fn new(credentials: Arc<CredentialProvider>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, credentials)
    }

    /// Create a new client with a custom base URL (for testing).
    pub fn with_base_url(base_url: impl Into<String>, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            client: reqwest::Client::builder()
                .user_agent("ticktick-tools")
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Build a request with the current bearer token.
    async fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let token = self.credentials.token().await;
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
    }

    /// Refresh the token after a rejected request. Any failure here
    /// means the retry cannot proceed.
    async fn recover_auth(&self, reason: &str) -> Result<()> {
        debug!(reason, "401 from API, attempting token refresh");
        self.credentials.refresh().await
    }

    /// Make an authenticated GET request, retrying once after a token
    /// refresh on 401.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        match self.get_once(url).await {
            Err(Error::Auth(reason)) => {
                self.recover_auth(&reason).await?;
                self.get_once(url).await
            }
            other => other,
        }
    }

    /// Make an authenticated POST request, retrying once after a token
    /// refresh on 401.
    async fn post<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        match self.post_once(url, body).await {
            Err(Error::Auth(reason)) => {
                self.recover_auth(&reason).await?;
                self.post_once(url, body).await
            }
            other => other,
        }
    }

    /// POST with an empty body and ignored response, with the same
    /// 401 retry.
    async fn post_unit(&self, url: &str) -> Result<()> {
        match self.post_unit_once(url).await {
            Err(Error::Auth(reason)) => {
                self.recover_auth(&reason).await?;
                self.post_unit_once(url).await
            }
            other => other,
        }
    }

    /// Make an authenticated DELETE request, retrying once after a
    /// token refresh on 401.
    async fn delete(&self, url: &str) -> Result<()> {
        match self.delete_once(url).await {
            Err(Error::Auth(reason)) => {
                self.recover_auth(&reason).await?;
                self.delete_once(url).await
            }
            other => other,
        }
    }

    async fn get_once<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = url, "TickTick GET request");

        let response = self
            .request(reqwest::Method::GET, url)
            .await
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn post_once<T: serde::de::DeserializeOwned, B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!(url = url, "TickTick POST request");

        let response = self
            .request(reqwest::Method::POST, url)
            .await
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn post_unit_once(&self, url: &str) -> Result<()> {
        debug!(url = url, "TickTick POST request");

        let response = self
            .request(reqwest::Method::POST, url)
            .await
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        self.handle_unit_response(response).await
    }

    async fn delete_once(&self, url: &str) -> Result<()> {
        debug!(url = url, "TickTick DELETE request");

        let response = self
            .request(reqwest::Method::DELETE, url)
            .await
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        self.handle_unit_response(response).await
    }

    /// Handle response and map errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(
                status = status_code,
                message = message,
                "TickTick API error response"
            );
            return Err(Error::from_status(status_code, message));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        serde_json::from_str(&body).map_err(Error::Serialization)
    }

    async fn handle_unit_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(
                status = status_code,
                message = message,
                "TickTick API error response"
            );
            return Err(Error::from_status(status_code, message));
        }

        Ok(())
    }

    /// The API only recognizes the inbox sentinel in lowercase.
    fn canonical_project_id(id: &str) -> String {
        if is_inbox_id(id) {
            Project::INBOX_ID.to_string()
        } else {
            id.to_string()
        }
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    /// List all projects visible to the user. The inbox is not included.
    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        let url = format!("{}/project", self.base_url);
        self.get(&url).await
    }

    /// Fetch a project together with its open tasks.
    pub async fn get_project_with_tasks(&self, project_id: &str) -> Result<ProjectData> {
        let url = format!(
            "{}/project/{}/data",
            self.base_url,
            Self::canonical_project_id(project_id)
        );
        self.get(&url).await
    }

    /// Fetch a single task.
    pub async fn get_task(&self, project_id: &str, task_id: &str) -> Result<Task> {
        let url = format!(
            "{}/project/{}/task/{}",
            self.base_url,
            Self::canonical_project_id(project_id),
            task_id
        );
        self.get(&url).await
    }

    /// Create a task. The payload must carry a title.
    pub async fn create_task(&self, payload: &TaskPayload) -> Result<Task> {
        let url = format!("{}/task", self.base_url);
        self.post(&url, payload).await
    }

    /// Update a task. The payload's `id` and `project_id` must be set.
    pub async fn update_task(&self, task_id: &str, payload: &TaskPayload) -> Result<Task> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        self.post(&url, payload).await
    }

    /// Mark a task complete.
    pub async fn complete_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        let url = format!(
            "{}/project/{}/task/{}/complete",
            self.base_url,
            Self::canonical_project_id(project_id),
            task_id
        );
        self.post_unit(&url).await
    }

    /// Delete a task.
    pub async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        let url = format!(
            "{}/project/{}/task/{}",
            self.base_url,
            Self::canonical_project_id(project_id),
            task_id
        );
        self.delete(&url).await
    }

    /// Create a project.
    pub async fn create_project(&self, payload: &ProjectPayload) -> Result<Project> {
        let url = format!("{}/project", self.base_url);
        self.post(&url, payload).await
    }

    /// Delete a project.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let url = format!("{}/project/{}", self.base_url, project_id);
        self.delete(&url).await
    }
}

// =============================================================================
// Tests
// =============================================================================
