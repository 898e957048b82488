//! HTTP transport to the central server

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};

use pc_core::config::Settings;
use pc_core::error::{ReplayError, ServiceError};
use pc_core::traits::{CentralService, ReplayUploader};
use pc_core::types::{HeartbeatOutcome, Task};

/// Header carrying the storage name of an uploaded replay
pub const REPLAY_TARGET_HEADER: &str = "X-Replay-Target";

/// URL paths of the terminal API, relative to `CORE_HOST`
pub struct Endpoints;

impl Endpoints {
    pub const HEARTBEAT: &'static str = "/api/v1/terminal/terminals/status/";
    pub const CONFIG: &'static str = "/api/v1/terminal/terminals/config/";

    pub fn finish_task(task_id: &str) -> String {
        format!("/api/v1/terminal/tasks/{}/", task_id)
    }

    pub fn replay(session_id: &str) -> String {
        format!("/api/v1/terminal/sessions/{}/replay/", session_id)
    }

    pub fn session(session_id: &str) -> String {
        format!("/api/v1/terminal/sessions/{}/", session_id)
    }
}

/// [`CentralService`] and [`ReplayUploader`] over the server's REST API
#[derive(Clone)]
pub struct HttpCentralClient {
    client: Client,
    base_url: String,
    access_key: String,
}

impl HttpCentralClient {
    /// Build a client for `base_url`
    pub fn new(
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        name: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(format!("portcullis/{} ({})", env!("CARGO_PKG_VERSION"), name))
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_key: access_key.into(),
        })
    }

    /// Build a client from the current settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ServiceError> {
        Self::new(
            settings.core_host.clone(),
            settings.access_key.clone(),
            &settings.name,
            settings.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.access_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.access_key)
        }
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ServiceError> {
        self.authorized(request).send().await.map_err(|e| {
            tracing::debug!(endpoint, error = %e, "Request to central server failed");
            ServiceError::Transport(e.to_string())
        })
    }

    /// Fail with [`ServiceError::Status`] unless the response is 2xx
    fn require_success(endpoint: &str, response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ServiceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }

    async fn json_body<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, ServiceError> {
        response.json::<T>().await.map_err(|e| ServiceError::Malformed {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Mark the session's replay as stored
    pub async fn finish_replay(&self, session_id: &str) -> Result<(), ServiceError> {
        let endpoint = Endpoints::session(session_id);
        let request = self
            .client
            .patch(self.url(&endpoint))
            .json(&json!({ "has_replay": true }));
        Self::require_success(&endpoint, self.send(&endpoint, request).await?)?;
        Ok(())
    }
}

#[async_trait]
impl CentralService for HttpCentralClient {
    async fn heartbeat(&self, sessions: &[String]) -> Result<HeartbeatOutcome, ServiceError> {
        let endpoint = Endpoints::HEARTBEAT;
        let request = self
            .client
            .post(self.url(endpoint))
            .json(&json!({ "sessions": sessions }));
        let response = self.send(endpoint, request).await?;

        if response.status() != StatusCode::CREATED {
            tracing::debug!(status = %response.status(), "Heartbeat not accepted");
            return Ok(HeartbeatOutcome::Rejected);
        }

        let tasks: Vec<Task> = Self::json_body(endpoint, response).await?;
        Ok(HeartbeatOutcome::Tasks(tasks))
    }

    async fn fetch_config(&self) -> Result<Map<String, Value>, ServiceError> {
        let endpoint = Endpoints::CONFIG;
        let response = self.send(endpoint, self.client.get(self.url(endpoint))).await?;
        let response = Self::require_success(endpoint, response)?;

        match Self::json_body::<Value>(endpoint, response).await? {
            Value::Object(document) => Ok(document),
            other => Err(ServiceError::Malformed {
                endpoint: endpoint.to_string(),
                reason: format!("expected an object, got {}", other),
            }),
        }
    }

    async fn finish_task(&self, task_id: &str) -> Result<(), ServiceError> {
        let endpoint = Endpoints::finish_task(task_id);
        let request = self
            .client
            .patch(self.url(&endpoint))
            .json(&json!({ "is_finished": true }));
        Self::require_success(&endpoint, self.send(&endpoint, request).await?)?;
        Ok(())
    }
}

#[async_trait]
impl ReplayUploader for HttpCentralClient {
    /// Post the recording, mark the replay finished, then remove the local
    /// copy. The file is kept if any server call fails.
    async fn upload(&self, session_id: &str, path: &Path, target: &str) -> Result<(), ReplayError> {
        let body = tokio::fs::read(path).await.map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let endpoint = Endpoints::replay(session_id);
        let request = self
            .client
            .post(self.url(&endpoint))
            .header(REPLAY_TARGET_HEADER, target)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(body);
        Self::require_success(&endpoint, self.send(&endpoint, request).await?)?;

        self.finish_replay(session_id).await?;
        tracing::info!(session_id, target_name = target, "Replay uploaded");

        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove uploaded replay");
        }
        Ok(())
    }
}
