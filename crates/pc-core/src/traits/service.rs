//! Central server and collaborator traits

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{ReplayError, ServiceError, TaskError};
use crate::types::{HeartbeatOutcome, Task};

/// RPCs to the central authorization server
#[async_trait]
pub trait CentralService: Send + Sync {
    /// Report live session ids; the reply carries tasks or an explicit refusal.
    ///
    /// `Err` is reserved for failures where no usable answer came back at all.
    async fn heartbeat(&self, sessions: &[String]) -> Result<HeartbeatOutcome, ServiceError>;

    /// Fetch the terminal configuration document
    async fn fetch_config(&self) -> Result<Map<String, Value>, ServiceError>;

    /// Mark a task as executed
    async fn finish_task(&self, task_id: &str) -> Result<(), ServiceError>;
}

/// Executes one task received over the heartbeat
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

/// Uploads a finished replay recording to durable storage
#[async_trait]
pub trait ReplayUploader: Send + Sync {
    /// Upload `path` for `session_id`, stored remotely under `target`
    /// (`<date-partition>/<filename>`).
    async fn upload(&self, session_id: &str, path: &Path, target: &str) -> Result<(), ReplayError>;
}
