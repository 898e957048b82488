//! Execution of tasks issued by the central server

use std::sync::Arc;

use async_trait::async_trait;

use pc_core::error::TaskError;
use pc_core::traits::{CentralService, TaskHandler};
use pc_core::types::{Task, TaskKind};

use crate::session::messages::{terminated_by_administrator, Language};
use crate::state::ControllerState;

/// Executes session tasks against the controller's own registry
pub struct SessionTaskHandler {
    state: Arc<ControllerState>,
    service: Arc<dyn CentralService>,
}

impl SessionTaskHandler {
    pub fn new(state: Arc<ControllerState>, service: Arc<dyn CentralService>) -> Self {
        Self { state, service }
    }

    async fn kill_session(&self, task: &Task, session_id: &str) -> Result<(), TaskError> {
        match self.state.sessions.get(session_id) {
            Some(session) => {
                let language = Language::from_code(&self.state.settings().language_code);
                session.terminate(terminated_by_administrator(language)).await?;
                tracing::info!(session_id, "Session terminated by administrator");
            }
            // Already gone; finishing the task stops the server re-sending it.
            None => tracing::info!(session_id, "Kill requested for unknown session"),
        }

        self.service.finish_task(&task.id).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for SessionTaskHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        match task.kind() {
            TaskKind::KillSession { session_id } => self.kill_session(task, session_id).await,
            TaskKind::Unknown(name) => {
                tracing::warn!(task_id = %task.id, "Ignoring task of unknown kind {}", name);
                Ok(())
            }
        }
    }
}
