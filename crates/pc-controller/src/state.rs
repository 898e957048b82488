//! Shared controller state

use std::sync::Arc;

use pc_core::config::{ConfigStore, Settings};

use crate::registry::{ConnectionRegistry, SessionRegistry};

/// State shared by the gateways and every background loop
pub struct ControllerState {
    /// Process-wide configuration
    pub config: Arc<ConfigStore>,
    /// Live sessions
    pub sessions: Arc<SessionRegistry>,
    /// Live connections
    pub connections: Arc<ConnectionRegistry>,
}

impl ControllerState {
    /// Create state with empty registries
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Typed view of the current configuration
    pub fn settings(&self) -> Settings {
        Settings::from_store(&self.config)
    }

    /// Get the session registry
    pub fn session_registry(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Get the connection registry
    pub fn connection_registry(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }
}
