//! Graceful shutdown sequence

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::gateway::Gateways;
use crate::guard::isolate;
use crate::heartbeat::Heartbeat;
use crate::state::ControllerState;

/// Runs the shutdown sequence at most once.
///
/// Order: close every registered connection, send a final heartbeat, release
/// the main wait, cancel the shared stop token, stop the gateways.
pub struct ShutdownCoordinator {
    state: Arc<ControllerState>,
    heartbeat: Arc<Heartbeat>,
    gateways: Arc<Gateways>,
    released: CancellationToken,
    stop: CancellationToken,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(
        state: Arc<ControllerState>,
        heartbeat: Arc<Heartbeat>,
        gateways: Arc<Gateways>,
        released: CancellationToken,
        stop: CancellationToken,
    ) -> Self {
        Self {
            state,
            heartbeat,
            gateways,
            released,
            stop,
            triggered: AtomicBool::new(false),
        }
    }

    /// Whether shutdown has begun
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Run the sequence; returns `false` if it had already been run.
    pub async fn shutdown(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already in progress");
            return false;
        }
        tracing::info!("Shutting down");

        self.close_connections().await;
        self.heartbeat.beat_logged().await;

        self.released.cancel();
        self.stop.cancel();

        self.gateways.stop().await;
        tracing::info!("Shutdown sequence complete");
        true
    }

    async fn close_connections(&self) {
        let connections = self.state.connections.snapshot();
        if connections.is_empty() {
            return;
        }
        tracing::info!(count = connections.len(), "Closing connections");

        for (id, connection) in connections {
            match isolate("connection close", connection.close()).await {
                Some(Ok(())) => tracing::debug!(connection_id = %id, "Connection closed"),
                Some(Err(e)) => {
                    tracing::warn!(connection_id = %id, error = %e, "Failed to close connection")
                }
                None => {}
            }
        }
    }
}
