//! Gateway lifecycle trait

use async_trait::async_trait;

/// A listener (SSH, WebSocket) that creates sessions and connections
///
/// The controller spawns `run` on its own task and calls `shutdown` once
/// during the shutdown sequence. `run` is expected to return after
/// `shutdown` has been called.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short name used in logs, e.g. `sshd`
    fn name(&self) -> &str;

    /// Serve until shut down
    async fn run(&self) -> anyhow::Result<()>;

    /// Stop accepting and serving, release listeners
    async fn shutdown(&self);
}
