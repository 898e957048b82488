//! Session traits

use async_trait::async_trait;

use crate::error::SessionError;

/// One proxied interactive session as seen by the controller
///
/// Gateways own the liveness fields and update them as the session runs; the
/// controller only reads them and, when policy or a remote task says so, asks
/// the session to terminate.
#[async_trait]
pub trait Session: Send + Sync {
    /// Session identifier (a UUID string for gateway-created sessions)
    fn id(&self) -> &str;

    /// Time of last user activity, in milliseconds since the UNIX epoch
    fn last_active_millis(&self) -> u64;

    /// Session ended cleanly
    fn is_closed(&self) -> bool;

    /// Gateway detected an abnormal end (peer vanished, I/O error)
    fn closed_unexpectedly(&self) -> bool;

    /// Forcibly end the session, showing `reason` to the user.
    ///
    /// Implementations must treat a call on an already-closed session as a
    /// successful no-op.
    async fn terminate(&self, reason: &str) -> Result<(), SessionError>;
}
