//! Connection traits

use async_trait::async_trait;

use crate::error::ConnectionError;

/// Transport-level channel backing one or more sessions
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection identifier
    fn id(&self) -> &str;

    /// Close the connection
    async fn close(&self) -> Result<(), ConnectionError>;
}
