//! Protocol gateway lifecycle

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use pc_core::traits::Gateway;

/// A gateway and the port it is configured to listen on
#[derive(Clone)]
pub struct GatewaySpec {
    /// Listening port; 0 leaves the gateway disabled
    pub port: u16,
    pub gateway: Arc<dyn Gateway>,
}

impl GatewaySpec {
    pub fn new(port: u16, gateway: Arc<dyn Gateway>) -> Self {
        Self { port, gateway }
    }

    pub fn is_enabled(&self) -> bool {
        self.port != 0
    }
}

/// Gateways registered with the controller
#[derive(Default)]
pub struct Gateways {
    specs: Vec<GatewaySpec>,
    running: Mutex<Vec<Arc<dyn Gateway>>>,
}

impl Gateways {
    pub fn new(specs: Vec<GatewaySpec>) -> Self {
        Self {
            specs,
            running: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `run()` for every enabled gateway on its own task
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let mut handles = Vec::new();

        for spec in &self.specs {
            let name = spec.gateway.name().to_string();
            if !spec.is_enabled() {
                tracing::info!(gateway = %name, "Gateway disabled (port 0)");
                continue;
            }

            tracing::info!(gateway = %name, port = spec.port, "Starting gateway");
            let gateway = Arc::clone(&spec.gateway);
            running.push(Arc::clone(&gateway));
            handles.push(tokio::spawn(async move {
                match gateway.run().await {
                    Ok(()) => tracing::info!(gateway = %name, "Gateway stopped"),
                    Err(e) => tracing::error!(gateway = %name, "Gateway failed: {:#}", e),
                }
            }));
        }

        handles
    }

    /// Ask every started gateway to stop listening
    pub async fn stop(&self) {
        let running: Vec<_> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for gateway in running {
            tracing::debug!(gateway = gateway.name(), "Stopping gateway");
            gateway.shutdown().await;
        }
    }

    /// Number of gateways currently started
    pub fn running(&self) -> usize {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    #[tokio::test]
    async fn test_port_zero_is_not_started() {
        let ssh = Arc::new(FakeGateway::new("ssh"));
        let web = Arc::new(FakeGateway::new("web"));
        let gateways = Gateways::new(vec![
            GatewaySpec::new(2222, ssh.clone()),
            GatewaySpec::new(0, web.clone()),
        ]);

        let handles = gateways.start();
        assert_eq!(handles.len(), 1);
        assert_eq!(gateways.running(), 1);

        gateways.stop().await;
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ssh.run_count(), 1);
        assert_eq!(ssh.shutdown_count(), 1);
        assert_eq!(web.run_count(), 0);
        assert_eq!(web.shutdown_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_twice_shuts_down_once() {
        let ssh = Arc::new(FakeGateway::new("ssh"));
        let gateways = Gateways::new(vec![GatewaySpec::new(2222, ssh.clone())]);
        let _handles = gateways.start();

        gateways.stop().await;
        gateways.stop().await;
        assert_eq!(ssh.shutdown_count(), 1);
    }
}
