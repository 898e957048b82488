//! Controller: owns the shared state and the background loops

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pc_core::config::ConfigStore;
use pc_core::traits::{CentralService, Gateway, ReplayUploader, TaskHandler};

use crate::gateway::{GatewaySpec, Gateways};
use crate::heartbeat::{run_heartbeat, Heartbeat, SessionTaskHandler};
use crate::refresh::{run_config_refresh, ConfigRefresher, CONFIG_REFRESH_INTERVAL};
use crate::replay::{ReplayRecovery, UPLOAD_DELAY};
use crate::session::run_session_monitor;
use crate::shutdown::ShutdownCoordinator;
use crate::state::ControllerState;

/// Builder for [`Controller`]
pub struct ControllerBuilder {
    config: Arc<ConfigStore>,
    service: Arc<dyn CentralService>,
    uploader: Arc<dyn ReplayUploader>,
    task_handler: Option<Arc<dyn TaskHandler>>,
    gateways: Vec<GatewaySpec>,
    refresh_interval: Duration,
    replay_delay: Duration,
}

impl ControllerBuilder {
    pub fn new(
        config: Arc<ConfigStore>,
        service: Arc<dyn CentralService>,
        uploader: Arc<dyn ReplayUploader>,
    ) -> Self {
        Self {
            config,
            service,
            uploader,
            task_handler: None,
            gateways: Vec::new(),
            refresh_interval: CONFIG_REFRESH_INTERVAL,
            replay_delay: UPLOAD_DELAY,
        }
    }

    /// Replace the default session task handler
    pub fn task_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.task_handler = Some(handler);
        self
    }

    /// Register a gateway listening on `port` (0 disables it)
    pub fn gateway(mut self, port: u16, gateway: Arc<dyn Gateway>) -> Self {
        self.gateways.push(GatewaySpec::new(port, gateway));
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }

    pub fn build(self) -> Controller {
        let state = Arc::new(ControllerState::new(self.config));
        let handler = self.task_handler.unwrap_or_else(|| {
            Arc::new(SessionTaskHandler::new(
                Arc::clone(&state),
                Arc::clone(&self.service),
            ))
        });
        let heartbeat = Arc::new(Heartbeat::new(
            Arc::clone(&state),
            Arc::clone(&self.service),
            handler,
        ));
        let refresher = Arc::new(ConfigRefresher::new(
            Arc::clone(&state.config),
            Arc::clone(&self.service),
        ));
        let gateways = Arc::new(Gateways::new(self.gateways));

        let stop = CancellationToken::new();
        let released = CancellationToken::new();
        let shutdown = ShutdownCoordinator::new(
            Arc::clone(&state),
            Arc::clone(&heartbeat),
            Arc::clone(&gateways),
            released.clone(),
            stop.clone(),
        );

        Controller {
            state,
            heartbeat,
            refresher,
            recovery: Arc::new(ReplayRecovery::new(self.uploader).with_delay(self.replay_delay)),
            gateways,
            refresh_interval: self.refresh_interval,
            stop,
            released,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }
}

/// The terminal controller.
///
/// Gateways register sessions and connections through [`state`](Self::state);
/// the controller keeps them in line with the central server.
pub struct Controller {
    state: Arc<ControllerState>,
    heartbeat: Arc<Heartbeat>,
    refresher: Arc<ConfigRefresher>,
    recovery: Arc<ReplayRecovery>,
    gateways: Arc<Gateways>,
    refresh_interval: Duration,
    stop: CancellationToken,
    released: CancellationToken,
    shutdown: ShutdownCoordinator,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    pub fn builder(
        config: Arc<ConfigStore>,
        service: Arc<dyn CentralService>,
        uploader: Arc<dyn ReplayUploader>,
    ) -> ControllerBuilder {
        ControllerBuilder::new(config, service, uploader)
    }

    /// Shared state (config and registries)
    pub fn state(&self) -> &Arc<ControllerState> {
        &self.state
    }

    /// Token cancelled when shutdown begins
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Load the remote configuration, then start the background loops and,
    /// if enabled, the replay recovery sweep.
    pub async fn bootstrap(&self) {
        self.refresher.refresh_logged().await;

        self.track(tokio::spawn(run_config_refresh(
            Arc::clone(&self.refresher),
            self.refresh_interval,
            self.stop.clone(),
        )));
        self.track(tokio::spawn(run_heartbeat(
            Arc::clone(&self.heartbeat),
            Arc::clone(&self.state),
            self.stop.clone(),
        )));
        self.track(tokio::spawn(run_session_monitor(
            Arc::clone(&self.state),
            self.stop.clone(),
        )));

        let settings = self.state.settings();
        if settings.upload_failed_replay_on_start {
            let recovery = Arc::clone(&self.recovery);
            let stop = self.stop.clone();
            self.track(tokio::spawn(async move {
                recovery.sweep(&settings.replay_dir, &stop).await;
            }));
        }
    }

    /// Start every gateway with a non-zero port
    pub fn start_gateways(&self) {
        for handle in self.gateways.start() {
            self.track(handle);
        }
    }

    /// Run the shutdown sequence; later calls return `false` and do nothing.
    pub async fn shutdown(&self) -> bool {
        self.shutdown.shutdown().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Block until shutdown releases the main flow
    pub async fn wait(&self) {
        self.released.cancelled().await;
    }

    /// Wait up to `timeout` for the background tasks to finish.
    ///
    /// Returns `false` if some were still running; those are aborted.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Background task ended abnormally");
                    }
                }
                true
            }
            Err(_) => {
                tracing::warn!("Background tasks did not finish in {:?}, aborting", timeout);
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}
