//! Heartbeat to the central server
//!
//! Every `HEARTBEAT_INTERVAL` seconds the controller reports the ids of all
//! live sessions. The reply doubles as the task channel: each task in it is
//! handed to the [`TaskDispatcher`] in the order received.
//!
//! Nothing that goes wrong in one heartbeat stops the loop. An explicit
//! refusal from the server, a transport error and a panicking task are all
//! logged and the loop sleeps until the next cycle.

mod dispatch;
mod tasks;

pub use dispatch::{DispatchSummary, TaskDispatcher};
pub use tasks::SessionTaskHandler;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pc_core::error::ServiceError;
use pc_core::traits::{CentralService, TaskHandler};
use pc_core::types::HeartbeatOutcome;

use crate::guard::isolate;
use crate::state::ControllerState;

/// Result of a heartbeat that got an answer from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatResult {
    /// Accepted; tasks (if any) were dispatched
    Delivered(DispatchSummary),
    /// Explicitly refused by the server
    Rejected,
}

/// One heartbeat round-trip plus task dispatch
pub struct Heartbeat {
    state: Arc<ControllerState>,
    service: Arc<dyn CentralService>,
    dispatcher: TaskDispatcher,
}

impl Heartbeat {
    pub fn new(
        state: Arc<ControllerState>,
        service: Arc<dyn CentralService>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            state,
            service,
            dispatcher: TaskDispatcher::new(handler),
        }
    }

    /// Send one heartbeat and dispatch whatever tasks come back
    pub async fn beat(&self) -> Result<BeatResult, ServiceError> {
        let sessions = self.state.sessions.ids();
        tracing::trace!(sessions = sessions.len(), "Sending heartbeat");

        match self.service.heartbeat(&sessions).await? {
            HeartbeatOutcome::Rejected => Ok(BeatResult::Rejected),
            HeartbeatOutcome::Tasks(tasks) => {
                if tasks.is_empty() {
                    return Ok(BeatResult::Delivered(DispatchSummary::default()));
                }
                tracing::info!(count = tasks.len(), "Heartbeat returned tasks");
                Ok(BeatResult::Delivered(self.dispatcher.dispatch(&tasks).await))
            }
        }
    }

    /// [`beat`](Self::beat) with every failure logged; returns whether the
    /// heartbeat was accepted.
    pub async fn beat_logged(&self) -> bool {
        match isolate("heartbeat", self.beat()).await {
            Some(Ok(BeatResult::Delivered(summary))) => {
                if summary.failed > 0 {
                    tracing::warn!(
                        handled = summary.handled,
                        failed = summary.failed,
                        "Some heartbeat tasks failed"
                    );
                }
                true
            }
            Some(Ok(BeatResult::Rejected)) => {
                tracing::error!("Heartbeat rejected by central server");
                false
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Heartbeat failed");
                false
            }
            None => false,
        }
    }
}

/// Run the heartbeat loop until `stop` is cancelled
pub async fn run_heartbeat(
    heartbeat: Arc<Heartbeat>,
    state: Arc<ControllerState>,
    stop: CancellationToken,
) {
    tracing::info!(
        "Starting heartbeat (interval: {:?})",
        state.settings().heartbeat_interval
    );

    while !stop.is_cancelled() {
        heartbeat.beat_logged().await;

        let interval = state.settings().heartbeat_interval;
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Heartbeat loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCentral, FakeSession, RecordingHandler};
    use pc_core::config::{defaults, ConfigStore};
    use pc_core::traits::Session;
    use pc_core::types::Task;
    use serde_json::{json, Map};
    use std::path::Path;
    use std::time::Duration;

    struct Harness {
        state: Arc<ControllerState>,
        central: Arc<FakeCentral>,
        handler: Arc<RecordingHandler>,
        heartbeat: Arc<Heartbeat>,
    }

    fn harness() -> Harness {
        let mut local = Map::new();
        local.insert("HEARTBEAT_INTERVAL".into(), json!(5));
        let store = ConfigStore::new(defaults::builtin(Path::new("/tmp")), local);
        let state = Arc::new(ControllerState::new(Arc::new(store)));
        let central = Arc::new(FakeCentral::new());
        let handler = Arc::new(RecordingHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(
            Arc::clone(&state),
            central.clone(),
            handler.clone(),
        ));
        Harness {
            state,
            central,
            handler,
            heartbeat,
        }
    }

    #[tokio::test]
    async fn test_reports_live_session_ids() {
        let h = harness();
        let a: Arc<dyn Session> = Arc::new(FakeSession::new("b"));
        let b: Arc<dyn Session> = Arc::new(FakeSession::new("a"));
        h.state.sessions.register("b", &a).unwrap();
        h.state.sessions.register("a", &b).unwrap();

        assert!(h.heartbeat.beat_logged().await);
        assert_eq!(h.central.heartbeats(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[tokio::test]
    async fn test_tasks_dispatched_in_order() {
        let h = harness();
        h.central.push_reply(HeartbeatOutcome::Tasks(vec![
            Task::new("t1", "kill_session", "x"),
            Task::new("t2", "kill_session", "y"),
        ]));

        let result = h.heartbeat.beat().await.unwrap();

        assert_eq!(
            result,
            BeatResult::Delivered(DispatchSummary { handled: 2, failed: 0 })
        );
        assert_eq!(h.handler.handled(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_rejection_leaves_sessions_untouched() {
        let h = harness();
        let session = Arc::new(FakeSession::new("s1"));
        let as_dyn: Arc<dyn Session> = session.clone();
        h.state.sessions.register("s1", &as_dyn).unwrap();
        h.central.push_reply(HeartbeatOutcome::Rejected);

        assert_eq!(h.heartbeat.beat().await.unwrap(), BeatResult::Rejected);
        assert_eq!(h.state.sessions.ids(), vec!["s1"]);
        assert!(session.terminations().is_empty());
        assert!(h.handler.handled().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_not_fatal() {
        let h = harness();
        h.central.push_error(ServiceError::Transport("connection reset".into()));
        assert!(!h.heartbeat.beat_logged().await);
        assert!(h.heartbeat.beat_logged().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failures_and_stops_on_cancel() {
        let h = harness();
        h.central.push_reply(HeartbeatOutcome::Rejected);
        h.central.push_error(ServiceError::Transport("timeout".into()));
        h.central.push_reply(HeartbeatOutcome::Tasks(vec![Task::new("t1", "noop", "")]));

        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&h.heartbeat),
            Arc::clone(&h.state),
            stop.clone(),
        ));

        // Beats at t=0, 5, 10; the third one carries the task.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(h.central.heartbeats().len(), 3);
        assert_eq!(h.handler.handled(), vec!["t1"]);

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("heartbeat loop did not stop")
            .unwrap();
    }
}
