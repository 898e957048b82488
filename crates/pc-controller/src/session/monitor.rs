//! Session monitor task
//!
//! Periodically walks a snapshot of the session registry and:
//! - removes sessions the gateway reports as closed (normally or not)
//! - terminates sessions idle for longer than `SECURITY_MAX_IDLE_TIME` minutes
//!
//! A terminated session is not removed in the same pass. Its gateway flips
//! the closed flag once the user is gone, and the next pass reclaims it.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pc_core::time::elapsed_since;

use super::messages::{idle_disconnect, Language};
use crate::guard::isolate;
use crate::state::ControllerState;

/// What one monitor pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    /// Sessions removed from the registry
    pub removed: Vec<String>,
    /// Sessions asked to terminate for idling
    pub terminated: Vec<String>,
    /// Sessions whose termination failed; retried next pass
    pub failed: Vec<String>,
}

/// Idle-timeout and reclamation policy over the session registry
pub struct SessionMonitor {
    state: Arc<ControllerState>,
    /// Sessions already told to terminate that have not closed yet
    terminating: HashSet<String>,
}

impl SessionMonitor {
    pub fn new(state: Arc<ControllerState>) -> Self {
        Self {
            state,
            terminating: HashSet::new(),
        }
    }

    /// Run one monitoring pass
    pub async fn check_sessions(&mut self) -> MonitorReport {
        let settings = self.state.settings();
        let max_idle = settings.max_idle();
        let language = Language::from_code(&settings.language_code);
        let mut report = MonitorReport::default();

        for id in self.state.sessions.prune() {
            tracing::warn!(session_id = %id, "Session dropped by its gateway without being unregistered");
            self.terminating.remove(&id);
            report.removed.push(id);
        }

        for (id, session) in self.state.sessions.snapshot() {
            if session.closed_unexpectedly() {
                tracing::info!(session_id = %id, "Reclaiming session that closed unexpectedly");
                self.reclaim(&id, &mut report);
                continue;
            }

            if session.is_closed() {
                self.reclaim(&id, &mut report);
                continue;
            }

            if self.terminating.contains(&id) {
                continue;
            }

            let idle = elapsed_since(session.last_active_millis());
            if idle <= max_idle {
                continue;
            }

            tracing::info!(
                session_id = %id,
                idle_secs = idle.as_secs(),
                limit_mins = settings.max_idle_minutes,
                "Terminating idle session"
            );
            let reason = idle_disconnect(language, settings.max_idle_minutes);
            match session.terminate(&reason).await {
                Ok(()) => {
                    self.terminating.insert(id.clone());
                    report.terminated.push(id);
                }
                Err(e) => {
                    tracing::error!(session_id = %id, error = %e, "Failed to terminate idle session");
                    report.failed.push(id);
                }
            }
        }

        // Someone else (a task, the gateway) may have removed a session we
        // were waiting on.
        let sessions = &self.state.sessions;
        self.terminating.retain(|id| sessions.get(id).is_some());

        report
    }

    fn reclaim(&mut self, id: &str, report: &mut MonitorReport) {
        self.terminating.remove(id);
        if self.state.sessions.unregister(id) {
            tracing::debug!(session_id = %id, "Removed closed session");
            report.removed.push(id.to_string());
        }
    }
}

/// Run the session monitor until `stop` is cancelled.
///
/// Shares `HEARTBEAT_INTERVAL` with the heartbeat loop, re-read every cycle.
pub async fn run_session_monitor(state: Arc<ControllerState>, stop: CancellationToken) {
    let mut monitor = SessionMonitor::new(Arc::clone(&state));

    tracing::info!(
        "Starting session monitor (interval: {:?})",
        state.settings().heartbeat_interval
    );

    while !stop.is_cancelled() {
        if let Some(report) = isolate("session monitor", monitor.check_sessions()).await {
            if !report.removed.is_empty() || !report.terminated.is_empty() {
                tracing::info!(
                    removed = report.removed.len(),
                    terminated = report.terminated.len(),
                    remaining = state.sessions.len(),
                    "Session monitor pass complete"
                );
            }
        }

        let interval = state.settings().heartbeat_interval;
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Session monitor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSession;
    use pc_core::config::{defaults, ConfigStore};
    use pc_core::traits::Session;
    use serde_json::{json, Map};
    use std::path::Path;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    fn state() -> Arc<ControllerState> {
        let mut local = Map::new();
        local.insert("SECURITY_MAX_IDLE_TIME".into(), json!(60));
        local.insert("LANGUAGE_CODE".into(), json!("en"));
        local.insert("HEARTBEAT_INTERVAL".into(), json!(1));
        let store = ConfigStore::new(defaults::builtin(Path::new("/tmp")), local)
            .with_env(Arc::new(|_: &str| -> Option<String> { None }));
        Arc::new(ControllerState::new(Arc::new(store)))
    }

    fn register(state: &ControllerState, session: &Arc<FakeSession>) {
        let dyn_session: Arc<dyn Session> = session.clone();
        state.sessions.register(session.id(), &dyn_session).unwrap();
    }

    #[tokio::test]
    async fn test_only_sessions_past_the_limit_are_terminated() {
        let state = state();
        let fresh = Arc::new(FakeSession::new("fresh"));
        let almost = Arc::new(FakeSession::idle_for("almost", 59 * MINUTE));
        let idle = Arc::new(FakeSession::idle_for("idle", 61 * MINUTE));
        for s in [&fresh, &almost, &idle] {
            register(&state, s);
        }

        let mut monitor = SessionMonitor::new(Arc::clone(&state));
        let report = monitor.check_sessions().await;

        assert_eq!(report.terminated, vec!["idle".to_string()]);
        assert!(report.removed.is_empty());
        assert!(fresh.terminations().is_empty());
        assert!(almost.terminations().is_empty());
        assert_eq!(
            idle.terminations(),
            vec!["Connect idle more than 60 minutes, disconnect".to_string()]
        );
        assert_eq!(state.sessions.ids().len(), 3);
    }

    #[tokio::test]
    async fn test_terminated_session_is_reclaimed_once_closed() {
        let state = state();
        let idle = Arc::new(FakeSession::idle_for("idle", 90 * MINUTE));
        register(&state, &idle);
        let mut monitor = SessionMonitor::new(Arc::clone(&state));

        monitor.check_sessions().await;
        let second = monitor.check_sessions().await;
        assert!(second.terminated.is_empty());
        assert_eq!(idle.terminations().len(), 1);

        idle.mark_closed();
        let third = monitor.check_sessions().await;
        assert_eq!(third.removed, vec!["idle".to_string()]);
        assert!(state.sessions.is_empty());
        assert_eq!(idle.terminations().len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_close_is_removed_without_idle_check() {
        let state = state();
        let broken = Arc::new(FakeSession::idle_for("broken", 600 * MINUTE));
        broken.mark_closed_unexpectedly();
        register(&state, &broken);

        let report = SessionMonitor::new(Arc::clone(&state)).check_sessions().await;

        assert_eq!(report.removed, vec!["broken".to_string()]);
        assert!(broken.terminations().is_empty());
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_closed_session_removed() {
        let state = state();
        let done = Arc::new(FakeSession::new("done"));
        done.mark_closed();
        register(&state, &done);

        let report = SessionMonitor::new(Arc::clone(&state)).check_sessions().await;
        assert_eq!(report.removed, vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_termination_is_retried_and_does_not_stop_pass() {
        let state = state();
        let stubborn = Arc::new(FakeSession::idle_for("a-stubborn", 90 * MINUTE));
        stubborn.fail_terminate();
        let idle = Arc::new(FakeSession::idle_for("b-idle", 90 * MINUTE));
        register(&state, &stubborn);
        register(&state, &idle);
        let mut monitor = SessionMonitor::new(Arc::clone(&state));

        let first = monitor.check_sessions().await;
        assert_eq!(first.failed, vec!["a-stubborn".to_string()]);
        assert_eq!(first.terminated, vec!["b-idle".to_string()]);

        let second = monitor.check_sessions().await;
        assert_eq!(second.failed, vec!["a-stubborn".to_string()]);
        assert_eq!(stubborn.terminations().len(), 2);
        assert_eq!(idle.terminations().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_is_pruned() {
        let state = state();
        let gone = Arc::new(FakeSession::new("gone"));
        register(&state, &gone);
        drop(gone);

        let report = SessionMonitor::new(Arc::clone(&state)).check_sessions().await;
        assert_eq!(report.removed, vec!["gone".to_string()]);
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_idle_limit_follows_config_updates() {
        let state = state();
        let idle = Arc::new(FakeSession::idle_for("idle", 20 * MINUTE));
        register(&state, &idle);
        let mut monitor = SessionMonitor::new(Arc::clone(&state));

        assert!(monitor.check_sessions().await.terminated.is_empty());

        state.config.set_local("SECURITY_MAX_IDLE_TIME", json!(15));
        assert_eq!(monitor.check_sessions().await.terminated, vec!["idle".to_string()]);
    }

    #[tokio::test]
    async fn test_fractional_idle_limit() {
        let state = state();
        state.config.set_local("SECURITY_MAX_IDLE_TIME", json!(0.5));
        let quiet = Arc::new(FakeSession::idle_for("quiet", Duration::from_secs(45)));
        let fresh = Arc::new(FakeSession::idle_for("fresh", Duration::from_secs(10)));
        register(&state, &quiet);
        register(&state, &fresh);

        let report = SessionMonitor::new(Arc::clone(&state)).check_sessions().await;

        assert_eq!(report.terminated, vec!["quiet".to_string()]);
        assert_eq!(
            quiet.terminations(),
            vec!["Connect idle more than 0.5 minutes, disconnect".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_cancel() {
        let state = state();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_session_monitor(Arc::clone(&state), stop.clone()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
