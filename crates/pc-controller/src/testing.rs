//! In-memory implementations of the controller's collaborator traits
//!
//! Compiled for unit tests and behind the `testing` feature, which the
//! integration tests enable through the crate's own dev-dependency.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use pc_core::error::{ConnectionError, ReplayError, ServiceError, SessionError, TaskError};
use pc_core::time::{current_time_millis, millis_ago};
use pc_core::traits::{CentralService, Connection, Gateway, ReplayUploader, Session, TaskHandler};
use pc_core::types::{HeartbeatOutcome, Task};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session whose liveness flags are set by hand
pub struct FakeSession {
    id: String,
    last_active: AtomicU64,
    closed: AtomicBool,
    closed_unexpectedly: AtomicBool,
    fail_terminate: AtomicBool,
    terminations: Mutex<Vec<String>>,
}

impl FakeSession {
    /// Active session, last used now
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_active: AtomicU64::new(current_time_millis()),
            closed: AtomicBool::new(false),
            closed_unexpectedly: AtomicBool::new(false),
            fail_terminate: AtomicBool::new(false),
            terminations: Mutex::new(Vec::new()),
        }
    }

    /// Session last used `ago` before now
    pub fn idle_for(id: impl Into<String>, ago: Duration) -> Self {
        let session = Self::new(id);
        session.last_active.store(millis_ago(ago), Ordering::SeqCst);
        session
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn mark_closed_unexpectedly(&self) {
        self.closed_unexpectedly.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent `terminate` fail
    pub fn fail_terminate(&self) {
        self.fail_terminate.store(true, Ordering::SeqCst);
    }

    /// Reasons passed to `terminate`, in call order
    pub fn terminations(&self) -> Vec<String> {
        lock(&self.terminations).clone()
    }
}

#[async_trait]
impl Session for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_active_millis(&self) -> u64 {
        self.last_active.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_unexpectedly(&self) -> bool {
        self.closed_unexpectedly.load(Ordering::SeqCst)
    }

    async fn terminate(&self, reason: &str) -> Result<(), SessionError> {
        lock(&self.terminations).push(reason.to_string());
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(SessionError::TerminateFailed {
                id: self.id.clone(),
                reason: "channel gone".into(),
            });
        }
        Ok(())
    }
}

/// Connection that counts close calls
pub struct FakeConnection {
    id: String,
    closes: AtomicUsize,
    fail_close: bool,
}

impl FakeConnection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            closes: AtomicUsize::new(0),
            fail_close: false,
        }
    }

    /// Connection whose `close` reports an error (after counting the call)
    pub fn failing(id: impl Into<String>) -> Self {
        Self {
            fail_close: true,
            ..Self::new(id)
        }
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ConnectionError::CloseFailed {
                id: self.id.clone(),
                reason: "broken pipe".into(),
            });
        }
        Ok(())
    }
}

/// Scripted replies for one heartbeat
pub enum ScriptedBeat {
    Reply(HeartbeatOutcome),
    Fail(ServiceError),
}

/// Central server stand-in.
///
/// Heartbeats consume scripted replies in order; once the script is empty
/// every heartbeat is answered with an empty task list.
#[derive(Default)]
pub struct FakeCentral {
    script: Mutex<VecDeque<ScriptedBeat>>,
    heartbeats: Mutex<Vec<Vec<String>>>,
    config: Mutex<Option<Map<String, Value>>>,
    config_fetches: AtomicUsize,
    finished: Mutex<Vec<String>>,
}

impl FakeCentral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, outcome: HeartbeatOutcome) {
        lock(&self.script).push_back(ScriptedBeat::Reply(outcome));
    }

    pub fn push_error(&self, error: ServiceError) {
        lock(&self.script).push_back(ScriptedBeat::Fail(error));
    }

    /// Document returned by `fetch_config`; unset means the fetch fails
    pub fn set_config(&self, document: Map<String, Value>) {
        *lock(&self.config) = Some(document);
    }

    /// Session id lists sent with each heartbeat
    pub fn heartbeats(&self) -> Vec<Vec<String>> {
        lock(&self.heartbeats).clone()
    }

    pub fn config_fetches(&self) -> usize {
        self.config_fetches.load(Ordering::SeqCst)
    }

    /// Task ids reported finished
    pub fn finished_tasks(&self) -> Vec<String> {
        lock(&self.finished).clone()
    }
}

#[async_trait]
impl CentralService for FakeCentral {
    async fn heartbeat(&self, sessions: &[String]) -> Result<HeartbeatOutcome, ServiceError> {
        lock(&self.heartbeats).push(sessions.to_vec());
        match lock(&self.script).pop_front() {
            Some(ScriptedBeat::Reply(outcome)) => Ok(outcome),
            Some(ScriptedBeat::Fail(error)) => Err(error),
            None => Ok(HeartbeatOutcome::Tasks(Vec::new())),
        }
    }

    async fn fetch_config(&self) -> Result<Map<String, Value>, ServiceError> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.config)
            .clone()
            .ok_or_else(|| ServiceError::Transport("connection refused".into()))
    }

    async fn finish_task(&self, task_id: &str) -> Result<(), ServiceError> {
        lock(&self.finished).push(task_id.to_string());
        Ok(())
    }
}

/// Task handler that records every task and fails those whose id is listed
#[derive(Default)]
pub struct RecordingHandler {
    handled: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, task_id: impl Into<String>) {
        lock(&self.failing).push(task_id.into());
    }

    /// Ids of every task handed to the handler, in order
    pub fn handled(&self) -> Vec<String> {
        lock(&self.handled).clone()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        lock(&self.handled).push(task.id.clone());
        if lock(&self.failing).contains(&task.id) {
            return Err(TaskError::UnknownSession {
                task_id: task.id.clone(),
                session_id: task.args.clone(),
            });
        }
        Ok(())
    }
}

/// Uploader that records uploads and fails for listed session ids
#[derive(Default)]
pub struct FakeUploader {
    uploads: Mutex<Vec<(String, PathBuf, String)>>,
    failing: Mutex<Vec<String>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, session_id: impl Into<String>) {
        lock(&self.failing).push(session_id.into());
    }

    /// `(session_id, path, target)` for every upload attempt
    pub fn uploads(&self) -> Vec<(String, PathBuf, String)> {
        lock(&self.uploads).clone()
    }
}

#[async_trait]
impl ReplayUploader for FakeUploader {
    async fn upload(&self, session_id: &str, path: &Path, target: &str) -> Result<(), ReplayError> {
        lock(&self.uploads).push((session_id.to_string(), path.to_path_buf(), target.to_string()));
        if lock(&self.failing).iter().any(|id| id == session_id) {
            return Err(ReplayError::Upload(ServiceError::Status {
                endpoint: "replay".into(),
                status: 500,
            }));
        }
        Ok(())
    }
}

/// Gateway that serves until shut down
#[derive(Default)]
pub struct FakeGateway {
    name: String,
    stop: CancellationToken,
    runs: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.stop.cancelled().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.stop.cancel();
    }
}
