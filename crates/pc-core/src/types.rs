//! Core domain types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Instruction issued by the central server in a heartbeat response
///
/// Only `name` and `args` are interpreted by the controller; anything else the
/// server sends along is kept in `extra` and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Server-side task identifier, echoed back when the task is finished
    pub id: String,
    /// Kind discriminator, e.g. `kill_session`
    pub name: String,
    /// Addressing data; for session tasks this is the session id
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: String,
    /// Unrecognised fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Servers send `"args": null` for tasks that address nothing
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Task {
    /// Create a task with no extra fields
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Parsed task kind
    pub fn kind(&self) -> TaskKind<'_> {
        match self.name.as_str() {
            "kill_session" => TaskKind::KillSession { session_id: &self.args },
            other => TaskKind::Unknown(other),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) [{}]", self.name, self.args, self.id)
    }
}

/// Task kinds understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind<'a> {
    /// Force-terminate the addressed session
    KillSession { session_id: &'a str },
    /// Anything else; logged and skipped
    Unknown(&'a str),
}

/// Result of a heartbeat round-trip that reached the server
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatOutcome {
    /// Heartbeat accepted; zero or more tasks to execute
    Tasks(Vec<Task>),
    /// Server explicitly refused the heartbeat
    Rejected,
}

impl HeartbeatOutcome {
    /// Whether the heartbeat was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Tasks(_))
    }
}
