//! Core error types for Portcullis

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the controller
#[derive(Error, Debug)]
pub enum PcError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Central server error
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Task execution error
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Replay upload error
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection was already closed
    #[error("Connection already closed: {0}")]
    AlreadyClosed(String),

    /// Underlying transport failed while closing
    #[error("Failed to close connection {id}: {reason}")]
    CloseFailed { id: String, reason: String },

    /// Connection already registered under this id
    #[error("Connection already exists: {0}")]
    AlreadyExists(String),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Session already exists
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Termination could not be delivered to the session
    #[error("Failed to terminate session {id}: {reason}")]
    TerminateFailed { id: String, reason: String },
}

/// Errors talking to the central server
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request never completed (connect, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered with an unexpected status
    #[error("Unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Server answered with a body we could not decode
    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

/// Errors while executing a task received over the heartbeat
#[derive(Error, Debug)]
pub enum TaskError {
    /// Task addresses a session this controller does not hold
    #[error("Task {task_id} addresses unknown session {session_id}")]
    UnknownSession { task_id: String, session_id: String },

    /// Session refused the instruction
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Completion could not be reported back
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Errors while re-uploading a replay recording
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Recording could not be read from disk
    #[error("Failed to read replay {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Upload was rejected by the server
    #[error(transparent)]
    Upload(#[from] ServiceError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value present but of the wrong shape for its key
    #[error("Config key {key} has invalid value: {reason}")]
    InvalidValue { key: String, reason: String },
}
