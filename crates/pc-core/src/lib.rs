//! pc-core: Core abstractions and configuration for Portcullis
//!
//! This crate provides the session, connection, gateway and central-server
//! traits the controller is written against, the task and heartbeat types
//! exchanged with the central server, and the layered configuration store.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use config::{ConfigStore, Settings};
pub use error::PcError;
pub use types::{HeartbeatOutcome, Task, TaskKind};
