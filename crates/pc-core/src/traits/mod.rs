//! Core trait definitions

mod connection;
mod gateway;
mod service;
mod session;

pub use connection::Connection;
pub use gateway::Gateway;
pub use service::{CentralService, ReplayUploader, TaskHandler};
pub use session::Session;
