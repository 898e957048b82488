//! pc-controller: bastion terminal controller
//!
//! Keeps the terminal's live sessions and connections in step with the
//! central authorization server. Background loops report liveness and execute
//! remote tasks (heartbeat), enforce the idle policy (session monitor), pull
//! configuration (config refresh) and re-upload leftover replays. The
//! [`Controller`] wires them together and runs the shutdown sequence.
//!
//! Protocol gateways (SSH, WebSocket) live outside this crate and plug in
//! through the [`pc_core::traits::Gateway`] trait.

pub mod controller;
pub mod gateway;
mod guard;
pub mod heartbeat;
pub mod refresh;
pub mod registry;
pub mod replay;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::{Controller, ControllerBuilder};
pub use registry::{ConnectionRegistry, SessionRegistry};
pub use service::HttpCentralClient;
pub use state::ControllerState;
