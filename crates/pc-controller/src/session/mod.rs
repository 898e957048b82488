//! Session policy

pub mod messages;
mod monitor;

pub use messages::Language;
pub use monitor::{run_session_monitor, MonitorReport, SessionMonitor};
