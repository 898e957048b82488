//! Clients for the central authorization server

mod http;

pub use http::{Endpoints, HttpCentralClient, REPLAY_TARGET_HEADER};
