//! Control session state
//!
//! Per-connection bookkeeping for the TCP control channel. The I/O loop
//! that drives a session lives in [`crate::server::session`].

pub mod state;

pub use state::{SessionPhase, SessionState};
