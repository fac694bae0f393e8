//! Client side
//!
//! Two independent halves:
//! - [`ControlClient`]: the announcement/chat connection, with reconnect
//! - [`VideoReceiver`]: UDP registration and frame reassembly

pub mod config;
pub mod control;
pub mod video;

pub use config::ClientConfig;
pub use control::{ConnectionState, ControlClient, ControlEvent};
pub use video::VideoReceiver;
