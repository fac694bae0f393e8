//! Server side
//!
//! ```text
//!                 ┌──────────────── VidcastServer ────────────────┐
//!  TCP control ──▶│ accept loop ──▶ ControlSession ◀──▶ BroadcastHub ◀──▶ store
//!                 │                                               │
//!  UDP hello ────▶│ HandshakeListener ──▶ LivenessRegistry        │
//!                 │                            │                  │
//!  UDP video ◀────│ VideoDistributor ◀─────────┘ ◀── FrameSource  │
//!                 └───────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod handshake;
pub mod hub;
pub mod listener;
pub mod session;
pub mod video;

pub use auth::{Authorizer, PrivilegedAddress};
pub use config::ServerConfig;
pub use handshake::HandshakeListener;
pub use hub::{AnnouncementOutcome, BroadcastHub, ChatOutcome, SessionHandle};
pub use listener::VidcastServer;
pub use session::ControlSession;
pub use video::VideoDistributor;
