//! Liveness registry
//!
//! The set of receiver addresses currently eligible for video. The
//! handshake listener writes to it on every hello; the distribution loop
//! prunes expired entries and takes a copied snapshot before each frame,
//! so it never iterates the map while another task mutates it.
//!
//! ```text
//!   HandshakeListener            Arc<LivenessRegistry>         VideoDistributor
//!   "VIDEO_HELLO" from A ──► touch(A) ──► { A: last_seen } ◄── snapshot()
//!                                                               (prune > TTL,
//!                                                                copy addrs)
//! ```

pub mod config;
pub mod entry;
pub mod store;

pub use config::RegistryConfig;
pub use entry::Registration;
pub use store::LivenessRegistry;
