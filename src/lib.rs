//! # vidcast
//!
//! Live video fan-out over UDP alongside a line-framed JSON channel for
//! host announcements and chat.
//!
//! ## Video
//!
//! Receivers register by sending a hello datagram to the server and
//! repeating it before the registration's TTL runs out. The server splits
//! each frame into packets carrying an 8-byte header and sends every
//! packet to every registered receiver. Receivers reassemble frames from
//! whatever arrives, in any order, and deliver only complete frames,
//! at most once and in order.
//!
//! ```text
//! FrameSource ─▶ Fragmenter ─▶ VideoDistributor ══UDP══▶ VideoReceiver ─▶ Reassembler ─▶ FrameSink
//!                                   ▲                         │
//!                           LivenessRegistry ◀══ hello ═══════┘
//! ```
//!
//! ## Control
//!
//! Each TCP connection receives the announcement list and the chat log on
//! connect, then every new announcement and chat line as they happen.
//! Only one configured address may create announcements.
//!
//! ```text
//! {"type":"chatMessage","payload":{"sender_id":"laptop","message":"hi"}}\n
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vidcast::server::{BroadcastHub, ServerConfig, VidcastServer};
//! use vidcast::store::JsonFileStore;
//!
//! #[tokio::main]
//! async fn main() -> vidcast::error::Result<()> {
//!     let config = ServerConfig::default();
//!     let hub = BroadcastHub::load_for(Arc::new(JsonFileStore::new("announcements.json")), &config).await;
//!
//!     let server = VidcastServer::bind(config, Arc::new(hub), CancellationToken::new()).await?;
//!     server
//!         .run_until(None, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
