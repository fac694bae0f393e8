//! Protocol constants

use std::time::Duration;

/// UDP video packet header: frame_id (4) + packet_index (2) + total_packets (2)
pub const PACKET_HEADER_SIZE: usize = 8;

/// Default maximum chunk bytes carried by one video packet
pub const DEFAULT_CHUNK_SIZE: usize = 65_000;

/// Largest chunk that still fits an IPv4 UDP datagram with the header
pub const MAX_CHUNK_SIZE: usize = 65_507 - PACKET_HEADER_SIZE;

/// Receive buffer size for video datagrams
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// ASCII token a receiver sends to register for video
pub const HELLO_TOKEN: &str = "VIDEO_HELLO";

/// Default TCP control port
pub const DEFAULT_CONTROL_PORT: u16 = 4000;

/// Default server UDP handshake port
pub const DEFAULT_VIDEO_PORT: u16 = 5000;

/// Default client UDP receive port
pub const DEFAULT_CLIENT_VIDEO_PORT: u16 = 5001;

/// Silence allowed before a receiver is evicted
pub const DEFAULT_RECEIVER_TTL: Duration = Duration::from_secs(10);

/// Receiver hello period (must stay below the TTL)
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(5);

/// Target frames per second for the distribution loop
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Frames an incomplete entry may lag before it is purged
pub const DEFAULT_STALE_FRAME_BOUND: u32 = 100;

/// Maximum chat message length in characters
pub const MAX_CHAT_CHARS: usize = 500;
