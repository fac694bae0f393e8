//! Receiver hello handshake
//!
//! A receiver registers for video by sending a datagram containing only
//! the ASCII hello token to the server's handshake port, and keeps
//! re-sending it while it wants frames:
//!
//! ```text
//! Receiver                                 Server
//!   |                                        |
//!   |------- "VIDEO_HELLO" (UDP) ---------->|  registry[addr] = now
//!   |<------ video packets ------------------|
//!   |          ... every hello interval ...  |
//!   |------- "VIDEO_HELLO" (UDP) ---------->|  registry[addr] = now
//! ```
//!
//! There is no reply and no other payload structure.

use bytes::Bytes;

use super::constants::HELLO_TOKEN;

/// The hello datagram
pub fn hello_datagram() -> Bytes {
    Bytes::from_static(HELLO_TOKEN.as_bytes())
}

/// Whether a datagram is a hello
///
/// Surrounding ASCII whitespace is tolerated, anything else is not.
pub fn is_hello(data: &[u8]) -> bool {
    data.trim_ascii() == HELLO_TOKEN.as_bytes()
}
