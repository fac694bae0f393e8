//! Wire protocol
//!
//! Two independent wire formats share this module:
//!
//! - the binary UDP video packet ([`packet`]) and the hello datagram
//!   receivers use to register for it ([`handshake`]);
//! - the line-framed JSON control envelope ([`envelope`], [`message`]).
//!
//! Nothing here holds state.

pub mod constants;
pub mod envelope;
pub mod handshake;
pub mod message;
pub mod packet;

pub use envelope::{decode_request, decode_server_message, encode_line, take_line};
pub use handshake::{hello_datagram, is_hello};
pub use message::{
    Announcement, AnnouncementRequest, ChatMessage, ChatRequest, ClientRequest, ErrorPayload,
    ServerMessage,
};
pub use packet::{PacketHeader, VideoPacket};
