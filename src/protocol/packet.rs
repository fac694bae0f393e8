//! UDP video packet codec
//!
//! Every datagram carries one chunk of an encoded frame behind a fixed
//! 8-byte big-endian header:
//!
//! ```text
//! +--------------+------------------+-------------------+-----------+
//! | frame_id (4) | packet_index (2) | total_packets (2) | chunk (N) |
//! +--------------+------------------+-------------------+-----------+
//! ```
//!
//! Concatenating the chunks of one `frame_id` in index order reproduces
//! the frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::PACKET_HEADER_SIZE;
use crate::error::ProtocolError;

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Frame this chunk belongs to (monotonic, wraps)
    pub frame_id: u32,
    /// Position of the chunk within the frame
    pub packet_index: u16,
    /// Number of packets the frame was split into
    pub total_packets: u16,
}

impl PacketHeader {
    pub fn new(frame_id: u32, packet_index: u16, total_packets: u16) -> Self {
        Self {
            frame_id,
            packet_index,
            total_packets,
        }
    }

    /// Write the header in wire order
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.frame_id);
        buf.put_u16(self.packet_index);
        buf.put_u16(self.total_packets);
    }

    /// Check that the index addresses a slot of the frame
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.total_packets == 0 || self.packet_index >= self.total_packets {
            return Err(ProtocolError::InvalidPacketIndex {
                index: self.packet_index,
                total: self.total_packets,
            });
        }
        Ok(())
    }
}

/// A video packet: header plus chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPacket {
    pub header: PacketHeader,
    pub chunk: Bytes,
}

impl VideoPacket {
    /// Build a datagram ready to send
    pub fn encode(header: PacketHeader, chunk: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + chunk.len());
        header.encode(&mut buf);
        buf.put_slice(chunk);
        buf.freeze()
    }

    /// Parse a received datagram
    ///
    /// The chunk shares the datagram's allocation.
    pub fn decode(mut data: Bytes) -> Result<Self, ProtocolError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort(data.len()));
        }

        let header = PacketHeader {
            frame_id: data.get_u32(),
            packet_index: data.get_u16(),
            total_packets: data.get_u16(),
        };
        header.validate()?;

        Ok(Self {
            header,
            chunk: data,
        })
    }
}
