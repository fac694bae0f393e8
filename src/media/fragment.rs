//! Frame fragmentation
//!
//! A frame of `S` bytes is cut into `N = ceil(S / C)` chunks of at most
//! `C` bytes; chunk `i` covers `[i*C, min((i+1)*C, S))`. Each chunk is
//! wrapped in a [`PacketHeader`] carrying the frame id, its index and `N`.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::protocol::packet::{PacketHeader, VideoPacket};

/// Splits encoded frames into video packets
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    chunk_size: usize,
}

impl Fragmenter {
    /// Create a fragmenter; the chunk size is clamped to `1..=MAX_CHUNK_SIZE`
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of packets a frame of `len` bytes needs
    pub fn packet_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Encode every packet of one frame, in index order
    pub fn fragment(&self, frame_id: u32, frame: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let total = self.packet_count(frame.len());
        let total = u16::try_from(total).map_err(|_| ProtocolError::FrameTooLarge {
            size: frame.len(),
            chunk_size: self.chunk_size,
        })?;

        let packets = frame
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                VideoPacket::encode(PacketHeader::new(frame_id, index as u16, total), chunk)
            })
            .collect();

        Ok(packets)
    }
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::PACKET_HEADER_SIZE;

    #[test]
    fn test_packet_sizes() {
        let fragmenter = Fragmenter::default();
        let frame = vec![0xAB; 150_000];

        let packets = fragmenter.fragment(9, &frame).unwrap();
        let chunk_sizes: Vec<usize> = packets
            .iter()
            .map(|p| p.len() - PACKET_HEADER_SIZE)
            .collect();

        assert_eq!(chunk_sizes, vec![65_000, 65_000, 20_000]);
    }

    #[test]
    fn test_headers() {
        let fragmenter = Fragmenter::new(4);
        let packets = fragmenter.fragment(42, b"0123456789").unwrap();
        assert_eq!(packets.len(), 3);

        for (i, datagram) in packets.into_iter().enumerate() {
            let packet = VideoPacket::decode(datagram).unwrap();
            assert_eq!(packet.header, PacketHeader::new(42, i as u16, 3));
        }
    }

    #[test]
    fn test_chunks_reproduce_frame() {
        let fragmenter = Fragmenter::new(3);
        let frame = b"abcdefghij";

        let joined: Vec<u8> = fragmenter
            .fragment(1, frame)
            .unwrap()
            .into_iter()
            .flat_map(|p| VideoPacket::decode(p).unwrap().chunk.to_vec())
            .collect();

        assert_eq!(joined, frame);
    }

    #[test]
    fn test_exact_multiple() {
        let fragmenter = Fragmenter::new(5);
        assert_eq!(fragmenter.packet_count(10), 2);
        assert_eq!(fragmenter.packet_count(11), 3);
        assert_eq!(fragmenter.fragment(0, &[1; 10]).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert_eq!(
            Fragmenter::default().fragment(0, &[]),
            Err(ProtocolError::EmptyFrame)
        );
    }

    #[test]
    fn test_too_many_packets_rejected() {
        let fragmenter = Fragmenter::new(1);
        let frame = vec![0u8; u16::MAX as usize + 1];

        assert!(matches!(
            fragmenter.fragment(0, &frame),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_chunk_size_clamped() {
        assert_eq!(Fragmenter::new(0).chunk_size(), 1);
        assert_eq!(Fragmenter::new(usize::MAX).chunk_size(), MAX_CHUNK_SIZE);
    }
}
