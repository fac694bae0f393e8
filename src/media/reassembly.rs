//! Frame reassembly
//!
//! Packets are buffered per `frame_id` as they arrive, in any order and
//! with duplicates. A separate periodic [`Reassembler::drain`] hands every
//! complete frame to the caller, oldest first, and discards what can no
//! longer be delivered:
//!
//! - delivery is at-most-once and monotonic: once frame `k` is delivered,
//!   packets for any frame at or behind `k` are dropped and buffered
//!   entries at or behind `k` are purged, complete or not;
//! - an incomplete entry lagging the newest frame seen by more than the
//!   stale bound is purged, which caps memory when loss means frames
//!   never complete;
//! - a frame is only ever delivered whole.
//!
//! Frame ids wrap at 2^32, so ordering uses serial-number arithmetic:
//! `a` is newer than `b` when `a - b` (mod 2^32) is in `1..2^31`.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::protocol::constants::DEFAULT_STALE_FRAME_BOUND;
use crate::protocol::packet::VideoPacket;
use crate::stats::ReceiverStats;

/// A fully reassembled frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub frame_id: u32,
    pub data: Bytes,
}

/// What happened to an inserted packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored (or replaced a duplicate)
    Buffered,
    /// Frame is at or behind the last delivered frame
    Stale,
    /// `total_packets` disagrees with the frame's first packet
    Inconsistent,
    /// Header addresses no slot (`packet_index >= total_packets`)
    Invalid,
}

#[derive(Debug)]
struct FrameEntry {
    total: u16,
    chunks: Vec<Option<Bytes>>,
    received: usize,
}

impl FrameEntry {
    fn new(total: u16) -> Self {
        Self {
            total,
            chunks: vec![None; total as usize],
            received: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.total as usize
    }

    fn assemble(self) -> Bytes {
        if let [Some(only)] = self.chunks.as_slice() {
            return only.clone();
        }

        let size = self.chunks.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(size);
        for chunk in self.chunks.iter().flatten() {
            data.extend_from_slice(chunk);
        }
        data.freeze()
    }
}

/// Reassembly buffer for one video stream
#[derive(Debug)]
pub struct Reassembler {
    entries: HashMap<u32, FrameEntry>,
    last_delivered: Option<u32>,
    newest_seen: Option<u32>,
    stale_bound: u32,
    stats: ReceiverStats,
}

impl Reassembler {
    /// Create a reassembler with the default stale bound
    pub fn new() -> Self {
        Self::with_stale_bound(DEFAULT_STALE_FRAME_BOUND)
    }

    /// Create a reassembler that purges incomplete frames lagging the
    /// newest frame by more than `stale_bound`
    pub fn with_stale_bound(stale_bound: u32) -> Self {
        Self {
            entries: HashMap::new(),
            last_delivered: None,
            newest_seen: None,
            stale_bound,
            stats: ReceiverStats::default(),
        }
    }

    /// Buffer one packet
    pub fn insert(&mut self, packet: VideoPacket) -> InsertOutcome {
        let header = packet.header;
        let frame_id = header.frame_id;

        if header.validate().is_err() {
            self.stats.malformed_packets += 1;
            return InsertOutcome::Invalid;
        }

        if self.is_delivered(frame_id) {
            self.stats.stale_packets += 1;
            return InsertOutcome::Stale;
        }

        let entry = self
            .entries
            .entry(frame_id)
            .or_insert_with(|| FrameEntry::new(header.total_packets));

        if entry.total != header.total_packets {
            self.stats.inconsistent_packets += 1;
            tracing::debug!(
                frame_id = frame_id,
                expected = entry.total,
                reported = header.total_packets,
                "Dropping packet with inconsistent packet count"
            );
            return InsertOutcome::Inconsistent;
        }

        let slot = &mut entry.chunks[header.packet_index as usize];
        if slot.is_none() {
            entry.received += 1;
        }
        *slot = Some(packet.chunk);

        self.stats.packets_received += 1;
        if self.newest_seen.map_or(true, |newest| is_newer(frame_id, newest)) {
            self.newest_seen = Some(frame_id);
        }

        InsertOutcome::Buffered
    }

    /// Hand out every complete frame, oldest first, and purge frames that
    /// can no longer be delivered
    pub fn drain(&mut self) -> Vec<CompletedFrame> {
        self.purge_stale();

        let Some(newest) = self.newest_seen else {
            return Vec::new();
        };

        let mut ids: Vec<u32> = self.entries.keys().copied().collect();
        ids.sort_by_key(|&id| id.wrapping_sub(newest) as i32);

        let mut completed = Vec::new();
        for frame_id in ids {
            if self.is_delivered(frame_id) {
                self.entries.remove(&frame_id);
                self.stats.frames_purged += 1;
                continue;
            }

            if self.entries.get(&frame_id).is_some_and(FrameEntry::is_complete) {
                if let Some(entry) = self.entries.remove(&frame_id) {
                    completed.push(CompletedFrame {
                        frame_id,
                        data: entry.assemble(),
                    });
                    self.last_delivered = Some(frame_id);
                    self.stats.frames_delivered += 1;
                }
            }
        }

        completed
    }

    /// Id of the most recently delivered frame
    pub fn last_delivered(&self) -> Option<u32> {
        self.last_delivered
    }

    /// Number of frames currently buffered
    pub fn pending_frames(&self) -> usize {
        self.entries.len()
    }

    /// Whether a frame id is currently buffered
    pub fn is_pending(&self, frame_id: u32) -> bool {
        self.entries.contains_key(&frame_id)
    }

    /// Count a datagram that failed to decode
    pub fn record_malformed(&mut self) {
        self.stats.malformed_packets += 1;
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    fn is_delivered(&self, frame_id: u32) -> bool {
        self.last_delivered
            .is_some_and(|last| !is_newer(frame_id, last))
    }

    fn purge_stale(&mut self) {
        let Some(newest) = self.newest_seen else {
            return;
        };
        let bound = self.stale_bound;

        let before = self.entries.len();
        self.entries
            .retain(|&frame_id, _| newest.wrapping_sub(frame_id) <= bound);
        let purged = before - self.entries.len();

        if purged > 0 {
            self.stats.frames_purged += purged as u64;
            tracing::trace!(purged = purged, newest = newest, "Purged stale frames");
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial-number comparison on wrapping frame ids
fn is_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fragment::Fragmenter;
    use crate::protocol::packet::PacketHeader;

    fn packets(frame_id: u32, frame: &[u8], chunk_size: usize) -> Vec<VideoPacket> {
        Fragmenter::new(chunk_size)
            .fragment(frame_id, frame)
            .unwrap()
            .into_iter()
            .map(|p| VideoPacket::decode(p).unwrap())
            .collect()
    }

    fn packet(frame_id: u32, index: u16, total: u16, chunk: &'static [u8]) -> VideoPacket {
        VideoPacket {
            header: PacketHeader::new(frame_id, index, total),
            chunk: Bytes::from_static(chunk),
        }
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let frame: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let parts = packets(0, &frame, 65_000);
        assert_eq!(parts.len(), 3);

        let mut reassembler = Reassembler::new();
        for index in [2, 0, 1] {
            reassembler.insert(parts[index].clone());
        }

        let completed = reassembler.drain();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].frame_id, 0);
        assert_eq!(&completed[0].data[..], &frame[..]);
        assert_eq!(reassembler.pending_frames(), 0);
    }

    #[test]
    fn test_every_permutation_of_four() {
        let frame = b"0123456789abcdef";
        let parts = packets(5, frame, 4);

        let orders = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [1, 3, 0, 2],
            [2, 0, 3, 1],
        ];
        for order in orders {
            let mut reassembler = Reassembler::new();
            for index in order {
                reassembler.insert(parts[index].clone());
            }
            let completed = reassembler.drain();
            assert_eq!(&completed[0].data[..], frame);
        }
    }

    #[test]
    fn test_incomplete_never_delivered() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(1, 0, 2, b"half"));

        assert!(reassembler.drain().is_empty());
        assert!(reassembler.drain().is_empty());
        assert!(reassembler.is_pending(1));
    }

    #[test]
    fn test_duplicates_do_not_complete_frame() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(1, 0, 2, b"a"));
        reassembler.insert(packet(1, 0, 2, b"a"));

        assert!(reassembler.drain().is_empty());
    }

    #[test]
    fn test_missing_packet_purged_after_newer_delivery() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(1, 0, 2, b"a"));
        reassembler.insert(packet(2, 0, 1, b"b"));

        let completed = reassembler.drain();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].frame_id, 2);

        // The late half of frame 1 can no longer be delivered
        assert_eq!(reassembler.insert(packet(1, 1, 2, b"c")), InsertOutcome::Stale);
        assert!(reassembler.drain().is_empty());
        assert!(!reassembler.is_pending(1));
    }

    #[test]
    fn test_delivery_is_at_most_once() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(3, 0, 1, b"x"));
        assert_eq!(reassembler.drain().len(), 1);

        assert_eq!(reassembler.insert(packet(3, 0, 1, b"x")), InsertOutcome::Stale);
        assert!(reassembler.drain().is_empty());
        assert_eq!(reassembler.stats().frames_delivered, 1);
    }

    #[test]
    fn test_stale_bound_purges_without_delivery() {
        let mut reassembler = Reassembler::with_stale_bound(100);
        reassembler.insert(packet(0, 0, 2, b"a"));

        // Nothing ever completes, but the stream moves on
        reassembler.insert(packet(100, 0, 2, b"a"));
        reassembler.drain();
        assert!(reassembler.is_pending(0));

        reassembler.insert(packet(101, 0, 2, b"a"));
        reassembler.drain();
        assert!(!reassembler.is_pending(0));
        assert!(reassembler.is_pending(101));
    }

    #[test]
    fn test_frames_delivered_in_order() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(12, 0, 1, b"c"));
        reassembler.insert(packet(10, 0, 1, b"a"));
        reassembler.insert(packet(11, 0, 1, b"b"));

        let ids: Vec<u32> = reassembler.drain().iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert_eq!(reassembler.last_delivered(), Some(12));
    }

    #[test]
    fn test_frame_id_wraparound() {
        let mut reassembler = Reassembler::new();
        reassembler.insert(packet(u32::MAX, 0, 1, b"a"));
        reassembler.insert(packet(0, 0, 1, b"b"));

        let ids: Vec<u32> = reassembler.drain().iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, vec![u32::MAX, 0]);

        reassembler.insert(packet(1, 0, 1, b"c"));
        assert_eq!(reassembler.drain()[0].frame_id, 1);
    }

    #[test]
    fn test_inconsistent_total_dropped() {
        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.insert(packet(4, 0, 2, b"a")), InsertOutcome::Buffered);
        assert_eq!(
            reassembler.insert(packet(4, 0, 1, b"b")),
            InsertOutcome::Inconsistent
        );
        assert_eq!(reassembler.insert(packet(4, 1, 2, b"c")), InsertOutcome::Buffered);

        let completed = reassembler.drain();
        assert_eq!(&completed[0].data[..], b"ac");
        assert_eq!(reassembler.stats().inconsistent_packets, 1);
    }

    #[test]
    fn test_hand_built_invalid_header_rejected() {
        let mut reassembler = Reassembler::new();

        assert_eq!(reassembler.insert(packet(1, 5, 2, b"x")), InsertOutcome::Invalid);
        assert_eq!(reassembler.insert(packet(1, 0, 0, b"x")), InsertOutcome::Invalid);
        assert_eq!(reassembler.pending_frames(), 0);
        assert_eq!(reassembler.stats().malformed_packets, 2);

        // The frame id is still usable once valid packets arrive
        assert_eq!(reassembler.insert(packet(1, 0, 1, b"ok")), InsertOutcome::Buffered);
        assert_eq!(&reassembler.drain()[0].data[..], b"ok");
    }
}
