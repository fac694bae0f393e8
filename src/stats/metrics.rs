//! Counters for the video distributor and receiver

/// Sender-side counters
#[derive(Debug, Clone, Default)]
pub struct DistributionStats {
    /// Frames fragmented and sent to at least one receiver
    pub frames_sent: u64,
    /// Datagrams handed to the socket (one per packet per receiver)
    pub packets_sent: u64,
    /// Payload bytes handed to the socket
    pub bytes_sent: u64,
    /// `send_to` failures
    pub send_errors: u64,
    /// Iterations skipped because no receiver was registered
    pub idle_ticks: u64,
    /// Iterations that took longer than the frame interval
    pub overruns: u64,
    /// Times the source was rewound after running dry
    pub rewinds: u64,
    /// Frames that could not be fragmented (empty or oversized)
    pub frames_skipped: u64,
}

impl DistributionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean datagrams per distributed frame
    pub fn packets_per_frame(&self) -> f64 {
        if self.frames_sent > 0 {
            self.packets_sent as f64 / self.frames_sent as f64
        } else {
            0.0
        }
    }
}

/// Receiver-side counters
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Well-formed packets accepted into the reassembly buffer
    pub packets_received: u64,
    /// Datagrams dropped for a bad header
    pub malformed_packets: u64,
    /// Packets for frames at or behind the last delivered frame
    pub stale_packets: u64,
    /// Packets whose `total_packets` disagreed with the frame's first packet
    pub inconsistent_packets: u64,
    /// Complete frames handed to the sink
    pub frames_delivered: u64,
    /// Incomplete frames dropped from the buffer
    pub frames_purged: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of buffered frames that were delivered rather than purged
    pub fn completion_ratio(&self) -> f64 {
        let total = self.frames_delivered + self.frames_purged;
        if total > 0 {
            self.frames_delivered as f64 / total as f64
        } else {
            0.0
        }
    }
}
