//! Registry entry

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

/// A receiver eligible for video
#[derive(Debug, Clone)]
pub struct Registration {
    /// Address video packets are sent to
    pub addr: SocketAddr,
    /// First hello seen from this address
    pub registered_at: Instant,
    /// Most recent hello
    pub last_seen: Instant,
    /// Number of hellos received
    pub hellos: u64,
}

impl Registration {
    pub(super) fn new(addr: SocketAddr, now: Instant) -> Self {
        Self {
            addr,
            registered_at: now,
            last_seen: now,
            hellos: 1,
        }
    }

    pub(super) fn refresh(&mut self, now: Instant) {
        self.last_seen = now;
        self.hellos += 1;
    }

    /// Whether the entry has been silent for longer than `ttl`
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}
