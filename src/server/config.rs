//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address for the announcement/chat control channel
    pub control_addr: SocketAddr,

    /// UDP address receivers send their hello to; video is sent from it too
    pub video_addr: SocketAddr,

    /// The only address allowed to create announcements (see `BroadcastHub::load_for`)
    pub privileged_ip: IpAddr,

    /// Maximum concurrent control connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on control connections
    pub tcp_nodelay: bool,

    /// Largest frame chunk per UDP packet
    pub chunk_size: usize,

    /// Target frames per second for the distribution loop
    pub frame_rate: u32,

    /// Pause between iterations while no receiver is registered
    pub idle_delay: Duration,

    /// Per-session outbound queue depth; a session whose queue fills is dropped
    pub outbound_queue: usize,

    /// Upper bound on a single control write
    pub write_timeout: Duration,

    /// Longest accepted control line, in bytes
    pub max_line_len: usize,

    /// How long shutdown waits for tasks to finish
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            control_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_CONTROL_PORT),
            video_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_VIDEO_PORT),
            privileged_ip: Ipv4Addr::LOCALHOST.into(),
            max_connections: 0,
            tcp_nodelay: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_rate: DEFAULT_FRAME_RATE,
            idle_delay: Duration::from_millis(100),
            outbound_queue: 256,
            write_timeout: Duration::from_secs(5),
            max_line_len: 64 * 1024,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    /// Set the control channel address
    pub fn control_addr(mut self, addr: SocketAddr) -> Self {
        self.control_addr = addr;
        self
    }

    /// Set the video/handshake address
    pub fn video_addr(mut self, addr: SocketAddr) -> Self {
        self.video_addr = addr;
        self
    }

    /// Set the address allowed to create announcements
    pub fn privileged_ip(mut self, ip: IpAddr) -> Self {
        self.privileged_ip = ip;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set chunk size, clamped to what fits in one datagram
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Set frame rate (at least 1)
    pub fn frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps.max(1);
        self
    }

    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Set outbound queue depth (at least 1)
    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(1);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Interval between distributed frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}
