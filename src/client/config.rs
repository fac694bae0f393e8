//! Client configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server control channel address
    pub control_addr: SocketAddr,

    /// Server handshake address; hellos go here
    pub video_server_addr: SocketAddr,

    /// Local UDP address video is received on; must be unique per client on a host
    pub video_listen_addr: SocketAddr,

    /// Name sent as `sender_id` with chat messages
    pub sender_name: Option<String>,

    /// Consecutive failed connects before giving up (`None` = retry forever)
    pub max_retries: Option<u32>,

    /// Pause between connection attempts
    pub retry_delay: Duration,

    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,

    /// Upper bound on a single request write
    pub write_timeout: Duration,

    /// Hello resend interval; must stay below the server's TTL
    pub hello_interval: Duration,

    /// How often complete frames are drained to the sink
    pub drain_interval: Duration,

    /// Incomplete frames lagging the newest by more than this are purged
    pub stale_frame_bound: u32,

    /// Longest accepted line from the server, in bytes
    pub max_line_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_server(Ipv4Addr::LOCALHOST.into())
    }
}

impl ClientConfig {
    /// Default configuration pointed at a server's well-known ports
    pub fn for_server(ip: IpAddr) -> Self {
        Self {
            control_addr: SocketAddr::new(ip, DEFAULT_CONTROL_PORT),
            video_server_addr: SocketAddr::new(ip, DEFAULT_VIDEO_PORT),
            video_listen_addr: SocketAddr::new(
                Ipv4Addr::UNSPECIFIED.into(),
                DEFAULT_CLIENT_VIDEO_PORT,
            ),
            sender_name: None,
            max_retries: Some(5),
            retry_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            hello_interval: DEFAULT_HELLO_INTERVAL,
            drain_interval: Duration::from_millis(10),
            stale_frame_bound: DEFAULT_STALE_FRAME_BOUND,
            max_line_len: 16 * 1024 * 1024,
        }
    }

    pub fn control_addr(mut self, addr: SocketAddr) -> Self {
        self.control_addr = addr;
        self
    }

    pub fn video_server_addr(mut self, addr: SocketAddr) -> Self {
        self.video_server_addr = addr;
        self
    }

    pub fn video_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.video_listen_addr = addr;
        self
    }

    /// Set the chat sender name (blank names are ignored)
    pub fn sender_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let name = name.trim();
        self.sender_name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        self
    }

    /// Give up after `retries` consecutive failed connects
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries.max(1));
        self
    }

    /// Never give up reconnecting
    pub fn retry_forever(mut self) -> Self {
        self.max_retries = None;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the hello interval, capped below the default receiver TTL
    pub fn hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval.min(DEFAULT_RECEIVER_TTL / 2);
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn stale_frame_bound(mut self, bound: u32) -> Self {
        self.stale_frame_bound = bound;
        self
    }

    pub fn max_line_len(mut self, len: usize) -> Self {
        self.max_line_len = len;
        self
    }
}
