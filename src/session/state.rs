//! Session state machine
//!
//! Tracks a control connection from accept to close:
//!
//! ```text
//! Connected --(read error / EOF / send failure)--> Closing --> Closed
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Registered with the hub, message loop running
    Connected,
    /// Loop has stopped, session is being removed from the hub
    Closing,
    /// Socket released
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Complete lines read from the peer
    pub lines_received: u64,

    /// Requests answered with `announcementError` or `serverError`
    pub requests_rejected: u64,

    /// Bytes read from the socket
    pub bytes_received: u64,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            lines_received: 0,
            requests_rejected: 0,
            bytes_received: 0,
        }
    }

    pub fn add_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn on_line(&mut self) {
        self.lines_received += 1;
    }

    pub fn on_rejected(&mut self) {
        self.requests_rejected += 1;
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Mark the socket as released
    pub fn finish(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        SessionState::new(1, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000))
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Connected);
        assert!(state.is_connected());

        state.close();
        assert_eq!(state.phase, SessionPhase::Closing);
        assert!(!state.is_connected());

        state.finish();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_close_after_finish_stays_closed() {
        let mut state = state();
        state.finish();
        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_counters() {
        let mut state = state();
        state.add_bytes_received(10);
        state.add_bytes_received(5);
        state.on_line();
        state.on_rejected();

        assert_eq!(state.bytes_received, 15);
        assert_eq!(state.lines_received, 1);
        assert_eq!(state.requests_rejected, 1);
    }
}
