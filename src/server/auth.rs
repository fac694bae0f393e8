//! Announcement authorization
//!
//! Only one sender may create announcements. The check is a trait so the
//! policy can be swapped (or faked in tests); the default compares the
//! peer's IP with a single configured address.

use std::net::{IpAddr, SocketAddr};

/// Decides whether a peer may create announcements
pub trait Authorizer: Send + Sync {
    fn may_announce(&self, peer: &SocketAddr) -> bool;
}

/// Allows exactly one IP address, on any port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegedAddress(pub IpAddr);

impl Authorizer for PrivilegedAddress {
    fn may_announce(&self, peer: &SocketAddr) -> bool {
        peer.ip() == self.0
    }
}

impl<F> Authorizer for F
where
    F: Fn(&SocketAddr) -> bool + Send + Sync,
{
    fn may_announce(&self, peer: &SocketAddr) -> bool {
        self(peer)
    }
}
