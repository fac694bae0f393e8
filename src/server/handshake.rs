//! Handshake listener
//!
//! Reads the server's UDP socket and refreshes the liveness registry for
//! every hello datagram. Anything else arriving on the socket is ignored.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::protocol::constants::MAX_DATAGRAM_SIZE;
use crate::protocol::handshake::is_hello;
use crate::registry::LivenessRegistry;

/// Registers receivers that say hello
pub struct HandshakeListener {
    socket: Arc<UdpSocket>,
    registry: Arc<LivenessRegistry>,
}

impl HandshakeListener {
    pub fn new(socket: Arc<UdpSocket>, registry: Arc<LivenessRegistry>) -> Self {
        Self { socket, registry }
    }

    /// Listen until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) if is_hello(&buf[..len]) => {
                    self.registry.touch(from).await;
                }
                Ok((len, from)) => {
                    tracing::debug!(peer = %from, len, "Ignoring non-hello datagram");
                }
                Err(e) => {
                    // ICMP port-unreachable from a departed receiver surfaces here on some platforms
                    tracing::warn!(error = %e, "Handshake receive failed");
                }
            }
        }

        tracing::debug!("Handshake listener stopped");
    }
}
