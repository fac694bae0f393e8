//! Video receiver
//!
//! Binds the client's UDP port, says hello to the server on every hello
//! interval, feeds incoming packets into a [`Reassembler`] and, on a
//! separate tick, drains complete frames into a [`FrameSink`]. The
//! receive side and the drain side share the reassembler through a mutex;
//! frames are handed to the sink after the lock is released.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::ClientConfig;
use crate::error::{Error, Result};
use crate::media::{FrameSink, InsertOutcome, Reassembler};
use crate::protocol::constants::MAX_DATAGRAM_SIZE;
use crate::protocol::handshake::hello_datagram;
use crate::protocol::packet::VideoPacket;
use crate::stats::ReceiverStats;

/// Receives and reassembles the server's video stream
pub struct VideoReceiver {
    socket: UdpSocket,
    server_addr: SocketAddr,
    reassembler: Arc<Mutex<Reassembler>>,
    hello_interval: Duration,
    drain_interval: Duration,
}

impl VideoReceiver {
    /// Bind the local video port
    ///
    /// Failing to bind is fatal for the receiver: it cancels `shutdown`
    /// and returns [`Error::Bind`].
    pub async fn bind(config: &ClientConfig, shutdown: &CancellationToken) -> Result<Self> {
        let socket = match UdpSocket::bind(config.video_listen_addr).await {
            Ok(socket) => socket,
            Err(source) => {
                tracing::error!(
                    addr = %config.video_listen_addr,
                    error = %source,
                    "Failed to bind video port"
                );
                shutdown.cancel();
                return Err(Error::Bind {
                    addr: config.video_listen_addr,
                    source,
                });
            }
        };

        Ok(Self {
            socket,
            server_addr: config.video_server_addr,
            reassembler: Arc::new(Mutex::new(Reassembler::with_stale_bound(
                config.stale_frame_bound,
            ))),
            hello_interval: config.hello_interval,
            drain_interval: config.drain_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle on the reassembly buffer, for inspection
    pub fn reassembler(&self) -> Arc<Mutex<Reassembler>> {
        Arc::clone(&self.reassembler)
    }

    /// Receive until `shutdown` fires, delivering frames to `sink`
    pub async fn run<K: FrameSink>(self, mut sink: K, shutdown: CancellationToken) -> ReceiverStats {
        tracing::info!(
            local = ?self.socket.local_addr().ok(),
            server = %self.server_addr,
            "Video receiver started"
        );

        tokio::join!(
            self.receive_loop(&shutdown),
            self.drain_loop(&mut sink, &shutdown)
        );

        let stats = self.reassembler.lock().await.stats().clone();
        tracing::info!(
            delivered = stats.frames_delivered,
            purged = stats.frames_purged,
            malformed = stats.malformed_packets,
            "Video receiver stopped"
        );
        stats
    }

    async fn receive_loop(&self, shutdown: &CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut hello = tokio::time::interval(self.hello_interval);
        hello.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = hello.tick() => self.send_hello().await,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.accept(Bytes::copy_from_slice(&buf[..len]), from).await,
                    Err(e) => tracing::warn!(error = %e, "Video receive failed"),
                },
            }
        }
    }

    async fn send_hello(&self) {
        match self.socket.send_to(&hello_datagram(), self.server_addr).await {
            Ok(_) => tracing::trace!(server = %self.server_addr, "Hello sent"),
            Err(e) => tracing::warn!(server = %self.server_addr, error = %e, "Failed to send hello"),
        }
    }

    async fn accept(&self, datagram: Bytes, from: SocketAddr) {
        let packet = match VideoPacket::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(peer = %from, error = %e, "Dropping malformed video packet");
                self.reassembler.lock().await.record_malformed();
                return;
            }
        };

        let frame_id = packet.header.frame_id;
        match self.reassembler.lock().await.insert(packet) {
            InsertOutcome::Buffered => {}
            InsertOutcome::Stale => tracing::trace!(frame_id, "Stale packet dropped"),
            InsertOutcome::Inconsistent => {
                tracing::debug!(frame_id, "Packet with inconsistent packet count dropped")
            }
            InsertOutcome::Invalid => tracing::debug!(frame_id, "Packet with invalid index dropped"),
        }
    }

    async fn drain_loop<K: FrameSink>(&self, sink: &mut K, shutdown: &CancellationToken) {
        let mut tick = tokio::time::interval(self.drain_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }

            let frames = self.reassembler.lock().await.drain();
            for frame in frames {
                tracing::trace!(frame_id = frame.frame_id, size = frame.data.len(), "Frame delivered");
                sink.deliver(frame);
            }
        }
    }
}
