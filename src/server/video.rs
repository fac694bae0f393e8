//! Video distribution loop
//!
//! Each iteration pulls one frame from the source, fragments it and sends
//! every packet to every receiver in a fresh registry snapshot. The loop
//! is paced to the configured frame rate: it sleeps whatever is left of
//! the frame interval, and when an iteration overruns it simply carries
//! on. Frames are never skipped to catch up.
//!
//! A source that runs dry is rewound once; if it is still empty, or fails
//! to read, distribution stops and the rest of the server carries on. A
//! frame that cannot be fragmented is skipped but still costs its slot in
//! the pacing.
//!
//! Sources may block (the directory source reads a file per frame), so
//! they are always called on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use crate::error::{Error, Result};
use crate::media::{FrameSource, Fragmenter};
use crate::registry::LivenessRegistry;
use crate::stats::DistributionStats;

/// Paced fan-out of frames to registered receivers
pub struct VideoDistributor<S> {
    socket: Arc<UdpSocket>,
    registry: Arc<LivenessRegistry>,
    /// Only `None` while lent to the blocking pool
    source: Option<S>,
    fragmenter: Fragmenter,
    frame_interval: Duration,
    idle_delay: Duration,
    frame_id: u32,
    stats: DistributionStats,
}

impl<S: FrameSource + 'static> VideoDistributor<S> {
    pub fn new(
        socket: Arc<UdpSocket>,
        registry: Arc<LivenessRegistry>,
        source: S,
        config: &ServerConfig,
    ) -> Self {
        Self {
            socket,
            registry,
            source: Some(source),
            fragmenter: Fragmenter::new(config.chunk_size),
            frame_interval: config.frame_interval(),
            idle_delay: config.idle_delay,
            frame_id: 0,
            stats: DistributionStats::new(),
        }
    }

    /// Start numbering frames at `frame_id` instead of zero
    pub fn first_frame_id(mut self, frame_id: u32) -> Self {
        self.frame_id = frame_id;
        self
    }

    /// Distribute until `shutdown` fires or the source is exhausted
    pub async fn run(mut self, shutdown: CancellationToken) -> DistributionStats {
        tracing::info!(
            chunk_size = self.fragmenter.chunk_size(),
            interval_ms = self.frame_interval.as_millis() as u64,
            "Video distribution started"
        );

        while !shutdown.is_cancelled() {
            let started = Instant::now();

            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = self.next_frame() => frame,
            };
            let Some(frame) = frame else {
                break;
            };

            let receivers = self.registry.snapshot().await;
            if receivers.is_empty() {
                self.stats.idle_ticks += 1;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_delay) => continue,
                }
            }

            match self.fragmenter.fragment(self.frame_id, &frame) {
                Ok(packets) => {
                    self.send(&packets, &receivers).await;
                    self.stats.frames_sent += 1;
                    tracing::trace!(
                        frame_id = self.frame_id,
                        packets = packets.len(),
                        receivers = receivers.len(),
                        "Frame distributed"
                    );
                    self.frame_id = self.frame_id.wrapping_add(1);
                }
                Err(e) => {
                    self.stats.frames_skipped += 1;
                    tracing::warn!(frame_id = self.frame_id, error = %e, "Skipping frame");
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.frame_interval {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.frame_interval - elapsed) => {}
                }
            } else {
                self.stats.overruns += 1;
            }
        }

        tracing::info!(
            frames = self.stats.frames_sent,
            packets = self.stats.packets_sent,
            skipped = self.stats.frames_skipped,
            send_errors = self.stats.send_errors,
            "Video distribution stopped"
        );
        self.stats
    }

    async fn send(&mut self, packets: &[Bytes], receivers: &[std::net::SocketAddr]) {
        for packet in packets {
            for addr in receivers {
                match self.socket.send_to(packet, addr).await {
                    Ok(sent) => {
                        self.stats.packets_sent += 1;
                        self.stats.bytes_sent += sent as u64;
                    }
                    Err(e) => {
                        self.stats.send_errors += 1;
                        tracing::warn!(receiver = %addr, error = %e, "Video send failed");
                    }
                }
            }
        }
    }

    /// Next frame, rewinding the source once if it has run dry
    async fn next_frame(&mut self) -> Option<Bytes> {
        let read = self
            .with_source(|source| match source.next_frame()? {
                Some(frame) => Ok((Some(frame), false)),
                None => {
                    source.rewind()?;
                    Ok((source.next_frame()?, true))
                }
            })
            .await;

        match read {
            Ok((frame, rewound)) => {
                if rewound {
                    self.stats.rewinds += 1;
                    tracing::debug!("Frame source exhausted, rewound");
                }
                if frame.is_none() {
                    tracing::warn!("Frame source empty after rewind, video distribution disabled");
                }
                frame
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame source failed, video distribution disabled");
                None
            }
        }
    }

    /// Run `f` against the source on the blocking pool
    async fn with_source<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(mut source) = self.source.take() else {
            return Err(Error::SourceUnavailable("source lost by an earlier read".into()));
        };

        match tokio::task::spawn_blocking(move || {
            let result = f(&mut source);
            (source, result)
        })
        .await
        {
            Ok((source, result)) => {
                self.source = Some(source);
                result
            }
            Err(e) => Err(Error::SourceUnavailable(e.to_string())),
        }
    }
}
