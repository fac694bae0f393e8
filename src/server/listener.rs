//! Server orchestration
//!
//! Binds the control listener and the video socket, then runs the accept
//! loop, the handshake listener and the video distributor until the
//! shutdown token fires. On shutdown it waits (bounded by the grace
//! period) for its tasks and writes the announcement list back to the
//! store.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::config::ServerConfig;
use super::handshake::HandshakeListener;
use super::hub::BroadcastHub;
use super::session::ControlSession;
use super::video::VideoDistributor;
use crate::error::{Error, Result};
use crate::media::FrameSource;
use crate::registry::{LivenessRegistry, RegistryConfig};

/// Announcement/chat and video server
pub struct VidcastServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    registry: Arc<LivenessRegistry>,
    control_listener: TcpListener,
    video_socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl VidcastServer {
    /// Bind both listeners
    ///
    /// A bind failure cancels `shutdown` and returns [`Error::Bind`].
    pub async fn bind(
        config: ServerConfig,
        hub: Arc<BroadcastHub>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        Self::bind_with_registry(config, RegistryConfig::default(), hub, shutdown).await
    }

    /// Bind both listeners with a custom registry configuration
    pub async fn bind_with_registry(
        config: ServerConfig,
        registry_config: RegistryConfig,
        hub: Arc<BroadcastHub>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let control_listener = match TcpListener::bind(config.control_addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(bind_failed(config.control_addr, source, &shutdown)),
        };
        let video_socket = match UdpSocket::bind(config.video_addr).await {
            Ok(socket) => socket,
            Err(source) => return Err(bind_failed(config.video_addr, source, &shutdown)),
        };

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            hub,
            registry: Arc::new(LivenessRegistry::with_config(registry_config)),
            control_listener,
            video_socket: Arc::new(video_socket),
            shutdown,
            tracker: TaskTracker::new(),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Bound control address (useful when binding port 0)
    pub fn control_addr(&self) -> Result<SocketAddr> {
        Ok(self.control_listener.local_addr()?)
    }

    /// Bound video/handshake address
    pub fn video_addr(&self) -> Result<SocketAddr> {
        Ok(self.video_socket.local_addr()?)
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<LivenessRegistry> {
        &self.registry
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token fires
    ///
    /// Without a frame source the server runs control and handshake only.
    pub async fn run(self, source: Option<Box<dyn FrameSource>>) -> Result<()> {
        tracing::info!(
            control = %self.control_addr()?,
            video = %self.video_addr()?,
            "Server listening"
        );

        self.tracker.spawn(
            HandshakeListener::new(Arc::clone(&self.video_socket), Arc::clone(&self.registry))
                .run(self.shutdown.clone()),
        );

        match source {
            Some(source) => {
                let distributor = VideoDistributor::new(
                    Arc::clone(&self.video_socket),
                    Arc::clone(&self.registry),
                    source,
                    &self.config,
                );
                let shutdown = self.shutdown.clone();
                self.tracker.spawn(async move {
                    distributor.run(shutdown).await;
                });
            }
            None => tracing::info!("No frame source, video distribution disabled"),
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop() => {}
        }

        self.finish().await;
        Ok(())
    }

    /// Run until `signal` resolves, then shut down
    pub async fn run_until<F>(self, source: Option<Box<dyn FrameSource>>, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let trigger = tokio::spawn(async move {
            signal.await;
            shutdown.cancel();
        });

        let result = self.run(source).await;
        trigger.abort();
        result
    }

    async fn accept_loop(&self) {
        loop {
            match self.control_listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let session = ControlSession::new(
            session_id,
            socket,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.hub),
            &self.shutdown,
        );

        self.tracker.spawn(async move {
            let _permit = permit;
            if let Err(e) = session.run().await {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
            }
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    async fn finish(self) {
        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Tasks still running after shutdown grace period"
            );
        }

        if let Err(e) = self.hub.flush().await {
            tracing::error!(error = %e, "Failed to save announcements on shutdown");
        }
        tracing::info!("Server stopped");
    }
}

fn bind_failed(addr: SocketAddr, source: std::io::Error, shutdown: &CancellationToken) -> Error {
    tracing::error!(addr = %addr, error = %source, "Failed to bind listener");
    shutdown.cancel();
    Error::Bind { addr, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::auth::PrivilegedAddress;
    use crate::store::MemoryStore;

    fn hub() -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PrivilegedAddress("127.0.0.1".parse().unwrap())),
        ))
    }

    fn loopback_config() -> ServerConfig {
        ServerConfig::default()
            .control_addr("127.0.0.1:0".parse().unwrap())
            .video_addr("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_bind_failure_cancels_shutdown() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = loopback_config().control_addr(taken.local_addr().unwrap());
        let shutdown = CancellationToken::new();

        let result = VidcastServer::bind(config, hub(), shutdown.clone()).await;

        assert!(matches!(result, Err(Error::Bind { .. })));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_until_flushes_store() {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(BroadcastHub::new(
            store.clone(),
            Arc::new(PrivilegedAddress("127.0.0.1".parse().unwrap())),
        ));
        hub.create_announcement(&"127.0.0.1:1".parse().unwrap(), "persist me")
            .await;
        crate::store::AnnouncementStore::replace(store.as_ref(), &[]).unwrap();

        let server = VidcastServer::bind(loopback_config(), hub, CancellationToken::new())
            .await
            .unwrap();
        server
            .run_until(None, async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            })
            .await
            .unwrap();

        let saved = crate::store::AnnouncementStore::load(store.as_ref()).unwrap();
        assert_eq!(saved[0].message, "persist me");
    }
}
