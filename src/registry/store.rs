//! Liveness registry implementation

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::config::RegistryConfig;
use super::entry::Registration;

/// Receivers that have said hello within the TTL
pub struct LivenessRegistry {
    receivers: Mutex<HashMap<SocketAddr, Registration>>,
    config: RegistryConfig,
}

impl LivenessRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            receivers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Record a hello from `addr`
    ///
    /// Returns `true` if the address was not registered before.
    pub async fn touch(&self, addr: SocketAddr) -> bool {
        let now = Instant::now();
        let mut receivers = self.receivers.lock().await;

        match receivers.get_mut(&addr) {
            Some(registration) => {
                registration.refresh(now);
                false
            }
            None => {
                receivers.insert(addr, Registration::new(addr, now));
                tracing::info!(receiver = %addr, "Receiver registered");
                true
            }
        }
    }

    /// Remove entries silent for longer than the TTL
    ///
    /// Returns the evicted addresses.
    pub async fn prune(&self) -> Vec<SocketAddr> {
        let mut receivers = self.receivers.lock().await;
        self.prune_locked(&mut receivers, Instant::now())
    }

    /// Prune, then copy the live addresses
    pub async fn snapshot(&self) -> Vec<SocketAddr> {
        let mut receivers = self.receivers.lock().await;
        self.prune_locked(&mut receivers, Instant::now());
        receivers.keys().copied().collect()
    }

    /// Details for one receiver
    pub async fn get(&self, addr: &SocketAddr) -> Option<Registration> {
        self.receivers.lock().await.get(addr).cloned()
    }

    pub async fn contains(&self, addr: &SocketAddr) -> bool {
        self.receivers.lock().await.contains_key(addr)
    }

    /// Number of registered receivers, expired or not
    pub async fn len(&self) -> usize {
        self.receivers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.receivers.lock().await.is_empty()
    }

    fn prune_locked(
        &self,
        receivers: &mut HashMap<SocketAddr, Registration>,
        now: Instant,
    ) -> Vec<SocketAddr> {
        let expired: Vec<SocketAddr> = receivers
            .values()
            .filter(|r| r.is_expired(now, self.config.ttl))
            .map(|r| r.addr)
            .collect();

        for addr in &expired {
            receivers.remove(addr);
            tracing::info!(receiver = %addr, "Removed inactive receiver");
        }

        expired
    }
}

impl Default for LivenessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
