//! Liveness registry configuration

use std::time::Duration;

use crate::protocol::constants::DEFAULT_RECEIVER_TTL;

/// Liveness registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Silence allowed before a receiver is evicted
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_RECEIVER_TTL,
        }
    }
}

impl RegistryConfig {
    /// Set the receiver time-to-live
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl() {
        assert_eq!(RegistryConfig::default().ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_ttl() {
        let config = RegistryConfig::default().ttl(Duration::from_secs(3));
        assert_eq!(config.ttl, Duration::from_secs(3));
    }
}
