//! Connection pool configuration for the shared HTTP client.
//!
//! The HTTP client is shared (connection-pooled) by all workers. reqwest
//! doesn't expose runtime pool occupancy, so this module only owns the
//! tuning knobs applied at client construction time.

use std::time::Duration;

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections to keep per host.
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup.
    pub idle_timeout: Duration,

    /// TCP keepalive duration.
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 128,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    /// Apply this configuration to a reqwest ClientBuilder.
    pub fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder
    }
}
