//! Shared keep-alive HTTP client construction.

use crate::connection_pool::PoolConfig;
use tracing::info;

/// Builds the single `reqwest::Client` shared by the scheduler's worker pool.
///
/// All workers issue requests through this one client so TCP/TLS connections
/// are reused across requests — the client is shared (connection-pooled) by
/// all workers.
pub fn build_client(pool_config: &PoolConfig) -> Result<reqwest::Client, reqwest::Error> {
    let builder = pool_config.apply_to_builder(reqwest::Client::builder());
    let client = builder.build()?;
    info!(
        max_idle_per_host = pool_config.max_idle_per_host,
        idle_timeout_s = pool_config.idle_timeout.as_secs(),
        "built shared HTTP client"
    );
    Ok(client)
}
