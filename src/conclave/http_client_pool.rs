//! HTTP client pool for completion endpoints.
//!
//! Every base URL gets one shared `reqwest::Client`, so repeated completion
//! calls from many agents reuse the same connection pool instead of paying
//! for DNS lookups and TLS handshakes on every request.

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::time::Duration;

lazy_static! {
    /// Global cache of HTTP clients indexed by base URL.
    static ref CLIENT_POOL: DashMap<String, reqwest::Client> = DashMap::new();
}

/// Creates or retrieves the shared HTTP client for `base_url`.
///
/// The returned value is a cheap clone sharing the underlying pool.
pub fn get_or_create_client(base_url: &str) -> reqwest::Client {
    CLIENT_POOL
        .entry(base_url.to_string())
        .or_insert_with(create_pooled_client)
        .clone()
}

/// Builds a client tuned for long-lived completion traffic.
///
/// - `pool_max_idle_per_host(32)`: one session rarely needs more sockets than agents
/// - `pool_idle_timeout(90s)`
/// - `tcp_keepalive(60s)`
/// - `connect_timeout(30s)`: only bounds connection setup, completions may stream for minutes
fn create_pooled_client() -> reqwest::Client {
    match reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .connect_timeout(Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            log::warn!(
                "conclave::http_client_pool: falling back to default client: {}",
                err
            );
            reqwest::Client::new()
        }
    }
}
