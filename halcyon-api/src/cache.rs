//! Read-through cache for control-plane data, backed by Redis.
//!
//! Reads are keyed per resource with a TTL; successful mutations drop the
//! affected keys by prefix. Redis errors never fail a request: a broken cache
//! behaves like an empty one.

use std::future::Future;

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

pub mod keys {
    pub const SERVERS_PREFIX: &str = "vf:servers";
    pub const STATS_PREFIX: &str = "vf:stats";

    pub fn servers_page(page: i64, per_page: i64) -> String {
        format!("{SERVERS_PREFIX}:p{page}:n{per_page}")
    }

    pub fn user_servers(vf_user_id: u64) -> String {
        format!("{SERVERS_PREFIX}:user:{vf_user_id}")
    }

    pub fn server(server_id: u64) -> String {
        format!("vf:server:{server_id}")
    }

    pub fn hypervisors() -> String {
        format!("{STATS_PREFIX}:hypervisors")
    }

    pub fn ip_blocks() -> String {
        format!("{STATS_PREFIX}:ipblocks")
    }

    pub fn overview() -> String {
        format!("{STATS_PREFIX}:overview")
    }

    pub fn templates(package_id: i64) -> String {
        format!("vf:templates:{package_id}")
    }
}

#[derive(Clone)]
pub struct QueryCache {
    redis: redis::aio::ConnectionManager,
}

impl QueryCache {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    /// Returns the cached value for `key`, or runs `fetch`, stores its result
    /// for `ttl_secs` and returns it. Errors from `fetch` are not cached.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl_secs: u64, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut conn = self.redis.clone();

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(v) => return Ok(v),
                Err(e) => tracing::warn!(key, "Discarding undecodable cache entry: {e}"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key, "Cache read failed: {e}"),
        }

        let value = fetch().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await {
                    tracing::warn!(key, "Cache write failed: {e}");
                }
            }
            Err(e) => tracing::warn!(key, "Cache encode failed: {e}"),
        }
        Ok(value)
    }

    /// Deletes one exact key.
    pub async fn invalidate(&self, key: &str) {
        let mut conn = self.redis.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            tracing::warn!(key, "Cache delete failed: {e}");
        }
    }

    /// Deletes every key starting with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut conn = self.redis.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let page: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await;
            let (next, found) = match page {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(prefix, "Cache scan failed: {e}");
                    return;
                }
            };
            if !found.is_empty() {
                removed += found.len();
                if let Err(e) = conn.del::<_, ()>(found).await {
                    tracing::warn!(prefix, "Cache delete failed: {e}");
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix, removed, "Cache invalidated");
    }

    /// Everything a server mutation can change: listings, the server itself
    /// and the dashboard counters.
    pub async fn invalidate_server(&self, server_id: u64) {
        self.invalidate_prefix(keys::SERVERS_PREFIX).await;
        self.invalidate(&keys::server(server_id)).await;
        self.invalidate_prefix(keys::STATS_PREFIX).await;
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn test_server_keys_share_listing_prefix() {
        assert!(keys::servers_page(1, 25).starts_with(keys::SERVERS_PREFIX));
        assert!(keys::user_servers(7).starts_with(keys::SERVERS_PREFIX));
        assert_eq!(keys::servers_page(2, 50), "vf:servers:p2:n50");
    }

    #[test]
    fn test_single_server_key_outside_listing_prefix() {
        // "vf:server:1" must not be swept by a "vf:servers" prefix scan, and
        // is deleted exactly so server 1 does not take server 12 with it.
        assert_eq!(keys::server(1), "vf:server:1");
        assert!(!keys::server(1).starts_with(keys::SERVERS_PREFIX));
    }

    #[test]
    fn test_stats_keys() {
        for k in [keys::hypervisors(), keys::ip_blocks(), keys::overview()] {
            assert!(k.starts_with(keys::STATS_PREFIX));
        }
        assert!(!keys::templates(3).starts_with(keys::STATS_PREFIX));
    }
}
