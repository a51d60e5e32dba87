//! Read-through cache for per-network market info.

use std::time::Duration;
use moka::future::Cache;
use tracing::debug;
use crate::blockchain::adapter::{AdapterError, InfoProvider};
use crate::config::Config;
use crate::models::NetworkInfo;

#[derive(Clone)]
pub struct InfoCache {
    cache: Cache<String, NetworkInfo>,
}

impl InfoCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_max_capacity, config.cache_ttl)
    }

    /// Returns the cached info for `net`, asking `provider` on a miss.
    /// Failed lookups are not cached.
    pub async fn get_or_fetch(&self, net: &str, provider: &dyn InfoProvider) -> Result<NetworkInfo, AdapterError> {
        if let Some(info) = self.cache.get(net).await {
            debug!("Info cache hit for {}", net);
            return Ok(info);
        }

        debug!("Info cache miss for {}", net);
        let info = provider.get_info().await?;
        self.cache.insert(net.to_string(), info.clone()).await;
        Ok(info)
    }
}
