// Configuration for:
// - Database connection string
// - Server listening address/port
// - Sync intervals (per-iteration sleep, service roster refresh, exchange penalty)
// - Trusted payment sources
// - Cache settings (size, TTL)
// - Explorer-backed networks

use dotenv::dotenv;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub update_interval: Duration,
    pub service_address_update_interval: Duration,
    pub exchange_resync_delay: Duration,
    pub trusted_addresses: HashSet<String>,
    pub max_tx_count: u64,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub rpc_timeout_secs: u64,
    pub rpc_rate_limit: Option<u32>,
    pub explorer_networks: Vec<ExplorerNetworkConfig>,
}

/// How an explorer network spells its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressEncoding {
    Base58,
    Hex,
    #[default]
    Any,
}

/// One entry of the `EXPLORER_NETWORKS` JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerNetworkConfig {
    pub net: String,
    pub currency: String,
    pub base_url: String,
    #[serde(default = "default_op_types")]
    pub op_types: Vec<String>,
    #[serde(default)]
    pub address_encoding: AddressEncoding,
    #[serde(default)]
    pub address_prefixes: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub max_tx_count: Option<u64>,
    pub service_addresses_url: Option<String>,
    pub info_url: Option<String>,
}

fn default_op_types() -> Vec<String> {
    vec!["transaction".to_string()]
}

fn default_page_size() -> u64 {
    100
}

/// The part of the configuration the synchronization engine needs.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub update_interval: Duration,
    pub service_address_update_interval: Duration,
    pub exchange_resync_delay: Duration,
    pub trusted_addresses: Arc<HashSet<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:ledger.db".to_string());
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);
        let update_interval = secs_var("UPDATE_INTERVAL_SECS", 10);
        let service_address_update_interval = secs_var("SERVICE_ADDRESS_UPDATE_INTERVAL_SECS", 3600);
        let exchange_resync_delay = secs_var("EXCHANGE_RESYNC_DELAY_SECS", 86_400);
        let trusted_addresses = env::var("TRUSTED_ADDRESSES")
            .map(|v| parse_address_list(&v))
            .unwrap_or_default();
        let max_tx_count = env::var("MAX_TX_COUNT")
            .map(|v| v.parse().unwrap_or(10_000))
            .unwrap_or(10_000);
        let cache_ttl = secs_var("CACHE_TTL", 60);
        let cache_max_capacity = env::var("CACHE_MAX_CAPACITY")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);
        let rpc_timeout_secs = env::var("RPC_TIMEOUT_SECS")
            .map(|v| v.parse().unwrap_or(30))
            .unwrap_or(30);
        let rpc_rate_limit = env::var("RPC_RATE_LIMIT")
            .map(|v| v.parse().ok())
            .unwrap_or(None);
        let explorer_networks = match env::var("EXPLORER_NETWORKS") {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed EXPLORER_NETWORKS: {}", e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        Self {
            database_url,
            server_host,
            server_port,
            update_interval,
            service_address_update_interval,
            exchange_resync_delay,
            trusted_addresses,
            max_tx_count,
            cache_ttl,
            cache_max_capacity,
            rpc_timeout_secs,
            rpc_rate_limit,
            explorer_networks,
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            update_interval: self.update_interval,
            service_address_update_interval: self.service_address_update_interval,
            exchange_resync_delay: self.exchange_resync_delay,
            trusted_addresses: Arc::new(self.trusted_addresses.clone()),
        }
    }
}

fn secs_var(name: &str, default: u64) -> Duration {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}

pub fn parse_address_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
