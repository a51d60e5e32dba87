pub mod adapter;
pub mod batch_manager;
pub mod client;
pub mod polling;
pub mod registry;

// Re-exports for convenience
pub use adapter::{AdapterError, NetworkAdapter};
pub use client::ExplorerAdapter;
pub use polling::{start_polling, SyncEngine};
pub use registry::{sync_mode, AdapterRegistry, SyncMode};

use std::sync::Arc;
use std::time::Duration;
use crate::config::Config;

/// Builds the registry of every network configured through `EXPLORER_NETWORKS`.
pub fn registry_from_config(config: &Config) -> Result<AdapterRegistry, AdapterError> {
    let mut registry = AdapterRegistry::new();

    for network in &config.explorer_networks {
        let adapter = ExplorerAdapter::new(
            network.clone(),
            Duration::from_secs(config.rpc_timeout_secs),
            config.rpc_rate_limit,
            config.max_tx_count,
        )?;
        registry.register(Arc::new(adapter));
    }

    Ok(registry)
}
