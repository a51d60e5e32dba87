use std::collections::BTreeMap;
use std::sync::Arc;
use serde::Serialize;
use tracing::info;
use crate::blockchain::adapter::NetworkAdapter;

/// Which driver the engine runs for a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    ChainWide,
    Push,
    PerAddress,
}

/// Capability probing: chain-wide pull wins over push, push over per-address pull.
pub fn sync_mode(adapter: &dyn NetworkAdapter) -> SyncMode {
    if adapter.chain_wide().is_some() {
        SyncMode::ChainWide
    } else if adapter.push().is_some() {
        SyncMode::Push
    } else {
        SyncMode::PerAddress
    }
}

/// Network adapters keyed by network id. Built once at startup and shared by
/// the engine and the API layer.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn NetworkAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own `net()`, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn NetworkAdapter>) {
        let net = adapter.net().to_string();
        info!("Registered adapter for {} ({:?})", net, sync_mode(adapter.as_ref()));
        self.adapters.insert(net, adapter);
    }

    pub fn get(&self, net: &str) -> Option<Arc<dyn NetworkAdapter>> {
        self.adapters.get(net).cloned()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn NetworkAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
