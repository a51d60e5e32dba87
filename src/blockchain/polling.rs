use crate::blockchain::adapter::{AdapterError, NetworkAdapter};
use crate::blockchain::registry::{sync_mode, AdapterRegistry, SyncMode};
use crate::config::SyncSettings;
use crate::db::{address, cursor, transaction::{self, BatchScope, CommitSummary}};
use crate::models::now_millis;
use crate::state::AppState;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The batch was rolled back; it is fetched again on the next iteration.
    #[error("Batch commit failed: {0}")]
    Commit(sqlx::Error),
}

/// Result of one per-address pull iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The network has no address to sync.
    Idle,
    Synced { address: String, summary: CommitSummary },
    /// The adapter refused the history as too large; the address is now an exchange.
    ExchangeFlagged { address: String },
}

/// Drives one loop per network. Cloning is cheap; clones share the
/// subscription set and the shutdown token.
#[derive(Clone)]
pub struct SyncEngine {
    pool: SqlitePool,
    settings: SyncSettings,
    shutdown: CancellationToken,
    subscriptions: Arc<Mutex<HashSet<(String, String)>>>,
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl SyncEngine {
    pub fn new(pool: SqlitePool, settings: SyncSettings, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            settings,
            shutdown,
            subscriptions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Spawns one loop per registered network.
    pub fn start(&self, registry: &AdapterRegistry) -> Vec<JoinHandle<()>> {
        registry
            .adapters()
            .map(|adapter| {
                let engine = self.clone();
                let adapter = adapter.clone();
                tokio::spawn(async move { engine.run_network(adapter).await })
            })
            .collect()
    }

    /// Runs the driver matching the adapter's capabilities until shutdown.
    pub async fn run_network(&self, adapter: Arc<dyn NetworkAdapter>) {
        let mode = sync_mode(adapter.as_ref());
        info!("Starting {:?} sync for {}", mode, adapter.net());

        match mode {
            SyncMode::ChainWide => self.run_chain_wide(adapter.as_ref()).await,
            SyncMode::PerAddress => self.run_per_address(adapter.as_ref()).await,
            SyncMode::Push => self.run_push(adapter.as_ref()).await,
        }

        info!("Sync loop for {} stopped", adapter.net());
    }

    /// Sleeps unless shutdown is requested first. Returns `false` on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }

    pub(crate) fn backoff_for(&self, net: &str, err: &SyncError) -> Duration {
        match err {
            SyncError::Commit(e) => {
                error!("Commit failed for {}, backing off: {}", net, e);
                self.settings.update_interval * 2
            }
            e => {
                warn!("Sync iteration failed for {}: {}", net, e);
                self.settings.update_interval
            }
        }
    }

    async fn refresh_logged(&self, adapter: &dyn NetworkAdapter) {
        if let Err(e) = self.refresh_service_addresses(adapter).await {
            warn!("Failed to refresh service addresses for {}: {}", adapter.net(), e);
        }
    }

    async fn run_chain_wide(&self, adapter: &dyn NetworkAdapter) {
        let net = adapter.net();
        while !self.shutdown.is_cancelled() {
            self.refresh_logged(adapter).await;

            let delay = match self.chain_wide_iteration(adapter).await {
                Ok(0) => Some(self.settings.update_interval),
                Ok(written) => {
                    debug!("Committed {} chain-wide rows for {}", written, net);
                    None
                }
                Err(e) => Some(self.backoff_for(net, &e)),
            };

            if let Some(delay) = delay {
                if !self.pause(delay).await {
                    break;
                }
            }
        }
    }

    async fn run_per_address(&self, adapter: &dyn NetworkAdapter) {
        let net = adapter.net();
        while !self.shutdown.is_cancelled() {
            self.refresh_logged(adapter).await;

            let delay = match self.per_address_iteration(adapter).await {
                Ok(PassOutcome::Synced { address, summary }) => {
                    debug!("Synced {} on {}: {:?}", address, net, summary);
                    self.settings.update_interval
                }
                Ok(_) => self.settings.update_interval,
                Err(e) => self.backoff_for(net, &e),
            };

            if !self.pause(delay).await {
                break;
            }
        }
    }

    async fn run_push(&self, adapter: &dyn NetworkAdapter) {
        let net = adapter.net();
        while !self.shutdown.is_cancelled() {
            self.refresh_logged(adapter).await;

            let delay = match self.subscribe_pass(adapter).await {
                Ok(0) => self.settings.update_interval,
                Ok(added) => {
                    info!("Opened {} new subscriptions on {}", added, net);
                    self.settings.update_interval
                }
                Err(e) => self.backoff_for(net, &e),
            };

            if !self.pause(delay).await {
                break;
            }
        }
    }

    /// One chain-wide step: resume from the newest network row, fetch the
    /// next block and commit it. Returns the number of rows written; `0` means
    /// the chain has not advanced (nothing returned, or only rows already stored).
    pub async fn chain_wide_iteration(&self, adapter: &dyn NetworkAdapter) -> Result<usize, SyncError> {
        let puller = adapter
            .chain_wide()
            .ok_or(AdapterError::Unsupported("getNextBlock"))?;
        let net = adapter.net();

        let position = cursor::resolve_network(&self.pool, net).await?;
        let service = address::service_addresses(&self.pool, net).await?;

        let batch = match puller.get_next_block(position.as_ref(), &service).await {
            Ok(batch) => batch,
            Err(AdapterError::NoNewBlocks) => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let summary = transaction::commit_batch(
            &self.pool,
            net,
            BatchScope::Network,
            &batch,
            &self.settings.trusted_addresses,
        )
        .await
        .map_err(SyncError::Commit)?;

        Ok(summary.inserted + summary.updated)
    }

    /// One round-robin step: lease the stalest address, pull past its cursors, commit.
    pub async fn per_address_iteration(&self, adapter: &dyn NetworkAdapter) -> Result<PassOutcome, SyncError> {
        let net = adapter.net();
        let exchange_delay = millis(self.settings.exchange_resync_delay);

        let Some(target) = address::next_stale(&self.pool, net, exchange_delay).await? else {
            return Ok(PassOutcome::Idle);
        };

        // Lease: the next iteration picks someone else even if this one fails.
        address::touch(&self.pool, target.id, now_millis()).await?;

        let cursors = cursor::resolve_address(&self.pool, target.id).await?;
        let service = address::service_addresses(&self.pool, net).await?;

        match adapter.get_all_transactions(&target.address, &cursors, &service).await {
            Ok(batch) => {
                let summary = transaction::commit_batch(
                    &self.pool,
                    net,
                    BatchScope::Address(target.id),
                    &batch,
                    &self.settings.trusted_addresses,
                )
                .await
                .map_err(SyncError::Commit)?;

                Ok(PassOutcome::Synced { address: target.address, summary })
            }
            Err(AdapterError::TxLimitOverflow { limit, .. }) => {
                address::mark_exchange(&self.pool, target.id).await?;
                warn!(
                    "{} on {} exceeds {} transactions, classified as exchange",
                    target.address, net, limit
                );
                Ok(PassOutcome::ExchangeFlagged { address: target.address })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a subscription for every trackable address of the network that
    /// does not have one yet. Returns how many were opened.
    pub async fn subscribe_pass(&self, adapter: &dyn NetworkAdapter) -> Result<usize, SyncError> {
        let subscriber = adapter.push().ok_or(AdapterError::Unsupported("subscribe"))?;
        let net = adapter.net();
        let mut opened = 0;

        for target in address::trackable_for_net(&self.pool, net).await? {
            let key = (net.to_string(), target.address.clone());
            if !self.subscriptions.lock().await.insert(key.clone()) {
                continue;
            }

            let mut batches = match subscriber.subscribe(&target.address).await {
                Ok(batches) => batches,
                Err(e) => {
                    warn!("Failed to subscribe to {} on {}: {}", target.address, net, e);
                    self.subscriptions.lock().await.remove(&key);
                    continue;
                }
            };
            address::touch(&self.pool, target.id, now_millis()).await?;
            opened += 1;

            let pool = self.pool.clone();
            let trusted = self.settings.trusted_addresses.clone();
            let retry_delay = self.settings.update_interval * 2;
            let shutdown = self.shutdown.clone();
            let subscriptions = self.subscriptions.clone();
            let net = net.to_string();
            tokio::spawn(async move {
                'feed: loop {
                    let batch = tokio::select! {
                        batch = batches.recv() => batch,
                        _ = shutdown.cancelled() => None,
                    };
                    let Some(batch) = batch else { break };

                    // Held until committed; the next batch waits behind it.
                    while let Err(e) = transaction::commit_batch(
                        &pool,
                        &net,
                        BatchScope::Address(target.id),
                        &batch,
                        &trusted,
                    )
                    .await
                    {
                        error!(
                            "Commit of pushed batch for {} on {} failed, retrying in {:?}: {}",
                            target.address, net, retry_delay, e
                        );
                        tokio::select! {
                            _ = sleep(retry_delay) => {}
                            _ = shutdown.cancelled() => break 'feed,
                        }
                    }
                }

                debug!("Subscription for {} on {} closed", target.address, net);
                subscriptions.lock().await.remove(&key);
            });
        }

        Ok(opened)
    }

    pub async fn is_subscribed(&self, net: &str, address: &str) -> bool {
        self.subscriptions
            .lock()
            .await
            .contains(&(net.to_string(), address.to_string()))
    }

    /// Refetches the service-address roster when it is empty or older than the
    /// configured interval. Returns whether a refresh happened.
    pub async fn refresh_service_addresses(&self, adapter: &dyn NetworkAdapter) -> Result<bool, SyncError> {
        let Some(provider) = adapter.service_addresses() else {
            return Ok(false);
        };
        let net = adapter.net();
        let now = now_millis();

        if let Some(latest) = address::latest_service_update(&self.pool, net).await? {
            if now - latest < millis(self.settings.service_address_update_interval) {
                return Ok(false);
            }
        }

        let roster = provider.get_service_addresses().await?;
        let count = address::upsert_service_addresses(&self.pool, net, adapter.currency(), &roster, now).await?;
        info!("Refreshed {} service addresses for {}", count, net);
        Ok(true)
    }
}

/// Starts every network loop and waits for all of them to stop.
pub async fn start_polling(state: Arc<AppState>, shutdown: CancellationToken) {
    info!("Starting synchronization engine for {} networks", state.registry.len());

    let engine = SyncEngine::new(state.db_pool.clone(), state.config.sync_settings(), shutdown);
    let handles = engine.start(&state.registry);

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Sync loop panicked: {}", e);
        }
    }
}
