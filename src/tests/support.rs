//! Shared fixtures: in-memory ledgers, transaction builders and mock adapters.

use crate::{
    blockchain::adapter::{
        AdapterError, ChainWidePuller, InfoProvider, NetworkAdapter, PushSubscriber, ServiceAddressProvider,
    },
    config::{Config, SyncSettings},
    db::connection,
    models::{Cursor, CursorPath, NetworkInfo, NormalizedTx, TxType},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const NET: &str = "tezos";
pub const ALICE: &str = "tz1alice";
pub const BOB: &str = "tz1bob";
pub const CAROL: &str = "tz1carol";
pub const BAKER: &str = "tz1baker";

pub async fn pool() -> SqlitePool {
    connection::in_memory().await.expect("in-memory ledger")
}

pub fn settings(trusted: &[&str]) -> SyncSettings {
    SyncSettings {
        update_interval: Duration::from_millis(20),
        service_address_update_interval: Duration::from_secs(3600),
        exchange_resync_delay: Duration::from_secs(86_400),
        trusted_addresses: Arc::new(trusted.iter().map(|a| a.to_string()).collect()),
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        update_interval: Duration::from_millis(20),
        service_address_update_interval: Duration::from_secs(3600),
        exchange_resync_delay: Duration::from_secs(86_400),
        trusted_addresses: HashSet::new(),
        max_tx_count: 10_000,
        cache_ttl: Duration::from_secs(60),
        cache_max_capacity: 100,
        rpc_timeout_secs: 1,
        rpc_rate_limit: None,
        explorer_networks: Vec::new(),
    }
}

pub fn tx(hash: &str, date: i64, value: f64, from: &str, to: &str) -> NormalizedTx {
    NormalizedTx {
        hash: hash.to_string(),
        date,
        value,
        from: from.to_string(),
        from_alias: None,
        to: to.to_string(),
        fee: 0.0,
        tx_type: TxType::Supplement,
        original_op_type: "transaction".to_string(),
        comment: None,
        path: Some(CursorPath::new(format!("{{\"hash\":\"{}\"}}", hash))),
        is_cancelled: false,
        force_update: false,
        currency: None,
    }
}

pub fn typed(mut transaction: NormalizedTx, tx_type: TxType) -> NormalizedTx {
    transaction.tx_type = tx_type;
    transaction
}

pub async fn row_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await
        .expect("row count")
}

/// Makes every ledger insert abort until [`accept_inserts`] is called.
pub async fn reject_inserts(pool: &SqlitePool) {
    sqlx::raw_sql(
        "CREATE TRIGGER ledger_offline BEFORE INSERT ON transactions \
         BEGIN SELECT RAISE(ABORT, 'ledger offline'); END;",
    )
    .execute(pool)
    .await
    .expect("install insert trigger");
}

pub async fn accept_inserts(pool: &SqlitePool) {
    sqlx::raw_sql("DROP TRIGGER ledger_offline;")
        .execute(pool)
        .await
        .expect("drop insert trigger");
}

/// Makes every update of the address table abort.
pub async fn freeze_addresses(pool: &SqlitePool) {
    sqlx::raw_sql(
        "CREATE TRIGGER addresses_frozen BEFORE UPDATE ON addresses \
         BEGIN SELECT RAISE(ABORT, 'addresses frozen'); END;",
    )
    .execute(pool)
    .await
    .expect("install update trigger");
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Per-address pull network backed by an in-memory history.
pub struct MockPullAdapter {
    pub history: Mutex<Vec<NormalizedTx>>,
    pub overflowing: Mutex<HashSet<String>>,
    pub unreachable: Mutex<HashSet<String>>,
    pub seen_cursors: Mutex<Vec<(String, Vec<Cursor>)>>,
    pub roster: Option<Vec<String>>,
    pub roster_fetches: AtomicUsize,
    pub info: Option<NetworkInfo>,
    pub info_fetches: AtomicUsize,
}

impl MockPullAdapter {
    pub fn new(history: Vec<NormalizedTx>) -> Self {
        Self {
            history: Mutex::new(history),
            overflowing: Mutex::new(HashSet::new()),
            unreachable: Mutex::new(HashSet::new()),
            seen_cursors: Mutex::new(Vec::new()),
            roster: None,
            roster_fetches: AtomicUsize::new(0),
            info: None,
            info_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_roster(mut self, roster: &[&str]) -> Self {
        self.roster = Some(roster.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn with_info(mut self, info: NetworkInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn overflow(&self, address: &str) {
        self.overflowing.lock().unwrap().insert(address.to_string());
    }

    /// Fails every fetch for `address` with a transient upstream error.
    pub fn cut_off(&self, address: &str) {
        self.unreachable.lock().unwrap().insert(address.to_string());
    }

    pub fn synced_addresses(&self) -> Vec<String> {
        self.seen_cursors
            .lock()
            .unwrap()
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }
}

#[async_trait]
impl NetworkAdapter for MockPullAdapter {
    fn net(&self) -> &str {
        NET
    }

    fn currency(&self) -> &str {
        "XTZ"
    }

    fn validate_address(&self, address: &str) -> bool {
        address.starts_with("tz1") && address.len() > 3
    }

    async fn get_all_transactions(
        &self,
        address: &str,
        cursors: &[Cursor],
        service_addresses: &[String],
    ) -> Result<Vec<NormalizedTx>, AdapterError> {
        self.seen_cursors
            .lock()
            .unwrap()
            .push((address.to_string(), cursors.to_vec()));

        if self.unreachable.lock().unwrap().contains(address) {
            return Err(AdapterError::Upstream(format!("{} unreachable", address)));
        }

        if self.overflowing.lock().unwrap().contains(address) {
            return Err(AdapterError::TxLimitOverflow {
                address: address.to_string(),
                limit: 10,
            });
        }

        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.from == address || t.to == address)
            .cloned()
            .map(|mut t| {
                if service_addresses.contains(&t.from) {
                    t.tx_type = TxType::Payment;
                }
                t
            })
            .collect())
    }

    fn service_addresses(&self) -> Option<&dyn ServiceAddressProvider> {
        self.roster.as_ref().map(|_| self as &dyn ServiceAddressProvider)
    }

    fn info(&self) -> Option<&dyn InfoProvider> {
        self.info.as_ref().map(|_| self as &dyn InfoProvider)
    }
}

#[async_trait]
impl ServiceAddressProvider for MockPullAdapter {
    async fn get_service_addresses(&self) -> Result<Vec<String>, AdapterError> {
        self.roster_fetches.fetch_add(1, Ordering::SeqCst);
        self.roster
            .clone()
            .ok_or(AdapterError::Unsupported("getServiceAddresses"))
    }
}

#[async_trait]
impl InfoProvider for MockPullAdapter {
    async fn get_info(&self) -> Result<NetworkInfo, AdapterError> {
        self.info_fetches.fetch_add(1, Ordering::SeqCst);
        self.info.clone().ok_or(AdapterError::Unsupported("getInfo"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockCursor {
    pub height: usize,
}

/// Chain-wide network serving a fixed list of blocks, one per call.
pub struct MockChainAdapter {
    pub blocks: Vec<Vec<NormalizedTx>>,
    pub seen_cursors: Mutex<Vec<Option<Cursor>>>,
    pub fail_next: AtomicBool,
}

impl MockChainAdapter {
    /// Stamps every transaction with a cursor pointing at its block height.
    pub fn new(blocks: Vec<Vec<NormalizedTx>>) -> Self {
        let blocks = blocks
            .into_iter()
            .enumerate()
            .map(|(height, block)| {
                block
                    .into_iter()
                    .map(|mut t| {
                        t.path = Some(CursorPath::encode(&BlockCursor { height }).unwrap());
                        t
                    })
                    .collect()
            })
            .collect();

        Self {
            blocks,
            seen_cursors: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Fails the next block fetch with a transient upstream error.
    pub fn fail_once(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkAdapter for MockChainAdapter {
    fn net(&self) -> &str {
        "solana"
    }

    fn currency(&self) -> &str {
        "SOL"
    }

    fn validate_address(&self, address: &str) -> bool {
        !address.is_empty()
    }

    fn chain_wide(&self) -> Option<&dyn ChainWidePuller> {
        Some(self)
    }
}

#[async_trait]
impl ChainWidePuller for MockChainAdapter {
    async fn get_next_block(
        &self,
        cursor: Option<&Cursor>,
        _service_addresses: &[String],
    ) -> Result<Vec<NormalizedTx>, AdapterError> {
        self.seen_cursors.lock().unwrap().push(cursor.cloned());

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AdapterError::Upstream("rpc node timed out".to_string()));
        }

        let next = match cursor.and_then(|c| c.path.as_ref()) {
            Some(path) => {
                let position: BlockCursor = path
                    .decode()
                    .map_err(|e| AdapterError::InvalidCursor(e.to_string()))?;
                position.height + 1
            }
            None => 0,
        };

        self.blocks.get(next).cloned().ok_or(AdapterError::NoNewBlocks)
    }
}

/// Push network: every subscription is a channel the test feeds by hand.
pub struct MockPushAdapter {
    pub senders: Mutex<Vec<(String, mpsc::Sender<Vec<NormalizedTx>>)>>,
    pub subscribe_calls: AtomicUsize,
}

impl MockPushAdapter {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn sender_for(&self, address: &str) -> Option<mpsc::Sender<Vec<NormalizedTx>>> {
        self.senders
            .lock()
            .unwrap()
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, s)| s.clone())
    }

    /// Drops every sender the adapter holds for `address`, closing the subscription.
    pub fn close(&self, address: &str) {
        self.senders.lock().unwrap().retain(|(a, _)| a != address);
    }
}

#[async_trait]
impl NetworkAdapter for MockPushAdapter {
    fn net(&self) -> &str {
        "near"
    }

    fn currency(&self) -> &str {
        "NEAR"
    }

    fn validate_address(&self, address: &str) -> bool {
        !address.is_empty()
    }

    fn push(&self) -> Option<&dyn PushSubscriber> {
        Some(self)
    }
}

#[async_trait]
impl PushSubscriber for MockPushAdapter {
    async fn subscribe(&self, address: &str) -> Result<mpsc::Receiver<Vec<NormalizedTx>>, AdapterError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(8);
        self.senders.lock().unwrap().push((address.to_string(), sender));
        Ok(receiver)
    }
}
