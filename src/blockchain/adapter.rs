//! The network adapter contract the synchronization engine consumes.
//!
//! Every network implements [`NetworkAdapter`]. Optional behaviour is exposed
//! through capability accessors rather than a type hierarchy: the engine asks
//! `chain_wide()`, `push()`, ... and picks its driver from the answers.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use crate::models::{Cursor, NetworkInfo, NormalizedTx, PreparedTransaction, TransferRequest};

#[derive(Error, Debug)]
pub enum AdapterError {
    /// The address history is larger than the adapter is willing to enumerate.
    #[error("Transaction count limit {limit} exceeded for {address}")]
    TxLimitOverflow { address: String, limit: u64 },

    /// Chain-wide pull found nothing past the cursor yet.
    #[error("No new blocks available")]
    NoNewBlocks,

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl AdapterError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            AdapterError::Upstream(_) | AdapterError::NoNewBlocks => true,
            _ => false,
        }
    }
}

/// Core capability set every network provides.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// Network identifier rows are filed under.
    fn net(&self) -> &str;

    /// Currency ticker recorded on addresses of this network.
    fn currency(&self) -> &str;

    fn validate_address(&self, address: &str) -> bool;

    /// Per-address pull: everything past `cursors` for `address`.
    async fn get_all_transactions(
        &self,
        _address: &str,
        _cursors: &[Cursor],
        _service_addresses: &[String],
    ) -> Result<Vec<NormalizedTx>, AdapterError> {
        Err(AdapterError::Unsupported("getAllTransactions"))
    }

    fn chain_wide(&self) -> Option<&dyn ChainWidePuller> {
        None
    }

    fn push(&self) -> Option<&dyn PushSubscriber> {
        None
    }

    fn service_addresses(&self) -> Option<&dyn ServiceAddressProvider> {
        None
    }

    fn info(&self) -> Option<&dyn InfoProvider> {
        None
    }

    fn preparer(&self) -> Option<&dyn TransactionPreparer> {
        None
    }
}

/// Full-chain scan, one block (or block range) per call.
#[async_trait]
pub trait ChainWidePuller: Send + Sync {
    /// Returns the transactions after `cursor`. Must fail with
    /// [`AdapterError::NoNewBlocks`] instead of waiting when the chain has not advanced.
    async fn get_next_block(
        &self,
        cursor: Option<&Cursor>,
        service_addresses: &[String],
    ) -> Result<Vec<NormalizedTx>, AdapterError>;
}

/// Push mode. Every message on the returned channel is one closed batch;
/// the adapter owns coalescing (see `batch_manager::debounce`). Dropping the
/// sender ends the subscription.
#[async_trait]
pub trait PushSubscriber: Send + Sync {
    async fn subscribe(&self, address: &str) -> Result<mpsc::Receiver<Vec<NormalizedTx>>, AdapterError>;
}

#[async_trait]
pub trait ServiceAddressProvider: Send + Sync {
    async fn get_service_addresses(&self) -> Result<Vec<String>, AdapterError>;
}

#[async_trait]
pub trait InfoProvider: Send + Sync {
    async fn get_info(&self) -> Result<NetworkInfo, AdapterError>;

    /// Governance/voting snapshot, adapter-defined shape.
    async fn get_voting(&self) -> Result<serde_json::Value, AdapterError> {
        Err(AdapterError::Unsupported("getVoting"))
    }
}

/// Unsigned transaction building and relaying of externally signed payloads.
#[async_trait]
pub trait TransactionPreparer: Send + Sync {
    async fn prepare_transaction(&self, request: &TransferRequest) -> Result<PreparedTransaction, AdapterError>;

    /// Broadcasts a signed payload and returns the transaction hash.
    async fn send_transaction(&self, signed_payload: &str) -> Result<String, AdapterError>;
}
