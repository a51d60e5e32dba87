// Ledger rows, the normalized transaction shape adapters produce, cursors,
// and the API-facing aggregate shapes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub id: i64,
    pub address: String,
    pub net: String,
    pub currency: String,
    pub is_service: bool,
    pub is_exchange: bool,
    pub created: i64,
    pub updated: Option<i64>,
    #[sqlx(skip)]
    pub user_ids: Vec<String>,
}

/// Fixed vocabulary of ledger transaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    #[default]
    Supplement,
    Conclusion,
    Delegation,
    Payment,
    ApprovedPayment,
    Origination,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Supplement => "supplement",
            TxType::Conclusion => "conclusion",
            TxType::Delegation => "delegation",
            TxType::Payment => "payment",
            TxType::ApprovedPayment => "approved_payment",
            TxType::Origination => "origination",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown transaction type: {0}")]
pub struct UnknownTxType(pub String);

impl FromStr for TxType {
    type Err = UnknownTxType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supplement" => Ok(TxType::Supplement),
            "conclusion" => Ok(TxType::Conclusion),
            "delegation" => Ok(TxType::Delegation),
            "payment" => Ok(TxType::Payment),
            "approved_payment" => Ok(TxType::ApprovedPayment),
            "origination" => Ok(TxType::Origination),
            other => Err(UnknownTxType(other.to_string())),
        }
    }
}

/// Adapter-owned resume position, stored verbatim in `transactions.path`.
///
/// The engine only moves these around. Adapters keep a typed cursor struct of
/// their own and go through [`CursorPath::encode`] / [`CursorPath::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CursorPath(String);

impl CursorPath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn encode<T: Serialize>(cursor: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(cursor).map(Self)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

/// A transaction as produced by a network adapter, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTx {
    pub hash: String,
    /// Epoch milliseconds.
    pub date: i64,
    pub value: f64,
    pub from: String,
    #[serde(default)]
    pub from_alias: Option<String>,
    pub to: String,
    #[serde(default)]
    pub fee: f64,
    #[serde(rename = "type", default)]
    pub tx_type: TxType,
    pub original_op_type: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub path: Option<CursorPath>,
    #[serde(default)]
    pub is_cancelled: bool,
    /// Merge into an existing row with the same key instead of skipping it.
    #[serde(default)]
    pub force_update: bool,
    /// Asset moved by this row when it differs from the network's own.
    /// Chain-wide rows are keyed by `(hash, currency)`.
    #[serde(default)]
    pub currency: Option<String>,
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub address_id: Option<i64>,
    pub net: String,
    pub currency: String,
    pub hash: String,
    pub date: i64,
    pub value: f64,
    pub from: String,
    pub from_alias: Option<String>,
    pub to: String,
    pub fee: f64,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub original_op_type: String,
    pub comment: Option<String>,
    pub path: Option<CursorPath>,
    pub is_cancelled: bool,
}

/// The most recent row for one operation type, handed back to an adapter to resume from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub original_op_type: String,
    pub path: Option<CursorPath>,
    #[serde(rename = "type")]
    pub tx_type: TxType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub price_usd: f64,
    pub price_btc: f64,
    pub price_usd_delta24: f64,
    pub price_btc_delta24: f64,
    #[serde(rename = "yield")]
    pub yield_rate: f64,
    pub market_cap: f64,
    pub circulating_supply: f64,
    pub staking_rate: f64,
    pub unbonding_period: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub value: f64,
    #[serde(default)]
    pub fee: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    /// Unsigned payload, adapter-specific encoding.
    pub payload: String,
    pub fee: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub date: i64,
    pub value: f64,
    pub interpolated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub net: String,
    pub bucket_width: i64,
    pub points: Vec<ChartPoint>,
}

/// Current wall-clock time in epoch milliseconds, the unit of every ledger timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
