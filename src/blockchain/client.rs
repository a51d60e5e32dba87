use crate::blockchain::adapter::{AdapterError, InfoProvider, NetworkAdapter, ServiceAddressProvider};
use crate::config::{AddressEncoding, ExplorerNetworkConfig};
use crate::models::{Cursor, CursorPath, NetworkInfo, NormalizedTx, TxType};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resume position of one operation type: the offset of the last stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCursor {
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerOperation {
    hash: String,
    /// Epoch milliseconds.
    timestamp: i64,
    #[serde(default)]
    amount: f64,
    sender: String,
    #[serde(default)]
    sender_alias: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    fee: f64,
    #[serde(default)]
    status: Option<String>,
}

/// Per-address pull adapter for explorers exposing
/// `GET {base}/accounts/{address}/operations?type=&offset=&limit=` in ascending order.
pub struct ExplorerAdapter {
    config: ExplorerNetworkConfig,
    http: Client,
    limiter: Option<DefaultDirectRateLimiter>,
    max_tx_count: u64,
}

impl ExplorerAdapter {
    pub fn new(
        config: ExplorerNetworkConfig,
        timeout: Duration,
        rate_limit: Option<u32>,
        default_max_tx_count: u64,
    ) -> Result<Self, AdapterError> {
        info!("Initializing explorer adapter for {} at {}", config.net, config.base_url);

        let http = Client::builder().timeout(timeout).build()?;
        let limiter = rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));
        let max_tx_count = config.max_tx_count.unwrap_or(default_max_tx_count);

        Ok(Self {
            config,
            http,
            limiter,
            max_tx_count,
        })
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, url: &str, query: &[(&str, String)]) -> Result<T, AdapterError> {
        let http = &self.http;
        let limiter = &self.limiter;

        let fetch = move || async move {
            if let Some(limiter) = limiter {
                limiter.until_ready().await;
            }
            let response = http.get(url).query(query).send().await?.error_for_status()?;
            Ok::<T, AdapterError>(response.json::<T>().await?)
        };

        fetch
            .retry(ExponentialBuilder::default().with_max_times(3))
            .when(AdapterError::is_transient)
            .notify(|err: &AdapterError, delay: Duration| {
                warn!("Retrying {} in {:?}: {}", url, delay, err);
            })
            .await
    }

    fn start_offset(cursors: &[Cursor], op_type: &str) -> Result<u64, AdapterError> {
        let Some(path) = cursors
            .iter()
            .find(|c| c.original_op_type == op_type)
            .and_then(|c| c.path.as_ref())
        else {
            return Ok(0);
        };

        path.decode::<OffsetCursor>()
            .map(|c| c.offset)
            .map_err(|e| AdapterError::InvalidCursor(format!("{}: {}", path.as_str(), e)))
    }

    fn normalize(
        &self,
        op: ExplorerOperation,
        op_type: &str,
        position: u64,
        service_addresses: &[String],
    ) -> Result<NormalizedTx, AdapterError> {
        let tx_type = match op_type {
            "delegation" => TxType::Delegation,
            "origination" => TxType::Origination,
            _ if service_addresses.iter().any(|s| *s == op.sender) => TxType::Payment,
            _ => TxType::Supplement,
        };
        let path = CursorPath::encode(&OffsetCursor { offset: position })
            .map_err(|e| AdapterError::Decode(e.to_string()))?;

        Ok(NormalizedTx {
            hash: op.hash,
            date: op.timestamp,
            value: op.amount,
            from: op.sender,
            from_alias: op.sender_alias,
            to: op.target.unwrap_or_default(),
            fee: op.fee,
            tx_type,
            original_op_type: op_type.to_string(),
            comment: None,
            path: Some(path),
            is_cancelled: matches!(op.status.as_deref(), Some("failed" | "backtracked" | "skipped")),
            force_update: false,
            currency: None,
        })
    }
}

#[async_trait]
impl NetworkAdapter for ExplorerAdapter {
    fn net(&self) -> &str {
        &self.config.net
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }

    fn validate_address(&self, address: &str) -> bool {
        let address = address.trim();
        if address.is_empty() {
            return false;
        }
        if !self.config.address_prefixes.is_empty()
            && !self.config.address_prefixes.iter().any(|p| address.starts_with(p.as_str()))
        {
            return false;
        }

        match self.config.address_encoding {
            AddressEncoding::Base58 => bs58::decode(address).into_vec().is_ok(),
            AddressEncoding::Hex => {
                let digits = address.strip_prefix("0x").unwrap_or(address);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
            }
            AddressEncoding::Any => address.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        }
    }

    async fn get_all_transactions(
        &self,
        address: &str,
        cursors: &[Cursor],
        service_addresses: &[String],
    ) -> Result<Vec<NormalizedTx>, AdapterError> {
        let url = format!("{}/accounts/{}/operations", self.config.base_url.trim_end_matches('/'), address);
        let page_size = self.config.page_size.max(1);
        let mut batch = Vec::new();

        for op_type in &self.config.op_types {
            let mut offset = Self::start_offset(cursors, op_type)?;

            loop {
                let page: Vec<ExplorerOperation> = self
                    .get_json(
                        &url,
                        &[
                            ("type", op_type.clone()),
                            ("offset", offset.to_string()),
                            ("limit", page_size.to_string()),
                        ],
                    )
                    .await?;
                let fetched = page.len() as u64;

                if offset + fetched > self.max_tx_count {
                    return Err(AdapterError::TxLimitOverflow {
                        address: address.to_string(),
                        limit: self.max_tx_count,
                    });
                }

                for (i, op) in page.into_iter().enumerate() {
                    batch.push(self.normalize(op, op_type, offset + i as u64, service_addresses)?);
                }

                // A short page is the end of the history; the last row is
                // fetched again next time, which the writer absorbs.
                if fetched < page_size {
                    break;
                }
                offset += fetched;
            }
        }

        debug!("Fetched {} operations for {} on {}", batch.len(), address, self.config.net);
        Ok(batch)
    }

    fn service_addresses(&self) -> Option<&dyn ServiceAddressProvider> {
        self.config
            .service_addresses_url
            .as_ref()
            .map(|_| self as &dyn ServiceAddressProvider)
    }

    fn info(&self) -> Option<&dyn InfoProvider> {
        self.config.info_url.as_ref().map(|_| self as &dyn InfoProvider)
    }
}

#[async_trait]
impl ServiceAddressProvider for ExplorerAdapter {
    async fn get_service_addresses(&self) -> Result<Vec<String>, AdapterError> {
        let url = self
            .config
            .service_addresses_url
            .as_deref()
            .ok_or(AdapterError::Unsupported("getServiceAddresses"))?;
        self.get_json(url, &[]).await
    }
}

#[async_trait]
impl InfoProvider for ExplorerAdapter {
    /// Upstream outages degrade to zeroed figures instead of failing the caller.
    async fn get_info(&self) -> Result<NetworkInfo, AdapterError> {
        let url = self
            .config
            .info_url
            .as_deref()
            .ok_or(AdapterError::Unsupported("getInfo"))?;

        match self.get_json(url, &[]).await {
            Ok(info) => Ok(info),
            Err(e) if e.is_transient() => {
                warn!("Info source for {} unavailable, serving zeroed figures: {}", self.config.net, e);
                Ok(NetworkInfo::default())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(encoding: AddressEncoding, prefixes: &[&str]) -> ExplorerAdapter {
        let config = ExplorerNetworkConfig {
            net: "tezos".to_string(),
            currency: "XTZ".to_string(),
            base_url: "http://localhost:1".to_string(),
            op_types: vec!["transaction".to_string(), "delegation".to_string()],
            address_encoding: encoding,
            address_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            page_size: 100,
            max_tx_count: None,
            service_addresses_url: None,
            info_url: None,
        };
        ExplorerAdapter::new(config, Duration::from_secs(1), None, 500).unwrap()
    }

    fn operation(sender: &str) -> ExplorerOperation {
        ExplorerOperation {
            hash: "oo1".to_string(),
            timestamp: 1_000,
            amount: 2.5,
            sender: sender.to_string(),
            sender_alias: None,
            target: Some("tz1target".to_string()),
            fee: 0.01,
            status: Some("applied".to_string()),
        }
    }

    #[test]
    fn validates_prefix_and_encoding() {
        let tezos = adapter(AddressEncoding::Base58, &["tz1", "KT1"]);
        assert!(tezos.validate_address("tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
        assert!(!tezos.validate_address("tz0VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb"));
        assert!(!tezos.validate_address("tz1-not-base58-0OIl"));
        assert!(!tezos.validate_address("  "));

        let evm = adapter(AddressEncoding::Hex, &[]);
        assert!(evm.validate_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!evm.validate_address("0xZZ"));
    }

    #[test]
    fn capabilities_follow_configuration() {
        let plain = adapter(AddressEncoding::Any, &[]);
        assert!(plain.service_addresses().is_none());
        assert!(plain.info().is_none());
        assert!(plain.chain_wide().is_none());
        assert!(plain.push().is_none());
    }

    #[test]
    fn transfers_from_service_addresses_become_payments() {
        let tezos = adapter(AddressEncoding::Any, &[]);
        let service = vec!["tz1baker".to_string()];

        let payment = tezos.normalize(operation("tz1baker"), "transaction", 7, &service).unwrap();
        assert_eq!(payment.tx_type, TxType::Payment);

        let transfer = tezos.normalize(operation("tz1someone"), "transaction", 7, &service).unwrap();
        assert_eq!(transfer.tx_type, TxType::Supplement);

        let delegation = tezos.normalize(operation("tz1baker"), "delegation", 7, &service).unwrap();
        assert_eq!(delegation.tx_type, TxType::Delegation);
    }

    #[test]
    fn written_path_is_read_back_as_start_offset() {
        let tezos = adapter(AddressEncoding::Any, &[]);
        let tx = tezos.normalize(operation("tz1someone"), "transaction", 42, &[]).unwrap();

        let cursors = vec![Cursor {
            original_op_type: "transaction".to_string(),
            path: tx.path.clone(),
            tx_type: tx.tx_type,
        }];
        assert_eq!(ExplorerAdapter::start_offset(&cursors, "transaction").unwrap(), 42);
        assert_eq!(ExplorerAdapter::start_offset(&cursors, "delegation").unwrap(), 0);

        let broken = vec![Cursor {
            original_op_type: "transaction".to_string(),
            path: Some(CursorPath::new("not json")),
            tx_type: TxType::Supplement,
        }];
        assert!(matches!(
            ExplorerAdapter::start_offset(&broken, "transaction"),
            Err(AdapterError::InvalidCursor(_))
        ));
    }
}
