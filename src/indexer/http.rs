//! reqwest client for the REST indexer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChainIndexer, TxidPage};
use crate::error::{VaultError, VaultResult};
use crate::protocol::is_txid;
use crate::tx::Utxo;

#[derive(Clone)]
pub struct HttpIndexer {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

impl HttpIndexer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> VaultResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Network(format!("client: {e}")))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> VaultResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| VaultError::Network(format!("GET {path}: {e}")))?;
        if !response.status().is_success() {
            return Err(VaultError::Network(format!("GET {path}: {}", response.status())));
        }
        response
            .json()
            .await
            .map_err(|e| VaultError::Network(format!("GET {path}: {e}")))
    }
}

#[async_trait]
impl ChainIndexer for HttpIndexer {
    async fn utxos(&self, address: &str) -> VaultResult<Vec<Utxo>> {
        // Some deployments answer with an object keyed by outpoint.
        let raw: Value = self.get_json(&format!("/utxo/{address}?confirmed=true")).await?;
        let list = match raw {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            other => return Err(VaultError::Network(format!("utxo list: unexpected {other}"))),
        };
        list.into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| VaultError::Network(format!("utxo: {e}"))))
            .collect()
    }

    async fn balance(&self, address: &str) -> VaultResult<Value> {
        let raw: Value = self.get_json(&format!("/address/{address}")).await?;
        raw.get("balance")
            .cloned()
            .ok_or_else(|| VaultError::Network("address record has no balance".into()))
    }

    async fn address_txids(&self, address: &str, page: u32, page_size: u32) -> VaultResult<TxidPage> {
        self.get_json(&format!("/address/{address}?page={page}&pageSize={page_size}")).await
    }

    async fn transaction(&self, txid: &str) -> VaultResult<Value> {
        if !is_txid(txid) {
            return Err(VaultError::validation(format!("malformed txid {txid:?}")));
        }
        self.get_json(&format!("/tx/{txid}")).await
    }

    async fn broadcast(&self, raw_tx: &str) -> VaultResult<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": format!("send_{}", chrono::Utc::now().timestamp_millis()),
            "method": "sendrawtransaction",
            "params": [raw_tx],
        });
        let response = self
            .client
            .post(format!("{}/wallet/rpc", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| VaultError::Network(format!("broadcast: {e}")))?;
        if !response.status().is_success() {
            return Err(VaultError::Network(format!("broadcast: {}", response.status())));
        }
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Network(format!("broadcast: {e}")))?;
        match (body.result, body.error) {
            (Some(txid), None | Some(Value::Null)) => Ok(txid),
            (_, Some(err)) if !err.is_null() => {
                Err(VaultError::Network(format!("broadcast rejected: {err}")))
            }
            _ => Err(VaultError::Network("broadcast: empty result".into())),
        }
    }

    async fn price(&self) -> VaultResult<Value> {
        let raw: Value = self.get_json("/tickers/?currency=usd").await?;
        raw.get("rates")
            .cloned()
            .ok_or_else(|| VaultError::Network("ticker has no rates".into()))
    }
}
