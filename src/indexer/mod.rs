//! Remote indexing service - the chain as seen through a REST indexer.
//!
//! The dispatcher only talks to [`ChainIndexer`]; [`HttpIndexer`] is the
//! production implementation and tests substitute their own.

#[cfg(feature = "native")]
mod http;

#[cfg(feature = "native")]
pub use http::HttpIndexer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VaultResult;
use crate::tx::Utxo;

pub const DEFAULT_INDEXER_URL: &str = "https://mypepecoin.org/api/v2";
pub const TRANSACTION_PAGE_SIZE: u32 = 10;

/// One page of an address's transaction ids, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxidPage {
    #[serde(default)]
    pub txids: Vec<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Confirmed unspent outputs of `address`.
    async fn utxos(&self, address: &str) -> VaultResult<Vec<Utxo>>;
    /// Balance as the indexer reports it (sats, number or string).
    async fn balance(&self, address: &str) -> VaultResult<Value>;
    async fn address_txids(&self, address: &str, page: u32, page_size: u32) -> VaultResult<TxidPage>;
    /// Full transaction record, indexer format.
    async fn transaction(&self, txid: &str) -> VaultResult<Value>;
    /// Broadcast a signed transaction; returns its txid.
    async fn broadcast(&self, raw_tx: &str) -> VaultResult<String>;
    /// Fiat rates for the coin.
    async fn price(&self) -> VaultResult<Value>;
}
