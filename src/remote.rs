//! Seams to the remote indexer. The builder, broadcaster step and monitor
//! only see these traits; [`crate::esplora::EsploraClient`] is the HTTP
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::types::UnspentOutput;

#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// Unspent outputs locked to `address`, in indexer order.
    async fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submits raw transaction hex and returns the txid the relay assigned.
    async fn broadcast(&self, raw_hex: &str) -> Result<String>;
}

/// Inclusion status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
}

impl TxStatus {
    /// Number of blocks including and built on top of the confirming block.
    pub fn confirmations(&self, tip_height: u64) -> u64 {
        match (self.confirmed, self.block_height) {
            (true, Some(height)) if tip_height >= height => tip_height - height + 1,
            (true, _) => 1,
            (false, _) => 0,
        }
    }
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn tx_status(&self, txid: &str) -> Result<TxStatus>;

    async fn tip_height(&self) -> Result<u64>;
}
