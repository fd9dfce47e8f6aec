use std::path::PathBuf;

use bitcoin::key::FromWifError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no spendable UTXOs for address {address}")]
    EmptyUtxoSet { address: String },

    #[error("insufficient funds: available {available} sats, required {required} sats (including fee {fee} sats)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("signing failed for input {input_index}: {reason}")]
    SigningError { input_index: usize, reason: String },

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("broadcast rejected (HTTP {status}): {message}")]
    BroadcastRejected { status: u16, message: String },

    #[error("invalid private key (WIF): {0}")]
    InvalidKey(#[from] FromWifError),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("network mismatch: configured {configured}, key or address is for {found}")]
    NetworkMismatch { configured: String, found: String },

    #[error("invalid UTXO {txid}:{vout}: {reason}")]
    InvalidUtxo {
        txid: String,
        vout: u32,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {file_path:?}: {source}")]
    Json {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PaymentError {
    /// Transport-level failures are the only ones worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::NetworkError(_))
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::NetworkError(err.to_string())
    }
}
