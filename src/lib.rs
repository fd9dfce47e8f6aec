//! Single-recipient Bitcoin payments for a custodial wallet node.
//!
//! [`transaction::TransactionBuilder`] selects UTXOs, plans change and fee,
//! signs and serializes. [`remote`] holds the indexer seams that
//! [`esplora::EsploraClient`] implements over HTTP, and
//! [`monitor::ConfirmationMonitor`] polls a broadcast transaction until it
//! confirms. [`payment::PaymentService`] ties these together.

pub mod cli;
pub mod config;
pub mod error;
pub mod esplora;
pub mod fee;
pub mod ledger;
pub mod monitor;
pub mod network;
pub mod payment;
pub mod remote;
pub mod transaction;
pub mod types;

pub use config::PaymentConfig;
pub use error::{PaymentError, Result};
pub use monitor::{MonitorEvent, MonitorHandle, MonitorState};
pub use network::BtcNetwork;
pub use payment::PaymentService;
pub use types::{
    PaymentRequest, SignedTransaction, SourceWallet, TransactionRecord, TransactionStatus,
};
