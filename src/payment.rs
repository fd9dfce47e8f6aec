use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::PaymentConfig;
use crate::error::Result;
use crate::esplora::EsploraClient;
use crate::ledger::TransactionLedger;
use crate::monitor::{ConfirmationMonitor, MonitorEvent, MonitorHandle};
use crate::remote::{Broadcaster, StatusSource, UtxoSource};
use crate::transaction::{SourceKey, TransactionBuilder};
use crate::types::{PaymentRequest, SourceWallet, TransactionRecord};

type WalletLock = Arc<tokio::sync::Mutex<()>>;
type WalletLocks = Mutex<HashMap<String, WalletLock>>;

fn lock_map(locks: &WalletLocks) -> MutexGuard<'_, HashMap<String, WalletLock>> {
    locks.lock().unwrap_or_else(|p| p.into_inner())
}

/// A claim on one source address's lock. The map entry goes away with the
/// last lease, including leases dropped while still waiting.
struct WalletLease<'a> {
    locks: &'a WalletLocks,
    address: String,
    lock: WalletLock,
}

impl Drop for WalletLease<'_> {
    fn drop(&mut self) {
        let mut locks = lock_map(self.locks);
        // The map's copy plus ours.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.address);
        }
    }
}

/// Build, sign, broadcast and track payments.
///
/// Builds against the same source address are serialized so two in-flight
/// payments never select the same UTXO. Payments from different wallets run
/// concurrently.
pub struct PaymentService {
    builder: TransactionBuilder,
    broadcaster: Arc<dyn Broadcaster>,
    monitor: ConfirmationMonitor,
    ledger: Arc<TransactionLedger>,
    wallet_locks: WalletLocks,
}

impl PaymentService {
    /// Fails with `Config` if `config` does not validate.
    pub fn new(
        config: &PaymentConfig,
        utxo_source: Arc<dyn UtxoSource>,
        broadcaster: Arc<dyn Broadcaster>,
        status_source: Arc<dyn StatusSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            builder: TransactionBuilder::new(config, utxo_source),
            broadcaster,
            monitor: ConfirmationMonitor::from_config(config, status_source)?,
            ledger: Arc::new(TransactionLedger::new()),
            wallet_locks: Mutex::new(HashMap::new()),
        })
    }

    /// One Esplora client serving UTXOs, broadcast and status.
    pub fn esplora(config: &PaymentConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(EsploraClient::from_config(config)?);
        Self::new(config, client.clone(), client.clone(), client)
    }

    pub fn ledger(&self) -> &Arc<TransactionLedger> {
        &self.ledger
    }

    fn lease_wallet(&self, address: &str) -> WalletLease<'_> {
        let lock = lock_map(&self.wallet_locks)
            .entry(address.to_string())
            .or_default()
            .clone();
        WalletLease {
            locks: &self.wallet_locks,
            address: address.to_string(),
            lock,
        }
    }

    /// Number of source addresses with a send in flight.
    pub fn active_wallets(&self) -> usize {
        lock_map(&self.wallet_locks).len()
    }

    /// Runs build → sign → broadcast in order and records the result as
    /// pending. Nothing is recorded unless the broadcast succeeds.
    pub async fn send(
        &self,
        wallet: &SourceWallet,
        request: &PaymentRequest,
    ) -> Result<TransactionRecord> {
        let source = self.builder.source_key(wallet)?;
        let lease = self.lease_wallet(&source.address.to_string());
        let _guard = lease.lock.lock().await;
        self.build_and_broadcast(&source, request).await
    }

    async fn build_and_broadcast(
        &self,
        source: &SourceKey,
        request: &PaymentRequest,
    ) -> Result<TransactionRecord> {
        let signed = self.builder.build_from(source, request).await?;
        let txid = self.broadcaster.broadcast(&signed.raw_hex).await?;
        if txid != signed.txid {
            log::warn!(
                "relay returned txid {} but the signed transaction hashes to {}",
                txid,
                signed.txid
            );
        }
        log::info!("broadcast accepted: {}", txid);

        let record = TransactionRecord::pending(
            txid,
            source.address.to_string(),
            signed.plan.destination.address.to_string(),
            signed.plan.destination.value_sat,
        );
        if self.ledger.insert_pending(record.clone()) {
            return Ok(record);
        }
        log::info!("{} is already tracked; keeping the existing record", record.id);
        Ok(self.ledger.get(&record.id).unwrap_or(record))
    }

    /// Watches `txid` until it confirms or the poll bound is reached. The
    /// ledger is updated before `on_event` runs.
    pub fn monitor<F>(&self, txid: &str, on_event: F) -> MonitorHandle
    where
        F: FnOnce(MonitorEvent) + Send + 'static,
    {
        let ledger = self.ledger.clone();
        self.monitor.start(txid, move |event| {
            ledger.apply(&event);
            on_event(event);
        })
    }
}
