use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::monitor::MonitorEvent;
use crate::types::{TransactionRecord, TransactionStatus};

/// In-memory transaction history keyed by txid.
///
/// All mutation goes through one lock, so a record has a single writer at a
/// time and a status moves out of `Pending` at most once.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    records: Mutex<HashMap<String, TransactionRecord>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TransactionRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Returns `false` if a record with this id already exists.
    pub fn insert_pending(&self, record: TransactionRecord) -> bool {
        let mut records = self.lock();
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id.clone(), record);
        true
    }

    pub fn get(&self, id: &str) -> Option<TransactionRecord> {
        self.lock().get(id).cloned()
    }

    /// Newest first.
    pub fn records(&self) -> Vec<TransactionRecord> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));
        all
    }

    /// Applies a monitor event. Returns whether a record changed.
    pub fn apply(&self, event: &MonitorEvent) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(event.txid()) else {
            log::warn!("no record for {}; ignoring {:?}", event.txid(), event);
            return false;
        };
        if record.status != TransactionStatus::Pending {
            return false;
        }

        match event {
            MonitorEvent::Confirmed { confirmations, .. } => {
                record.status = TransactionStatus::Completed;
                record.confirmations = *confirmations;
            }
            MonitorEvent::TimedOut { .. } => record.status = TransactionStatus::Failed,
        }
        log::info!("{} is now {}", record.id, record.status);
        true
    }
}
