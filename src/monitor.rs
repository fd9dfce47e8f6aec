//! Background confirmation polling.
//!
//! Each [`ConfirmationMonitor::start`] call spawns one task that owns the
//! polling timer for a single txid. The caller holds the returned
//! [`MonitorHandle`]; there is no shared registry. A monitor ends in exactly
//! one terminal state and emits at most one [`MonitorEvent`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::remote::StatusSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    Watching { attempts: u32 },
    Confirmed { confirmations: u64 },
    /// Cancelled by the caller.
    Stopped,
    TimedOut { attempts: u32 },
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MonitorState::Watching { .. })
    }
}

/// Emitted once, when a monitor reaches `Confirmed` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Confirmed { txid: String, confirmations: u64 },
    TimedOut { txid: String, attempts: u32 },
}

impl MonitorEvent {
    pub fn txid(&self) -> &str {
        match self {
            MonitorEvent::Confirmed { txid, .. } | MonitorEvent::TimedOut { txid, .. } => txid,
        }
    }
}

#[derive(Clone)]
pub struct ConfirmationMonitor {
    source: Arc<dyn StatusSource>,
    poll_interval: Duration,
    max_attempts: Option<u32>,
}

impl ConfirmationMonitor {
    /// Fails with `Config` for a zero interval or a zero attempt bound.
    pub fn new(
        source: Arc<dyn StatusSource>,
        poll_interval: Duration,
        max_attempts: Option<u32>,
    ) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(PaymentError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if max_attempts == Some(0) {
            return Err(PaymentError::Config(
                "max poll attempts must be at least 1 when set".into(),
            ));
        }
        Ok(Self {
            source,
            poll_interval,
            max_attempts,
        })
    }

    pub fn from_config(config: &PaymentConfig, source: Arc<dyn StatusSource>) -> Result<Self> {
        Self::new(source, config.poll_interval(), config.max_poll_attempts)
    }

    /// Spawns the polling task on the current tokio runtime. The first poll
    /// happens one interval after this call.
    pub fn start<F>(&self, txid: impl Into<String>, on_event: F) -> MonitorHandle
    where
        F: FnOnce(MonitorEvent) + Send + 'static,
    {
        let txid = txid.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(MonitorState::Watching { attempts: 0 });

        tokio::spawn(run(
            self.clone(),
            txid.clone(),
            cancel_rx,
            state_tx,
            Box::new(on_event),
        ));
        log::info!("monitoring {} every {:?}", txid, self.poll_interval);

        MonitorHandle {
            txid,
            cancel_tx,
            state_rx,
        }
    }
}

/// Owned by whoever started the monitor. Dropping it detaches the task
/// without cancelling it.
pub struct MonitorHandle {
    txid: String,
    cancel_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<MonitorState>,
}

impl MonitorHandle {
    pub fn txid(&self) -> &str {
        &self.txid
    }

    /// Prevents further polls. A poll already in flight is not aborted, but
    /// its result is discarded. Calling this more than once has no effect.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn state(&self) -> MonitorState {
        self.state_rx.borrow().clone()
    }

    /// Waits for a terminal state.
    pub async fn finished(&self) -> MonitorState {
        let mut rx = self.state_rx.clone();
        let outcome = rx
            .wait_for(MonitorState::is_terminal)
            .await
            .map(|state| state.clone());
        // On error the task is gone; report whatever it last published.
        outcome.unwrap_or_else(|_| rx.borrow().clone())
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        // Handle dropped: nobody can cancel any more.
        std::future::pending::<()>().await;
    }
}

async fn poll_once(source: &dyn StatusSource, txid: &str) -> Result<Option<u64>> {
    let status = source.tx_status(txid).await?;
    if !status.confirmed {
        return Ok(None);
    }
    let tip = source.tip_height().await?;
    Ok(Some(status.confirmations(tip)))
}

async fn run(
    monitor: ConfirmationMonitor,
    txid: String,
    mut cancel_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<MonitorState>,
    on_event: Box<dyn FnOnce(MonitorEvent) + Send>,
) {
    let mut attempts: u32 = 0;

    let terminal = loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => break None,
            _ = tokio::time::sleep(monitor.poll_interval) => {}
        }

        attempts = attempts.saturating_add(1);
        let outcome = poll_once(monitor.source.as_ref(), &txid).await;

        if *cancel_rx.borrow() {
            break None;
        }

        match outcome {
            Ok(Some(confirmations)) => {
                log::info!("{} confirmed with {} confirmations", txid, confirmations);
                break Some((
                    MonitorState::Confirmed { confirmations },
                    MonitorEvent::Confirmed {
                        txid: txid.clone(),
                        confirmations,
                    },
                ));
            }
            Ok(None) => log::debug!("{} not confirmed yet (attempt {})", txid, attempts),
            Err(e) => log::warn!(
                "status poll for {} failed (attempt {}): {}",
                txid,
                attempts,
                e
            ),
        }

        if monitor.max_attempts.is_some_and(|max| attempts >= max) {
            log::warn!("giving up on {} after {} polls", txid, attempts);
            break Some((
                MonitorState::TimedOut { attempts },
                MonitorEvent::TimedOut {
                    txid: txid.clone(),
                    attempts,
                },
            ));
        }
        state_tx.send_replace(MonitorState::Watching { attempts });
    };

    // The callback completes before `finished()` can return.
    match terminal {
        Some((state, event)) => {
            on_event(event);
            state_tx.send_replace(state);
        }
        None => {
            log::info!("monitoring of {} cancelled after {} polls", txid, attempts);
            state_tx.send_replace(MonitorState::Stopped);
        }
    }
}
