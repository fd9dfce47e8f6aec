use async_trait::async_trait;
use bitcoin::Amount;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::remote::{Broadcaster, StatusSource, TxStatus, UtxoSource};
use crate::types::UnspentOutput;

/// Esplora REST client (blockstream.info, mempool.space, local electrs).
#[derive(Debug, Clone)]
pub struct EsploraClient {
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

/// Drops zero-value entries and rejects values no real output can hold.
fn unspent_outputs(utxos: Vec<EsploraUtxo>) -> Result<Vec<UnspentOutput>> {
    let mut unspent = Vec::with_capacity(utxos.len());
    for u in utxos {
        if u.value == 0 {
            log::warn!("skipping zero-value UTXO {}:{}", u.txid, u.vout);
            continue;
        }
        if u.value > Amount::MAX_MONEY.to_sat() {
            return Err(PaymentError::InvalidUtxo {
                txid: u.txid,
                vout: u.vout,
                reason: format!("value of {} sats exceeds the money supply", u.value),
            });
        }
        unspent.push(UnspentOutput {
            txid: u.txid,
            vout: u.vout,
            value_sat: u.value,
        });
    }
    Ok(unspent)
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn from_config(config: &PaymentConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self::new(config.esplora_url(), http))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        let response = self.http.get(&url).send().await?;
        ensure_success(&url, response).await
    }
}

async fn ensure_success(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PaymentError::NetworkError(format!(
        "{} returned {}: {}",
        url,
        status,
        body.trim()
    )))
}

#[async_trait]
impl UtxoSource for EsploraClient {
    async fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let utxos: Vec<EsploraUtxo> = self
            .get(&format!("/address/{address}/utxo"))
            .await?
            .json()
            .await?;
        log::debug!("indexer returned {} UTXOs for {}", utxos.len(), address);
        unspent_outputs(utxos)
    }
}

#[async_trait]
impl Broadcaster for EsploraClient {
    async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        log::info!("broadcasting {} bytes to {}", raw_hex.len() / 2, url);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(raw_hex.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PaymentError::BroadcastRejected {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        let txid = body.trim();
        if txid.is_empty() {
            return Err(PaymentError::NetworkError(format!(
                "{url} accepted the transaction but returned no txid"
            )));
        }
        Ok(txid.to_string())
    }
}

#[async_trait]
impl StatusSource for EsploraClient {
    async fn tx_status(&self, txid: &str) -> Result<TxStatus> {
        let response = self.get(&format!("/tx/{txid}/status")).await?;
        Ok(response.json().await?)
    }

    async fn tip_height(&self) -> Result<u64> {
        let body = self.get("/blocks/tip/height").await?.text().await?;
        body.trim().parse().map_err(|e| {
            PaymentError::NetworkError(format!("unparsable tip height {body:?}: {e}"))
        })
    }
}
