use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PaymentError, Result};
use crate::network::BtcNetwork;
use crate::types::ScriptType;

pub const DEFAULT_FEE_RATE_SAT_PER_BYTE: u64 = 100;
/// Bitcoin Core's dust limit for P2PKH outputs.
pub const DEFAULT_DUST_THRESHOLD_SAT: u64 = 546;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Three hours at the default poll interval.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 1080;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime settings. Every field has a default so a config file only needs
/// the keys it overrides.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentConfig {
    pub network: BtcNetwork,
    pub fee_rate_sat_per_byte: u64,
    pub dust_threshold_sat: u64,
    pub poll_interval_secs: u64,
    /// `None` polls until confirmed or cancelled.
    pub max_poll_attempts: Option<u32>,
    /// Esplora base URL; falls back to the network's public endpoint.
    pub api_base_url: Option<String>,
    pub address_kind: ScriptType,
    pub http_timeout_secs: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            network: BtcNetwork::default(),
            fee_rate_sat_per_byte: DEFAULT_FEE_RATE_SAT_PER_BYTE,
            dust_threshold_sat: DEFAULT_DUST_THRESHOLD_SAT,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_poll_attempts: Some(DEFAULT_MAX_POLL_ATTEMPTS),
            api_base_url: None,
            address_kind: ScriptType::P2pkh,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl PaymentConfig {
    pub fn new(network: BtcNetwork) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: PaymentConfig =
            serde_json::from_str(&content).map_err(|e| PaymentError::Json {
                file_path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_fee_rate(mut self, sat_per_byte: u64) -> Self {
        self.fee_rate_sat_per_byte = sat_per_byte;
        self
    }

    pub fn with_dust_threshold(mut self, sat: u64) -> Self {
        self.dust_threshold_sat = sat;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_address_kind(mut self, kind: ScriptType) -> Self {
        self.address_kind = kind;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(PaymentError::Config("pollIntervalSecs must be at least 1".into()));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(PaymentError::Config("maxPollAttempts must be at least 1 when set".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(PaymentError::Config("httpTimeoutSecs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn esplora_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| self.network.default_esplora_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
